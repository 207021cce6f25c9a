//! Pooled SQLite connection

use di::inject;
use di::injectable;
use log::info;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::env;
use std::ops::{Deref, DerefMut};
use std::sync::RwLock;
use std::time::Duration;

/// Pool override used by integration tests. The `more-di` framework builds
/// `DatabaseConnection` itself, so tests that want an in-memory database
/// park their pool here before constructing the provider.
static TEST_POOL: RwLock<Option<SqlitePool>> = RwLock::new(None);

pub struct DatabaseConnection {
    connection: SqlitePool,
}

#[injectable]
impl DatabaseConnection {
    #[inject]
    pub fn create() -> DatabaseConnection {
        if let Some(pool) = TEST_POOL.read().expect("test pool lock poisoned").clone() {
            return DatabaseConnection { connection: pool };
        }

        dotenvy::dotenv().ok();
        let connection_string = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        // Fail fast on an unreachable store instead of hanging.
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(&connection_string)
            .expect("Cannot connect to database");

        info!("database pool created for {connection_string}");
        DatabaseConnection { connection: pool }
    }

    pub fn set_test_pool(pool: SqlitePool) {
        *TEST_POOL.write().expect("test pool lock poisoned") = Some(pool);
    }

    pub fn clear_test_pool() {
        *TEST_POOL.write().expect("test pool lock poisoned") = None;
    }
}

impl Deref for DatabaseConnection {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl DerefMut for DatabaseConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.connection
    }
}
