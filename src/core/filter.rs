//! Listing filter: raw request parameters -> SQL predicate.

use chrono::{DateTime, NaiveDate, Utc};
use log::warn;

/// Parsed listing filter. An empty filter matches every chat.
#[derive(Debug, Clone, Default)]
pub struct ChatFilter {
    pub search: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl ChatFilter {
    /// Builds a filter from the raw `query`/`date_from`/`date_to` strings of
    /// a listing or export request. Blank values are ignored. When either
    /// date fails to parse as `YYYY-MM-DD` the whole date constraint is
    /// dropped; the search constraint still applies.
    pub fn from_raw(
        search_query: Option<&str>,
        date_from: Option<&str>,
        date_to: Option<&str>,
    ) -> Self {
        let search = search_query
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);

        let from = parse_day(date_from);
        let to = parse_day(date_to);
        let (created_from, created_to) = match (from, to) {
            (Some(Err(_)), _) | (_, Some(Err(_))) => {
                warn!("invalid date format in filters, dropping date constraint");
                (None, None)
            }
            (from, to) => (
                from.and_then(Result::ok).map(start_of_day),
                to.and_then(Result::ok).map(end_of_day),
            ),
        };

        ChatFilter {
            search,
            created_from,
            created_to,
        }
    }

    /// Composes the WHERE clause and its bind parameters.
    ///
    /// Returns an empty clause when no filter is set. The search term is a
    /// literal case-insensitive substring test (`instr`, not `LIKE`), so the
    /// user-supplied text never acts as a pattern; it is compared against the
    /// chat title and against the `content` of every stored message. Date
    /// bounds go through `datetime()` so both sides compare in the same
    /// normalised form. `lower()` folds ASCII only.
    pub fn build_where(&self) -> (String, Vec<String>) {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if let Some(ref search) = self.search {
            conditions.push(
                "(instr(lower(title), lower(?)) > 0 \
                 OR EXISTS (SELECT 1 FROM json_each(chats.messages) \
                 WHERE instr(lower(json_extract(json_each.value, '$.content')), lower(?)) > 0))"
                    .to_string(),
            );
            params.push(search.clone());
            params.push(search.clone());
        }

        if let Some(created_from) = self.created_from {
            conditions.push("datetime(created_at) >= datetime(?)".to_string());
            params.push(created_from.to_rfc3339());
        }

        if let Some(created_to) = self.created_to {
            conditions.push("datetime(created_at) <= datetime(?)".to_string());
            params.push(created_to.to_rfc3339());
        }

        if conditions.is_empty() {
            (String::new(), params)
        } else {
            (format!("WHERE {}", conditions.join(" AND ")), params)
        }
    }
}

/// None: parameter absent or blank. Some(Err): present but unparseable.
fn parse_day(raw: Option<&str>) -> Option<Result<NaiveDate, chrono::ParseError>> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_micro_opt(23, 59, 59, 999_999)
        .expect("end of day is always valid")
        .and_utc()
}
