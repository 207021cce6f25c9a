//! Export rendering: filtered chats -> JSON or CSV bytes.

use crate::core::traits::ChatExport;
use serde_json::Value;

/// Spreadsheet tools expect this marker to detect UTF-8.
const UTF8_BOM: &[u8] = "\u{feff}".as_bytes();

const CSV_DELIMITER: u8 = b';';

const CSV_HEADER: [&str; 8] = [
    "Chat_ID",
    "Chat_Title",
    "Chat_Created_At",
    "Model_Name",
    "Message_Role",
    "Message_Content",
    "Message_Timestamp",
    "Message_Processing_Time",
];

/// Pretty-printed JSON array of full chat documents.
pub fn chats_to_json(chats: &[ChatExport]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(chats)
}

/// Flattened CSV: one row per message, sharing the chat-level columns; a
/// chat without messages still gets one row with the message cells empty.
pub fn chats_to_csv(chats: &[ChatExport]) -> Result<Vec<u8>, csv::Error> {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(UTF8_BOM);

    let mut writer = csv::WriterBuilder::new()
        .delimiter(CSV_DELIMITER)
        .from_writer(buffer);

    writer.write_record(CSV_HEADER)?;

    for chat in chats {
        let created_at = chat.created_at.to_rfc3339();

        if chat.messages.is_empty() {
            writer.write_record([
                chat.id.as_str(),
                &chat.title,
                &created_at,
                &chat.model_name,
                "",
                "",
                "",
                "",
            ])?;
            continue;
        }

        for message in &chat.messages {
            let processing_time = message
                .metadata
                .get("processing_time")
                .map(plain_value)
                .unwrap_or_default();

            writer.write_record([
                chat.id.as_str(),
                &chat.title,
                &created_at,
                &chat.model_name,
                message.role.as_str(),
                &message.content,
                &message.timestamp.to_rfc3339(),
                &processing_time,
            ])?;
        }
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Renders a metadata value as a bare cell, without JSON string quotes.
fn plain_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
