//! JSON export/import of the quote collection
//!
//! Import is all-or-nothing: the payload is validated in full before a
//! single record is handed back to the caller.

use super::{next_quote_id, Quote, QuoteSource};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::path::Path;

/// File name offered for exports
pub const DEFAULT_EXPORT_FILE: &str = "quotes.json";

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Error importing quotes: {0}")]
    ImportValidation(String),

    #[error("No quotes to export")]
    NothingToExport,

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Pretty-printed JSON array of every record
pub fn export_quotes(quotes: &[Quote]) -> Result<String, TransferError> {
    if quotes.is_empty() {
        return Err(TransferError::NothingToExport);
    }
    Ok(serde_json::to_string_pretty(quotes)?)
}

pub fn export_to_file(quotes: &[Quote], path: &Path) -> Result<(), TransferError> {
    let json = export_quotes(quotes)?;
    std::fs::write(path, json)?;
    log::info!("Exported {} quotes to {:?}", quotes.len(), path);
    Ok(())
}

/// Parse and validate an import payload
///
/// Missing `id`, `lastUpdated` and `source` fields are backfilled; anything
/// else that is wrong rejects the whole payload.
pub fn parse_import(json: &str) -> Result<Vec<Quote>, TransferError> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| TransferError::ImportValidation(format!("Invalid JSON: {}", e)))?;

    let items = match value {
        Value::Array(items) if !items.is_empty() => items,
        _ => {
            return Err(TransferError::ImportValidation(
                "Invalid format: Expected an array of quotes".to_string(),
            ))
        }
    };

    let now = Utc::now();
    let mut quotes = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(mut fields) = item else {
            return Err(TransferError::ImportValidation(format!(
                "Invalid quote format at position {}: expected an object",
                index
            )));
        };

        if !has_text(&fields, "text") || !has_text(&fields, "category") {
            return Err(TransferError::ImportValidation(format!(
                "Invalid quote format at position {}: Each quote must have text and category",
                index
            )));
        }

        trim_field(&mut fields, "text");
        trim_field(&mut fields, "category");
        backfill(&mut fields, now, index)?;

        let quote: Quote = serde_json::from_value(Value::Object(fields)).map_err(|e| {
            TransferError::ImportValidation(format!("Invalid quote at position {}: {}", index, e))
        })?;
        quotes.push(quote);
    }

    Ok(quotes)
}

pub fn read_import_file(path: &Path) -> Result<Vec<Quote>, TransferError> {
    let json = std::fs::read_to_string(path)?;
    parse_import(&json)
}

fn has_text(fields: &Map<String, Value>, key: &str) -> bool {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map_or(false, |s| !s.trim().is_empty())
}

/// Same normalization as quotes added by hand
fn trim_field(fields: &mut Map<String, Value>, key: &str) {
    if let Some(Value::String(value)) = fields.get_mut(key) {
        let trimmed = value.trim().to_string();
        *value = trimmed;
    }
}

fn backfill(fields: &mut Map<String, Value>, now: DateTime<Utc>, index: usize) -> Result<(), TransferError> {
    let has_id = fields
        .get("id")
        .and_then(Value::as_i64)
        .map_or(false, |id| id != 0);
    if !has_id {
        fields.insert("id".to_string(), Value::from(next_quote_id()));
    }

    match fields.get("lastUpdated") {
        None | Some(Value::Null) => {
            fields.insert("lastUpdated".to_string(), Value::String(now.to_rfc3339()));
        }
        Some(Value::String(raw)) if DateTime::parse_from_rfc3339(raw).is_ok() => {}
        Some(other) => {
            return Err(TransferError::ImportValidation(format!(
                "Invalid quote at position {}: lastUpdated {} is not a timestamp",
                index, other
            )));
        }
    }

    if matches!(fields.get("source"), None | Some(Value::Null)) {
        fields.insert(
            "source".to_string(),
            Value::String(QuoteSource::Import.as_str().to_string()),
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quotes::QuoteStore;

    #[test]
    fn test_import_backfills_missing_fields() {
        let before = Utc::now();
        let quotes = parse_import(r#"[{"text": "Q", "category": "c"}]"#).unwrap();

        assert_eq!(quotes.len(), 1);
        let quote = &quotes[0];
        assert_eq!(quote.text, "Q");
        assert_eq!(quote.category, "c");
        assert!(quote.id > 0);
        assert!(quote.last_updated >= before);
        assert_eq!(quote.source, Some(QuoteSource::Import));
    }

    #[test]
    fn test_import_trims_text_and_category() {
        let quotes = parse_import(r#"[{"text": "  Q ", "category": " life\t"}]"#).unwrap();
        assert_eq!(quotes[0].text, "Q");
        assert_eq!(quotes[0].category, "life");
    }

    #[test]
    fn test_import_keeps_existing_fields() {
        let quotes = parse_import(
            r#"[{"id": 42, "text": "Q", "category": "c",
                 "lastUpdated": "2024-01-01T00:00:00Z", "source": "server"}]"#,
        )
        .unwrap();

        assert_eq!(quotes[0].id, 42);
        assert_eq!(quotes[0].last_updated.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(quotes[0].source, Some(QuoteSource::Server));
    }

    #[test]
    fn test_import_backfilled_ids_are_distinct() {
        let quotes = parse_import(
            r#"[{"text": "A", "category": "c"}, {"text": "B", "category": "c"}]"#,
        )
        .unwrap();
        assert_ne!(quotes[0].id, quotes[1].id);
    }

    #[test]
    fn test_import_missing_category_rejected() {
        let result = parse_import(r#"[{"text": "Q"}]"#);
        assert!(matches!(result, Err(TransferError::ImportValidation(_))));
    }

    #[test]
    fn test_import_rejects_bad_payloads() {
        for payload in [
            "not json",
            "[]",
            r#"{"text": "Q", "category": "c"}"#,
            r#"["just a string"]"#,
            r#"[{"text": "  ", "category": "c"}]"#,
            r#"[{"text": "Q", "category": "c", "lastUpdated": "yesterday"}]"#,
            r#"[{"text": "A", "category": "c"}, {"category": "c"}]"#,
        ] {
            let result = parse_import(payload);
            assert!(
                matches!(result, Err(TransferError::ImportValidation(_))),
                "payload should be rejected: {}",
                payload
            );
        }
    }

    #[test]
    fn test_export_empty_store_fails() {
        assert!(matches!(export_quotes(&[]), Err(TransferError::NothingToExport)));
    }

    #[test]
    fn test_export_then_import_reproduces_store() {
        let mut store = QuoteStore::with_defaults();
        store.add("Imported later", "misc").unwrap();

        let json = export_quotes(store.quotes()).unwrap();
        assert!(json.contains('\n'), "export should be pretty-printed");

        let imported = parse_import(&json).unwrap();
        assert_eq!(imported, store.quotes());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_EXPORT_FILE);
        let store = QuoteStore::with_defaults();

        export_to_file(store.quotes(), &path).unwrap();
        let imported = read_import_file(&path).unwrap();
        assert_eq!(imported, store.quotes());
    }
}
