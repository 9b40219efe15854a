//! Configurable JSON API adapter
//!
//! Each `[[source.table]]` entry names a URL template and, optionally, a JSON
//! pointer to the array of records inside the response. Every element of that
//! array becomes one record; nested values are kept as JSON text.

use crate::adapter::{AdapterError, ExtractRequest, TableAdapter, TableConfig};
use crate::config::{SourceConfig, SourceTableConfig};
use crate::fetch::{FetchController, FetchError, FetchOptions};
use crate::record::{NormalizedRecord, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Builds an adapter serving every table of `source` through `fetcher`
pub fn json_api_adapter(
    source: &SourceConfig,
    fetcher: Arc<FetchController>,
) -> Result<TableAdapter, AdapterError> {
    if source.tables.is_empty() {
        return Err(AdapterError::Construction {
            source_name: source.name.clone(),
            message: "source declares no tables".to_string(),
        });
    }

    let mut adapter = TableAdapter::new(source.name.clone());

    for source_table in &source.tables {
        let config = TableConfig {
            table_name: source_table.name.clone(),
            conflict_columns: source_table.conflict_columns.clone(),
            required_fields: source_table.required_fields.clone(),
        };
        let source_table = Arc::new(source_table.clone());
        let fetcher = fetcher.clone();

        adapter = adapter.table(config, move |request| {
            let source_table = source_table.clone();
            let fetcher = fetcher.clone();
            async move { extract_table(&fetcher, &source_table, &request).await }
        });
    }

    Ok(adapter)
}

async fn extract_table(
    fetcher: &FetchController,
    source_table: &SourceTableConfig,
    request: &ExtractRequest,
) -> Result<Vec<NormalizedRecord>, AdapterError> {
    let url = render_url(&source_table.url, &request.league, &request.season)?;
    let options = FetchOptions {
        force_refresh: request.force_refresh,
    };

    let payload = match fetcher.get(&url, options).await {
        Ok(payload) => payload,
        Err(FetchError::Permanent {
            status: Some(404), ..
        }) => {
            return Err(AdapterError::NoData(format!(
                "{} returned 404",
                url
            )))
        }
        Err(e) => return Err(e.into()),
    };

    let context = source_table
        .add_context_columns
        .then(|| (request.league.as_str(), request.season.as_str()));
    let records = records_from_payload(&payload, source_table.records_path.as_deref(), context)?;

    if records.is_empty() {
        return Err(AdapterError::NoData(format!("{} returned no records", url)));
    }

    debug!("Parsed {} records from {}", records.len(), url);
    Ok(records)
}

/// Substitutes `{league}` and `{season}` into a URL template
pub fn render_url(template: &str, league: &str, season: &str) -> Result<Url, AdapterError> {
    let rendered = template
        .replace("{league}", league)
        .replace("{season}", season);
    Url::parse(&rendered)
        .map_err(|e| AdapterError::Parse(format!("invalid URL '{}': {}", rendered, e)))
}

/// Turns a JSON payload into records
///
/// `records_path` is a JSON pointer to the record array (the root when
/// absent). Records missing a key that others carry get a null for it, so the
/// whole batch shares one column set. `context` adds `league` and `season`
/// columns unless the payload already has them.
pub fn records_from_payload(
    payload: &[u8],
    records_path: Option<&str>,
    context: Option<(&str, &str)>,
) -> Result<Vec<NormalizedRecord>, AdapterError> {
    let document: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| AdapterError::Parse(e.to_string()))?;

    let items = match records_path.filter(|p| !p.is_empty()) {
        Some(path) => document
            .pointer(path)
            .ok_or_else(|| AdapterError::Parse(format!("records path '{}' not found", path)))?,
        None => &document,
    };

    let items = match items {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Null => return Ok(Vec::new()),
        other => {
            return Err(AdapterError::Parse(format!(
                "expected an array of records, found {}",
                json_kind(other)
            )))
        }
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let object = item.as_object().ok_or_else(|| {
            AdapterError::Parse(format!(
                "record {} is {}, expected an object",
                index,
                json_kind(item)
            ))
        })?;

        let mut record: NormalizedRecord = object
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect();

        if let Some((league, season)) = context {
            record
                .entry("league".to_string())
                .or_insert_with(|| Value::from(league));
            record
                .entry("season".to_string())
                .or_insert_with(|| Value::from(season));
        }
        records.push(record);
    }

    let columns: BTreeSet<String> = records.iter().flat_map(|r| r.keys().cloned()).collect();
    for record in &mut records {
        for column in &columns {
            record.entry(column.clone()).or_insert(Value::Null);
        }
    }

    Ok(records)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_url_substitutes_and_encodes() {
        let url = render_url(
            "https://api.example.com/{league}/{season}.json",
            "ENG-Premier League",
            "2223",
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/ENG-Premier%20League/2223.json"
        );
    }

    #[test]
    fn test_records_at_root() {
        let payload = br#"[{"team": "Arsenal", "elo": 1950.5}, {"team": "Spurs", "elo": 1800}]"#;
        let records = records_from_payload(payload, None, None).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["team"], Value::from("Arsenal"));
        assert_eq!(records[1]["elo"], Value::Integer(1800));
    }

    #[test]
    fn test_records_at_pointer_with_context() {
        let payload = br#"{"data": {"games": [{"game": "g1", "score": {"home": 1}}]}}"#;
        let records =
            records_from_payload(payload, Some("/data/games"), Some(("ENG", "2223"))).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["league"], Value::from("ENG"));
        assert_eq!(records[0]["season"], Value::from("2223"));
        assert_eq!(records[0]["score"], Value::from(r#"{"home":1}"#));
    }

    #[test]
    fn test_missing_keys_filled_with_null() {
        let payload = br#"[{"a": 1, "b": 2}, {"a": 3}]"#;
        let records = records_from_payload(payload, None, None).unwrap();
        assert_eq!(records[1]["b"], Value::Null);
        assert_eq!(records[0].len(), records[1].len());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            records_from_payload(b"not json", None, None),
            Err(AdapterError::Parse(_))
        ));
        assert!(matches!(
            records_from_payload(br#"{"a": 1}"#, None, None),
            Err(AdapterError::Parse(_))
        ));
        assert!(matches!(
            records_from_payload(br#"{"a": []}"#, Some("/b"), None),
            Err(AdapterError::Parse(_))
        ));
        assert!(matches!(
            records_from_payload(br#"[1, 2]"#, None, None),
            Err(AdapterError::Parse(_))
        ));
    }

    #[test]
    fn test_null_or_empty_yields_no_records() {
        assert!(records_from_payload(b"[]", None, None).unwrap().is_empty());
        assert!(records_from_payload(br#"{"rows": null}"#, Some("/rows"), None)
            .unwrap()
            .is_empty());
    }
}
