// extractor.rs
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, error, info, warn};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::PipelineConfig;
use crate::js_literal::{ensure_statement_end, parse_js_literal};
use crate::models::{ContentRecord, ContentType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Json,
    JavaScript,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<SourceFormat> {
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref() {
            Some("json") => Some(SourceFormat::Json),
            Some("js") | Some("mjs") | Some("cjs") | Some("ts") => Some(SourceFormat::JavaScript),
            _ => None,
        }
    }
}

/// Reads one source file and returns its records. Never fails: read or parse
/// errors are logged and produce an empty list.
pub async fn extract_records(path: &Path, content_type: ContentType) -> Vec<ContentRecord> {
    match try_extract_records(path, content_type).await {
        Ok(records) => {
            info!("Extracted {} {} records from {:?}", records.len(), content_type, path);
            records
        }
        Err(e) => {
            error!("Failed to extract {} records from {:?}: {:#}", content_type, path, e);
            Vec::new()
        }
    }
}

async fn try_extract_records(path: &Path, content_type: ContentType) -> Result<Vec<ContentRecord>> {
    let format = SourceFormat::from_path(path)
        .ok_or_else(|| anyhow!("Unsupported source extension"))?;
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    let values = parse_source(&text, format)?;

    let mut records = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match ContentRecord::from_value(content_type, value, path.to_path_buf(), index) {
            Some(record) => records.push(record),
            None => warn!("Skipping entry {} of {:?}: not an object", index, path),
        }
    }
    Ok(records)
}

/// Returns the raw entries of the record array held by a source file.
pub fn parse_source(text: &str, format: SourceFormat) -> Result<Vec<Value>> {
    match format {
        SourceFormat::Json => {
            let value: Value = serde_json::from_str(text).context("Invalid JSON")?;
            record_array(value).ok_or_else(|| anyhow!("No array of records found in JSON"))
        }
        SourceFormat::JavaScript => parse_js_module(text),
    }
}

/// A top-level array, or the first array-valued property of an object.
fn record_array(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.into_iter().find_map(|(_, v)| match v {
            Value::Array(items) => Some(items),
            _ => None,
        }),
        _ => None,
    }
}

fn parse_js_module(text: &str) -> Result<Vec<Value>> {
    // Exported bindings are preferred over plain declarations.
    let patterns = [
        r"(?m)^[ \t]*export[ \t]+(?:const|let|var)[ \t]+[A-Za-z_$][\w$]*[ \t]*(?::[^=\n]+)?=[ \t]*",
        r"(?m)^[ \t]*export[ \t]+default[ \t]+",
        r"(?m)^[ \t]*module\.exports[ \t]*=[ \t]*",
        r"(?m)^[ \t]*(?:const|let|var)[ \t]+[A-Za-z_$][\w$]*[ \t]*(?::[^=\n]+)?=[ \t]*",
    ];

    let mut last_error: Option<anyhow::Error> = None;
    // Arrays without any object entries (lookup lists) only win if nothing else does.
    let mut fallback: Option<Vec<Value>> = None;
    for pattern in patterns {
        let re = Regex::new(pattern).context("Invalid export pattern")?;
        for found in re.find_iter(text) {
            let rest = &text[found.end()..];
            let starts_literal = rest.trim_start().starts_with(&['[', '{'][..]);
            if !starts_literal {
                debug!("Skipping non-literal binding at byte {}", found.start());
                continue;
            }
            match parse_js_literal(rest) {
                Ok((value, consumed)) => {
                    if let Err(e) = ensure_statement_end(&rest[consumed..]) {
                        last_error = Some(e.context(format!("Literal at byte {} is not a plain value", found.end())));
                        continue;
                    }
                    match record_array(value) {
                        Some(items) if items.iter().any(Value::is_object) => return Ok(items),
                        Some(items) => {
                            debug!("Array at byte {} holds no objects, looking further", found.end());
                            fallback.get_or_insert(items);
                        }
                        None => {}
                    }
                }
                Err(e) => last_error = Some(e.context(format!("Failed to parse literal at byte {}", found.end()))),
            }
        }
    }

    if let Some(items) = fallback {
        return Ok(items);
    }
    match last_error {
        Some(e) => Err(e),
        None => bail!("No exported array literal found"),
    }
}

/// Loads every configured source for every content type, one file at a time.
/// Missing files are logged and skipped.
pub async fn load_sources(config: &PipelineConfig) -> BTreeMap<ContentType, Vec<ContentRecord>> {
    let mut loaded = BTreeMap::new();
    for content_type in ContentType::ALL {
        let mut records = Vec::new();
        for relative in config.sources.paths_for(content_type) {
            let path = config.resolve(relative);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                warn!("Source {:?} for {} does not exist, skipping", path, content_type);
                continue;
            }
            records.extend(extract_records(&path, content_type).await);
        }
        info!("Loaded {} {} records in total", records.len(), content_type);
        loaded.insert(content_type, records);
    }
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_json_top_level_array() {
        let items = parse_source(r#"[{"id": "a"}, {"id": "b"}]"#, SourceFormat::Json).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_json_first_array_property() {
        let text = r#"{"version": 2, "meta": {"n": 1}, "recipes": [{"id": "r1"}], "other": [{"id": "x"}]}"#;
        let items = parse_source(text, SourceFormat::Json).unwrap();
        assert_eq!(items, vec![json!({"id": "r1"})]);
    }

    #[test]
    fn test_json_without_array_is_error() {
        assert!(parse_source(r#"{"a": 1}"#, SourceFormat::Json).is_err());
        assert!(parse_source("{broken", SourceFormat::Json).is_err());
    }

    #[test]
    fn test_js_export_const() {
        let text = r#"
import something from './elsewhere';

const helper = (x) => x * 2;

export const cols = [
  { id: 'galibier', name: 'Col du Galibier', altitude: 2642 },
  { id: 'izoard', name: "Col d'Izoard", altitude: 2360, },
];

export default cols;
"#;
        let items = parse_source(text, SourceFormat::JavaScript).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["name"], json!("Col d'Izoard"));
    }

    #[test]
    fn test_js_skips_lookup_array_before_records() {
        let text = "export const difficultyLevels = ['easy', 'hard'];\nexport const cols = [{ id: 'galibier', name: 'Col du Galibier' }];\n";
        let items = parse_source(text, SourceFormat::JavaScript).unwrap();
        assert_eq!(items, vec![json!({"id": "galibier", "name": "Col du Galibier"})]);
    }

    #[test]
    fn test_js_lookup_array_used_when_nothing_else() {
        let text = "export const difficultyLevels = ['easy', 'hard'];\n";
        let items = parse_source(text, SourceFormat::JavaScript).unwrap();
        assert_eq!(items, vec![json!("easy"), json!("hard")]);
    }

    #[test]
    fn test_js_module_exports_object() {
        let text = "module.exports = {\n  version: 1,\n  plans: [{ id: 'base' }],\n};\n";
        let items = parse_source(text, SourceFormat::JavaScript).unwrap();
        assert_eq!(items, vec![json!({"id": "base"})]);
    }

    #[test]
    fn test_js_plain_const_fallback() {
        let text = "const recipes = [{ name: 'Rice cake' }];\nexport default recipes;\n";
        let items = parse_source(text, SourceFormat::JavaScript).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_js_with_code_in_literal_fails() {
        let text = "export const cols = [{ id: makeId('a') }];";
        assert!(parse_source(text, SourceFormat::JavaScript).is_err());
    }

    #[tokio::test]
    async fn test_extract_records_skips_non_objects() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"[{{"id": "a"}}, 3, "x", {{"id": "b"}}]"#).unwrap();
        let records = extract_records(file.path(), ContentType::Cols).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].source_index, 3);
    }

    #[tokio::test]
    async fn test_extract_records_never_fails() {
        let mut file = tempfile::Builder::new().suffix(".js").tempfile().unwrap();
        write!(file, "export const cols = [{{ id: 'a' ").unwrap();
        assert!(extract_records(file.path(), ContentType::Cols).await.is_empty());
        assert!(extract_records(Path::new("/nonexistent/cols.json"), ContentType::Cols).await.is_empty());
    }
}
