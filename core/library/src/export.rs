//! Export of selected resources as JSON, CSV or plain text

use chrono::{DateTime, SecondsFormat, Utc};
use heritage_library_schemas::{BatchFailure, ExportFormat, Resource, ResourceRef};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{LibraryError, Result};
use crate::store::LibraryStore;

/// A rendered export ready to be sent as an attachment
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub body: String,
    /// References that did not resolve to a stored resource
    pub missing: Vec<BatchFailure>,
}

pub fn export_resources(
    store: &mut LibraryStore,
    refs: &[ResourceRef],
    format: &str,
    filename: &str,
    now: DateTime<Utc>,
) -> Result<ExportFile> {
    let format = ExportFormat::parse(format).ok_or_else(|| {
        LibraryError::Validation(format!(
            "unsupported export format {}, expected json, csv or txt",
            format
        ))
    })?;

    let mut resources = Vec::with_capacity(refs.len());
    let mut missing = Vec::new();
    for item in refs {
        match store.get(&item.category, &item.id) {
            Ok(resource) => resources.push(resource),
            Err(e) => {
                warn!("Export skipped {}/{}: {}", item.category, item.id, e);
                missing.push(BatchFailure {
                    category: item.category.clone(),
                    id: item.id.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    if resources.is_empty() {
        return Err(LibraryError::Validation(
            "no exportable resources found".to_string(),
        ));
    }

    let body = render(format, &resources)?;
    let filename = export_file_name(filename, format, now);
    info!("Exported {} resources as {}", resources.len(), filename);

    Ok(ExportFile {
        filename,
        content_type: format.content_type(),
        body,
        missing,
    })
}

pub fn render(format: ExportFormat, resources: &[Resource]) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(resources)?),
        ExportFormat::Csv => render_csv(resources),
        ExportFormat::Txt => Ok(render_txt(resources)),
    }
}

/// Columns are the scalar fields of the first record, in field order; fields
/// only later records carry are left out
pub fn render_csv(resources: &[Resource]) -> Result<String> {
    let rows = resources
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<Value>, _>>()?;

    let Some(Value::Object(first)) = rows.first() else {
        return Ok(String::new());
    };

    let headers: Vec<&String> = first
        .iter()
        .filter(|(_, v)| !v.is_array() && !v.is_object())
        .map(|(k, _)| k)
        .collect();

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        headers
            .iter()
            .map(|h| h.as_str())
            .collect::<Vec<_>>()
            .join(","),
    );

    for row in &rows {
        let cells: Vec<String> = headers
            .iter()
            .map(|header| csv_cell(row.get(header.as_str())))
            .collect();
        lines.push(cells.join(","));
    }

    Ok(lines.join("\n"))
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Array(items)) => {
            let joined = items.iter().map(plain_text).collect::<Vec<_>>().join("; ");
            quote(&joined)
        }
        Some(other) => quote(&plain_text(other)),
    }
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn quote(raw: &str) -> String {
    format!("\"{}\"", raw.replace('"', "\"\""))
}

pub fn render_txt(resources: &[Resource]) -> String {
    resources
        .iter()
        .map(|resource| {
            [
                format!("标题: {}", or_default(&resource.title, "未命名")),
                format!("分类: {}", or_default(&resource.category, "未分类")),
                format!("描述: {}", or_default(&resource.description, "无描述")),
                format!("标签: {}", resource.tags.join(", ")),
                format!(
                    "创建时间: {}",
                    resource.created_at.as_deref().unwrap_or("未知")
                ),
                format!(
                    "更新时间: {}",
                    resource.updated_at.as_deref().unwrap_or("未知")
                ),
                "---".to_string(),
            ]
            .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

/// `<base>_<timestamp>.<ext>` with `:` and `.` in the timestamp replaced by `-`
pub fn export_file_name(base: &str, format: ExportFormat, now: DateTime<Utc>) -> String {
    let base = if base.trim().is_empty() {
        "exported_resources"
    } else {
        base.trim()
    };
    let timestamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{}_{}.{}", base, timestamp, format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use heritage_library_schemas::ResourceId;
    use tempfile::TempDir;

    fn resource(id: &str, title: &str, description: &str) -> Resource {
        Resource {
            id: ResourceId::from(id),
            title: title.to_string(),
            description: description.to_string(),
            tags: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 15).unwrap()
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            export_file_name("exported_resources", ExportFormat::Csv, fixed_now()),
            "exported_resources_2024-05-01T08-30-15-000Z.csv"
        );
        assert_eq!(
            export_file_name("", ExportFormat::Json, fixed_now()),
            "exported_resources_2024-05-01T08-30-15-000Z.json"
        );
    }

    #[test]
    fn test_csv_quotes_and_arrays() {
        let first = resource("r1", "Say \"hi\"", "plain");
        let second = resource("r2", "Second", "line");

        let csv = render_csv(&[first, second]).unwrap();
        let lines: Vec<&str> = csv.split('\n').collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "id,title,description,category");
        assert_eq!(lines[1], "\"r1\",\"Say \"\"hi\"\"\",\"plain\",\"\"");
        assert!(!lines[0].contains("tags"));
    }

    #[test]
    fn test_csv_header_comes_from_first_record_only() {
        let mut first = resource("r1", "剪纸", "窗花");
        first
            .extra
            .insert("technique".to_string(), serde_json::json!("折叠后剪"));
        let mut second = resource("r2", "京剧", "戏曲");
        second.created_at = Some("2024-01-01T00:00:00.000Z".to_string());
        second
            .extra
            .insert("history".to_string(), serde_json::json!("清代形成"));

        let csv = render_csv(&[first, second]).unwrap();
        let lines: Vec<&str> = csv.split('\n').collect();

        assert_eq!(lines[0], "id,title,description,category,technique");
        assert_eq!(lines[2], "\"r2\",\"京剧\",\"戏曲\",\"\",");
        assert!(!csv.contains("history"));
        assert!(!csv.contains("清代形成"));
        assert!(!csv.contains("createdAt"));
        assert!(!csv.contains("2024-01-01"));
    }

    #[test]
    fn test_csv_null_and_array_cells() {
        assert_eq!(csv_cell(None), "");
        assert_eq!(csv_cell(Some(&Value::Null)), "");
        assert_eq!(
            csv_cell(Some(&serde_json::json!(["x", "y \"z\""]))),
            "\"x; y \"\"z\"\"\""
        );
        assert_eq!(csv_cell(Some(&serde_json::json!(42))), "\"42\"");
    }

    #[test]
    fn test_txt_blocks() {
        let txt = render_txt(&[resource("r1", "", ""), resource("r2", "Kite", "Flies")]);
        let blocks: Vec<&str> = txt.split("\n\n").collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("标题: 未命名\n分类: 未分类"));
        assert!(blocks[0].contains("描述: 无描述"));
        assert!(blocks[0].contains("创建时间: 未知\n更新时间: 未知"));
        assert!(blocks[1].contains("标签: a, b"));
        assert!(blocks[1].ends_with("---"));
    }

    #[test]
    fn test_export_reports_missing_refs() {
        let temp = TempDir::new().unwrap();
        let mut store = LibraryStore::new(temp.path());
        store.add("foods", resource("r1", "烤鸭", "")).unwrap();

        let refs = vec![
            ResourceRef::new("foods", "r1"),
            ResourceRef::new("foods", "ghost"),
        ];
        let file = export_resources(&mut store, &refs, "JSON", "picks", fixed_now()).unwrap();

        assert_eq!(file.content_type, "application/json");
        assert!(file.filename.starts_with("picks_2024-05-01T08-30-15"));
        assert_eq!(file.missing.len(), 1);
        let parsed: Vec<Resource> = serde_json::from_str(&file.body).unwrap();
        assert_eq!(parsed[0].title, "烤鸭");
    }

    #[test]
    fn test_export_rejects_bad_format_and_empty_selection() {
        let temp = TempDir::new().unwrap();
        let mut store = LibraryStore::new(temp.path());
        store.add("foods", resource("r1", "烤鸭", "")).unwrap();

        let refs = vec![ResourceRef::new("foods", "r1")];
        assert!(matches!(
            export_resources(&mut store, &refs, "xml", "x", fixed_now()),
            Err(LibraryError::Validation(_))
        ));

        let ghost = vec![ResourceRef::new("foods", "ghost")];
        assert!(matches!(
            export_resources(&mut store, &ghost, "csv", "x", fixed_now()),
            Err(LibraryError::Validation(_))
        ));
    }
}
