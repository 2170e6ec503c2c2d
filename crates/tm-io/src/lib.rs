#![forbid(unsafe_code)]

use csv::{ReaderBuilder, WriterBuilder};
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tm_types::{FieldPath, json_type_name, render_text};
use tm_view::ViewQuery;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("json input is not a record collection (found {found})")]
    NotACollection { found: &'static str },
    #[error("csv input has no headers")]
    MissingHeaders,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

const ENVELOPE_KEYS: [&str; 2] = ["data", "items"];

/// Parse a record list. Accepts a bare array or a list-response envelope
/// carrying the array under `data` or `items`.
pub fn read_records_json(input: &str) -> Result<Vec<Value>, IoError> {
    let value: Value = serde_json::from_str(input)?;
    match value {
        Value::Array(records) => Ok(records),
        Value::Object(mut envelope) => ENVELOPE_KEYS
            .iter()
            .find_map(|key| match envelope.remove(*key) {
                Some(Value::Array(records)) => Some(records),
                _ => None,
            })
            .ok_or(IoError::NotACollection { found: "object" }),
        other => Err(IoError::NotACollection {
            found: json_type_name(&other),
        }),
    }
}

pub fn read_view_query_json(input: &str) -> Result<ViewQuery, IoError> {
    Ok(serde_json::from_str(input)?)
}

/// Read a CSV export back into flat records keyed by header.
pub fn read_records_csv(input: &str) -> Result<Vec<Value>, IoError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes());

    let headers = reader.headers().cloned()?;
    if headers.is_empty() {
        return Err(IoError::MissingHeaders);
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let record: Map<String, Value> = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.to_owned(), parse_cell(row.get(idx).unwrap_or_default())))
            .collect();
        records.push(Value::Object(record));
    }
    Ok(records)
}

/// Write one row per record with a header row of column paths. Columns may
/// be dotted paths into nested records.
pub fn write_records_csv<S: AsRef<str>>(records: &[Value], columns: &[S]) -> Result<String, IoError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    let paths: Vec<FieldPath> = columns
        .iter()
        .map(|column| FieldPath::new(column.as_ref()))
        .collect();

    writer.write_record(paths.iter().map(FieldPath::as_str))?;
    for record in records {
        let row = paths
            .iter()
            .map(|path| path.resolve(record).map(render_text).unwrap_or_default());
        writer.write_record(row)?;
    }

    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

fn parse_cell(field: &str) -> Value {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(value) = trimmed.parse::<i64>() {
        return Value::from(value);
    }
    if let Some(value) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(value);
    }
    if let Ok(value) = trimmed.parse::<bool>() {
        return Value::Bool(value);
    }
    Value::String(trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        IoError, read_records_csv, read_records_json, read_view_query_json, write_records_csv,
    };

    #[test]
    fn reads_bare_array() {
        let records = read_records_json(r#"[{"id": 1}, {"id": 2}]"#).expect("records");
        assert_eq!(records, vec![json!({"id": 1}), json!({"id": 2})]);
    }

    #[test]
    fn reads_list_envelopes() {
        let records = read_records_json(
            r#"{"data": [{"id": 7}], "pagination": {"page": 1, "page_size": 25, "total": 1}}"#,
        )
        .expect("data envelope");
        assert_eq!(records, vec![json!({"id": 7})]);

        let records = read_records_json(r#"{"items": []}"#).expect("items envelope");
        assert!(records.is_empty());
    }

    #[test]
    fn rejects_non_collections() {
        let err = read_records_json(r#"{"data": 3}"#).expect_err("scalar data");
        assert!(matches!(err, IoError::NotACollection { found: "object" }));
        let err = read_records_json("42").expect_err("number");
        assert_eq!(
            err.to_string(),
            "json input is not a record collection (found number)"
        );
        assert!(matches!(
            read_records_json("[1,"),
            Err(IoError::Json(_))
        ));
    }

    #[test]
    fn reads_view_query() {
        let query = read_view_query_json(
            r#"{"filters": {"status": "Fail", "priority": ""}, "sort": "priority_desc", "page": 2}"#,
        )
        .expect("query");
        assert_eq!(query.sort, "priority_desc");
        assert_eq!(query.page, 2);
        assert_eq!(query.page_size, 25);
        assert_eq!(query.filters.active().count(), 1);
    }

    #[test]
    fn writes_columns_in_requested_order() {
        let records = vec![
            json!({"id": 1, "title": "Login, happy path", "suite": {"name": "auth"}, "tags": ["a"]}),
            json!({"id": 2, "title": null}),
        ];
        let csv = write_records_csv(&records, &["title", "id", "suite.name", "tags"])
            .expect("csv");
        assert_eq!(
            csv,
            "title,id,suite.name,tags\n\"Login, happy path\",1,auth,\"[\"\"a\"\"]\"\n,2,,\n"
        );
    }

    #[test]
    fn csv_export_reads_back_as_flat_records() {
        let records = vec![
            json!({"id": 3, "status": "Pass", "duration": 1.5, "flaky": false}),
            json!({"id": 4, "status": "", "duration": null, "flaky": true}),
        ];
        let csv = write_records_csv(&records, &["id", "status", "duration", "flaky"])
            .expect("csv");
        let back = read_records_csv(&csv).expect("read");
        assert_eq!(back[0], records[0]);
        assert_eq!(
            back[1],
            json!({"id": 4, "status": null, "duration": null, "flaky": true})
        );
    }

    #[test]
    fn empty_csv_has_no_headers() {
        assert!(matches!(read_records_csv(""), Err(IoError::MissingHeaders)));
    }
}
