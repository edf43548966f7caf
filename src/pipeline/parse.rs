//! Response parsing: turn a VLM answer into [`TablePayload`]s.
//!
//! Models are asked for `{"tables":[{"name":..,"data":[{..},..]}]}` but the
//! answer drifts in predictable ways:
//!
//! - wrapped in ` ```json ` fences despite the prompt
//! - chatty preamble ("Here is the extracted table:") before the JSON
//! - trailing commas
//! - cut off mid-array when the answer hits `max_tokens`
//! - a bare array of rows, a single row object, or `{"headers":[..],"rows":[[..]]}`
//!   instead of the requested envelope
//! - numbers, booleans and nulls as cell values
//!
//! Rules run in order: strip fences, strict parse, repair then parse again,
//! normalise. Each is a pure function and tested on its own.

use crate::output::TablePayload;
use crate::table::Record;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Name given to tables the model did not name.
pub const DEFAULT_TABLE_NAME: &str = "Extracted Table";

/// Parse a raw model answer into tables.
///
/// Returns the strict parser's error when even the repaired text is not JSON.
pub fn parse_tables(raw: &str) -> Result<Vec<TablePayload>, serde_json::Error> {
    let cleaned = strip_fences(raw);

    let value = match serde_json::from_str::<Value>(cleaned) {
        Ok(v) => v,
        Err(strict_err) => {
            warn!("JSON parse failed ({strict_err}), attempting repair");
            let repaired = repair_json(cleaned);
            serde_json::from_str::<Value>(&repaired).map_err(|_| strict_err)?
        }
    };

    let tables = normalise(value);
    debug!(
        "Parsed {} table(s), {} row(s)",
        tables.len(),
        tables.iter().map(|t| t.rows.len()).sum::<usize>()
    );
    Ok(tables)
}

// ── Rule 1: Strip fences ─────────────────────────────────────────────────────

/// Remove an opening fence line (with its info string) and a closing fence.
/// Backticks inside the JSON itself are left alone.
fn strip_fences(input: &str) -> &str {
    let mut body = input.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

// ── Rule 2: Repair ───────────────────────────────────────────────────────────

/// Best-effort repair of almost-JSON.
///
/// Drops any preamble before the first `{`/`[` and anything after the
/// top-level value closes, removes trailing commas, and closes truncated
/// output: first by terminating the open string and brackets, and if that
/// is still invalid, by cutting back to the last complete element.
pub fn repair_json(input: &str) -> String {
    let start = input.find(['{', '[']).unwrap_or(0);
    let mut out = String::with_capacity(input.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut last_cut: Option<(usize, Vec<char>)> = None;

    for c in input[start..].chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '{' => {
                stack.push('}');
                out.push(c);
            }
            '[' => {
                stack.push(']');
                out.push(c);
            }
            '}' | ']' => {
                trim_trailing_comma(&mut out);
                out.push(c);
                stack.pop();
                if stack.is_empty() {
                    return out;
                }
                last_cut = Some((out.len(), stack.clone()));
            }
            ',' => {
                last_cut = Some((out.len(), stack.clone()));
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    // Truncated: close what is open.
    let mut closed = out.clone();
    if in_string {
        if escaped {
            closed.pop();
        }
        closed.push('"');
    }
    trim_trailing_comma(&mut closed);
    if closed.ends_with(':') {
        closed.push_str("null");
    }
    close_all(&mut closed, &stack);
    if serde_json::from_str::<Value>(&closed).is_ok() {
        return closed;
    }

    match last_cut {
        Some((at, stack)) => {
            let mut cut = out[..at].to_string();
            trim_trailing_comma(&mut cut);
            close_all(&mut cut, &stack);
            cut
        }
        None => closed,
    }
}

fn trim_trailing_comma(s: &mut String) {
    let trimmed_len = s.trim_end().len();
    s.truncate(trimmed_len);
    if s.ends_with(',') {
        s.pop();
        let trimmed_len = s.trim_end().len();
        s.truncate(trimmed_len);
    }
}

fn close_all(s: &mut String, stack: &[char]) {
    s.extend(stack.iter().rev());
}

// ── Rule 3: Normalise ────────────────────────────────────────────────────────

fn normalise(value: Value) -> Vec<TablePayload> {
    match value {
        Value::Object(mut map) => {
            if map.get("tables").is_some_and(Value::is_array) {
                if let Some(Value::Array(tables)) = map.remove("tables") {
                    return tables.into_iter().filter_map(table_from_value).collect();
                }
            }
            if looks_like_table(&map) {
                return table_from_value(Value::Object(map)).into_iter().collect();
            }
            vec![TablePayload::new(DEFAULT_TABLE_NAME, vec![record_from_map(map)])]
        }
        Value::Array(items) => {
            let all_tables = !items.is_empty()
                && items
                    .iter()
                    .all(|v| v.as_object().is_some_and(looks_like_table));
            if all_tables {
                items.into_iter().filter_map(table_from_value).collect()
            } else {
                vec![TablePayload::new(DEFAULT_TABLE_NAME, rows_from_values(items, &[]))]
            }
        }
        other => {
            warn!("Model answered with a bare {}, not a table", type_name(&other));
            Vec::new()
        }
    }
}

fn looks_like_table(map: &Map<String, Value>) -> bool {
    ["data", "rows"]
        .iter()
        .any(|k| map.get(*k).is_some_and(Value::is_array))
}

fn table_from_value(value: Value) -> Option<TablePayload> {
    match value {
        Value::Object(mut map) => {
            let name = match map.get("name").and_then(Value::as_str).map(str::trim) {
                Some(n) if !n.is_empty() => n.to_string(),
                _ => DEFAULT_TABLE_NAME.to_string(),
            };
            let headers: Vec<String> = ["headers", "columns"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_array))
                .map(|hs| hs.iter().map(cell_text).collect())
                .unwrap_or_default();
            let rows = match map.remove("data").or_else(|| map.remove("rows")) {
                Some(Value::Array(items)) => rows_from_values(items, &headers),
                _ => Vec::new(),
            };
            Some(TablePayload::new(name, rows))
        }
        Value::Array(items) => Some(TablePayload::new(
            DEFAULT_TABLE_NAME,
            rows_from_values(items, &[]),
        )),
        _ => None,
    }
}

/// Object rows keep their key order; list rows are zipped with `headers`
/// (or `Column N` when there are none).
fn rows_from_values(items: Vec<Value>, headers: &[String]) -> Vec<Record> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(record_from_map(map)),
            Value::Array(cells) => Some(
                cells
                    .iter()
                    .enumerate()
                    .map(|(i, cell)| {
                        let key = headers
                            .get(i)
                            .cloned()
                            .unwrap_or_else(|| format!("Column {}", i + 1));
                        (key, cell_text(cell))
                    })
                    .collect(),
            ),
            _ => None,
        })
        .collect()
}

fn record_from_map(map: Map<String, Value>) -> Record {
    map.into_iter().map(|(k, v)| (k, cell_text(&v))).collect()
}

/// Display text for a JSON cell value.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn keys(t: &TablePayload) -> Vec<&str> {
        t.rows[0].keys().map(String::as_str).collect()
    }

    #[test]
    fn envelope_with_fences() {
        let raw = "```json\n{\"tables\":[{\"name\":\"Sales\",\"data\":[{\"Region\":\"North\",\"Total\":120}]}]}\n```";
        let tables = parse_tables(raw).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "Sales");
        assert_eq!(keys(&tables[0]), vec!["Region", "Total"]);
        assert_eq!(tables[0].rows[0]["Total"], "120");
    }

    #[test]
    fn backticks_inside_cells_survive_fence_stripping() {
        let raw = "```JSON\n{\"tables\":[{\"name\":\"Code\",\"data\":[{\"Snippet\":\"```rm -rf```\",\"Note\":\"use `ls`\"}]}]}\n```";
        let tables = parse_tables(raw).unwrap();
        assert_eq!(tables[0].rows[0]["Snippet"], "```rm -rf```");
        assert_eq!(tables[0].rows[0]["Note"], "use `ls`");

        let inline = "```json{\"tables\":[{\"name\":\"T\",\"data\":[{\"a\":\"1\"}]}]}```";
        assert_eq!(parse_tables(inline).unwrap()[0].rows[0]["a"], "1");
    }

    #[test]
    fn key_order_is_preserved() {
        let raw = r#"{"tables":[{"name":"T","data":[{"z":"1","a":"2","m":"3"}]}]}"#;
        let tables = parse_tables(raw).unwrap();
        assert_eq!(keys(&tables[0]), vec!["z", "a", "m"]);
    }

    #[test]
    fn bare_array_and_single_object() {
        let tables = parse_tables(r#"[{"a":"1"},{"a":"2"}]"#).unwrap();
        assert_eq!(tables[0].name, DEFAULT_TABLE_NAME);
        assert_eq!(tables[0].rows.len(), 2);

        let tables = parse_tables(r#"{"Field":"Total","Value":"9.99"}"#).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows.len(), 1);
        assert_eq!(tables[0].rows[0]["Value"], "9.99");
    }

    #[test]
    fn headers_with_list_rows() {
        let raw = r#"{"tables":[{"headers":["A","B"],"rows":[["1","2"],["3"]]}]}"#;
        let tables = parse_tables(raw).unwrap();
        assert_eq!(tables[0].name, DEFAULT_TABLE_NAME);
        assert_eq!(tables[0].rows[0]["B"], "2");
        assert_eq!(tables[0].rows[1].len(), 1);
    }

    #[test]
    fn scalar_cells_are_coerced() {
        let raw = r#"[{"n":1.5,"b":true,"z":null,"o":{"x":1}}]"#;
        let row = &parse_tables(raw).unwrap()[0].rows[0];
        assert_eq!(row["n"], "1.5");
        assert_eq!(row["b"], "true");
        assert_eq!(row["z"], "");
        assert_eq!(row["o"], r#"{"x":1}"#);
    }

    #[test]
    fn preamble_and_trailing_commas_are_repaired() {
        let raw = "Here is the table:\n{\"tables\":[{\"name\":\"T\",\"data\":[{\"a\":\"1\",},],},]}\nHope this helps!";
        let tables = parse_tables(raw).unwrap();
        assert_eq!(tables[0].rows[0]["a"], "1");
    }

    #[test]
    fn truncated_string_is_closed() {
        let raw = r#"{"tables":[{"name":"T","data":[{"a":"1"},{"a":"tru"#;
        let tables = parse_tables(raw).unwrap();
        assert_eq!(tables[0].rows.len(), 2);
        assert_eq!(tables[0].rows[1]["a"], "tru");
    }

    #[test]
    fn truncated_key_is_cut_back() {
        let raw = r#"{"tables":[{"name":"T","data":[{"a":"1"},{"a":"2","b"#;
        let tables = parse_tables(raw).unwrap();
        assert_eq!(tables[0].rows.len(), 2);
        assert_eq!(tables[0].rows[1].len(), 1);
    }

    #[test]
    fn dangling_colon_becomes_null() {
        assert_eq!(repair_json(r#"[{"a":"#), r#"[{"a":null}]"#);
    }

    #[test]
    fn commas_inside_strings_survive_repair() {
        assert_eq!(repair_json(r#"[{"a":"x, ]"},]"#), r#"[{"a":"x, ]"}]"#);
    }

    #[test]
    fn hopeless_input_reports_error() {
        assert!(parse_tables("I could not find any table in this image.").is_err());
    }

    #[test]
    fn scalar_answer_yields_no_tables() {
        assert!(parse_tables("42").unwrap().is_empty());
    }
}
