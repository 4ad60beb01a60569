use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Output format for CLI results.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table.
    Table,
    /// JSON output.
    Json,
}

/// Print `rows` as a table or a JSON array.
pub fn print_rows<T: Tabled + Serialize>(rows: &[T], format: OutputFormat, empty: &str) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(rows)?);
        }
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("{empty}");
            } else {
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }
    }
    Ok(())
}

/// Print a single JSON object or a two-column table of its fields.
pub fn print_summary(fields: &[(&str, String)], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let object: serde_json::Map<String, serde_json::Value> = fields
                .iter()
                .map(|(key, value)| (key.to_string(), serde_json::Value::String(value.clone())))
                .collect();
            println!("{}", serde_json::to_string_pretty(&object)?);
        }
        OutputFormat::Table => {
            let rows: Vec<FieldRow> = fields
                .iter()
                .map(|(key, value)| FieldRow {
                    field: key.to_string(),
                    value: value.clone(),
                })
                .collect();
            println!("{}", Table::new(&rows).with(Style::rounded()));
        }
    }
    Ok(())
}

/// Bytes shown as text, with anything unprintable escaped.
pub fn display_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ => bytes.escape_ascii().to_string(),
    }
}

#[derive(Tabled, Serialize)]
struct FieldRow {
    field: String,
    value: String,
}

#[derive(Tabled, Serialize)]
pub struct PostingRow {
    pub docid: u64,
    pub wdf: u32,
    pub doclength: u64,
}

#[derive(Tabled, Serialize)]
pub struct TermRow {
    pub term: String,
    pub wdf: u32,
    pub termfreq: u64,
    pub positions: String,
}

#[derive(Tabled, Serialize)]
pub struct ValueRow {
    pub docid: u64,
    pub slot: u32,
    pub value: String,
}

#[derive(Tabled, Serialize)]
pub struct HitRow {
    pub rank: usize,
    pub docid: u64,
    pub percent: i32,
    pub weight: String,
    pub data: String,
}

#[derive(Tabled, Serialize)]
pub struct TableStatusRow {
    pub table: String,
    pub status: String,
}
