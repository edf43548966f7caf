//! XLSX export via `rust_xlsxwriter`: one worksheet per table.
//!
//! Styling mirrors the on-screen grid: a dark header band with bold white
//! text, a bold tinted first column, numeric cells written as numbers and
//! centred, every column 15 characters wide.

use super::NamedTable;
use crate::error::Pic2CsvError;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, XlsxError};
use std::collections::HashSet;

/// Excel's hard limit on worksheet name length.
pub const MAX_SHEET_NAME: usize = 31;

const COLUMN_WIDTH: f64 = 15.0;

/// Plain decimal numbers only: "007" or "1e5" stay text.
static NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(0|[1-9]\d*)(\.\d+)?$").expect("valid numeric regex"));

fn export_err(detail: impl std::fmt::Display) -> Pic2CsvError {
    Pic2CsvError::ExportFailed {
        format: "XLSX",
        detail: detail.to_string(),
    }
}

impl From<XlsxError> for Pic2CsvError {
    fn from(e: XlsxError) -> Self {
        export_err(e)
    }
}

/// Worksheet names for `tables`, in order.
///
/// Forbidden characters (`[]:*?/\`) are dropped, names are cut to
/// [`MAX_SHEET_NAME`] characters, blanks become `Table <n>` and repeats get a
/// ` (2)`, ` (3)` ... suffix (compared case-insensitively, as Excel does).
pub fn sheet_names(tables: &[NamedTable]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(tables.len());

    for (i, named) in tables.iter().enumerate() {
        let cleaned: String = named
            .name
            .chars()
            .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
            .collect();
        let cleaned = cleaned.trim().trim_matches('\'').trim();
        let base = if cleaned.is_empty() {
            format!("Table {}", i + 1)
        } else {
            truncate(cleaned, MAX_SHEET_NAME)
        };

        let mut candidate = base.clone();
        let mut n = 2;
        while taken.contains(&candidate.to_lowercase()) {
            let suffix = format!(" ({n})");
            candidate = format!(
                "{}{}",
                truncate(&base, MAX_SHEET_NAME - suffix.chars().count()),
                suffix
            );
            n += 1;
        }
        taken.insert(candidate.to_lowercase());
        names.push(candidate);
    }
    names
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect::<String>().trim_end().to_string()
}

/// Build the workbook in memory.
pub fn workbook_bytes(tables: &[NamedTable]) -> Result<Vec<u8>, Pic2CsvError> {
    let header = Format::new()
        .set_bold()
        .set_font_size(12)
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(0x4A5568))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter);
    let first_column = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xE2E8F0))
        .set_align(FormatAlign::Left);
    let number = Format::new().set_align(FormatAlign::Center);

    let mut workbook = Workbook::new();
    if tables.is_empty() {
        workbook.add_worksheet().set_name("Table 1")?;
    }

    for (named, sheet_name) in tables.iter().zip(sheet_names(tables)) {
        let sheet = workbook.add_worksheet();
        sheet.set_name(&sheet_name)?;

        for (c, key) in named.table.columns.iter().enumerate() {
            let col = u16::try_from(c).map_err(export_err)?;
            sheet.write_string_with_format(0, col, key, &header)?;
            sheet.set_column_width(col, COLUMN_WIDTH)?;
        }

        for (r, row) in named.table.rows.iter().enumerate() {
            let excel_row = u32::try_from(r + 1).map_err(export_err)?;
            for (c, key) in named.table.columns.iter().enumerate() {
                let col = u16::try_from(c).map_err(export_err)?;
                let value = row.get(key).map(String::as_str).unwrap_or("");
                if c == 0 {
                    sheet.write_string_with_format(excel_row, col, value, &first_column)?;
                } else if let Some(n) = as_number(value) {
                    sheet.write_number_with_format(excel_row, col, n, &number)?;
                } else if !value.is_empty() {
                    sheet.write_string(excel_row, col, value)?;
                }
            }
        }
        tracing::debug!(
            "Sheet '{}': {} columns, {} rows",
            sheet_name,
            named.table.columns.len(),
            named.table.rows.len()
        );
    }

    Ok(workbook.save_to_buffer()?)
}

fn as_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if !NUMERIC.is_match(trimmed) {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::sample;
    use pretty_assertions::assert_eq;

    fn named(name: &str) -> NamedTable {
        let mut t = sample("x");
        t.name = name.to_string();
        t
    }

    #[test]
    fn sheet_names_sanitised_and_unique() {
        let long = "A very long table name that exceeds the limit";
        let names = sheet_names(&[
            named("Q1: Sales/Costs"),
            named(""),
            named("Totals"),
            named("totals"),
            named(long),
            named(long),
        ]);
        assert_eq!(names[0], "Q1 SalesCosts");
        assert_eq!(names[1], "Table 2");
        assert_eq!(names[2], "Totals");
        assert_eq!(names[3], "totals (2)");
        assert_eq!(names[4].chars().count(), MAX_SHEET_NAME);
        assert!(names[5].ends_with(" (2)"));
        assert!(names[5].chars().count() <= MAX_SHEET_NAME);
    }

    #[test]
    fn numeric_detection() {
        assert_eq!(as_number("12"), Some(12.0));
        assert_eq!(as_number("-4.50"), Some(-4.5));
        assert_eq!(as_number("007"), None);
        assert_eq!(as_number("1e5"), None);
        assert_eq!(as_number(""), None);
        assert_eq!(as_number("12 kg"), None);
    }

    #[test]
    fn workbook_is_a_zip_container() {
        let bytes = workbook_bytes(&[named("A"), named("B")]).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn empty_export_still_valid() {
        let bytes = workbook_bytes(&[]).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}
