//! CSV export via the `csv` crate.
//!
//! One table renders as a header line followed by its rows, cells ordered by
//! the table's columns. Several tables render as blocks of
//! `# TABLE: <name>` + CSV, separated by a blank line.

use super::NamedTable;
use crate::error::Pic2CsvError;
use crate::table::TableSnapshot;
use csv::{QuoteStyle, Terminator, WriterBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,
    /// Quote every field instead of only those that need it.
    pub quote_all: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote_all: false,
        }
    }
}

fn export_err(detail: impl std::fmt::Display) -> Pic2CsvError {
    Pic2CsvError::ExportFailed {
        format: "CSV",
        detail: detail.to_string(),
    }
}

/// Render one table. A table with no columns renders as an empty string.
pub fn to_string(table: &TableSnapshot, options: &CsvOptions) -> Result<String, Pic2CsvError> {
    if table.columns.is_empty() {
        return Ok(String::new());
    }

    let mut writer = WriterBuilder::new()
        .delimiter(options.delimiter)
        .terminator(Terminator::Any(b'\n'))
        .quote_style(if options.quote_all {
            QuoteStyle::Always
        } else {
            QuoteStyle::Necessary
        })
        .from_writer(Vec::new());

    writer.write_record(&table.columns).map_err(export_err)?;
    for row in &table.rows {
        writer
            .write_record(
                table
                    .columns
                    .iter()
                    .map(|key| row.get(key).map(String::as_str).unwrap_or("")),
            )
            .map_err(export_err)?;
    }

    let bytes = writer.into_inner().map_err(export_err)?;
    String::from_utf8(bytes).map_err(export_err)
}

/// Render several tables into one document, each preceded by a
/// `# TABLE: <name>` line.
pub fn merged(tables: &[NamedTable], options: &CsvOptions) -> Result<String, Pic2CsvError> {
    let mut out = String::new();
    for (i, named) in tables.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let name = match named.name.trim() {
            "" => "Untitled",
            name => name,
        };
        out.push_str("# TABLE: ");
        out.push_str(name);
        out.push('\n');
        out.push_str(&to_string(&named.table, options)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::sample;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_table_quotes_only_when_needed() {
        let csv = to_string(&sample("T").table, &CsvOptions::default()).unwrap();
        assert_eq!(csv, "Item,Amount\nPens,4.50\n\"Paper, A4\",12\n");
    }

    #[test]
    fn quote_all_and_custom_delimiter() {
        let options = CsvOptions {
            delimiter: b';',
            quote_all: true,
        };
        let csv = to_string(&sample("T").table, &options).unwrap();
        assert_eq!(
            csv,
            "\"Item\";\"Amount\"\n\"Pens\";\"4.50\"\n\"Paper, A4\";\"12\"\n"
        );
    }

    #[test]
    fn embedded_quotes_and_newlines_escape() {
        let mut named = sample("T");
        named.table.rows[0].insert("Item".into(), "say \"hi\"\nthere".into());
        let csv = to_string(&named.table, &CsvOptions::default()).unwrap();
        assert!(csv.contains("\"say \"\"hi\"\"\nthere\""));
    }

    #[test]
    fn zero_rows_still_has_header() {
        let table = TableSnapshot {
            columns: vec!["A".into(), "B".into()],
            rows: vec![],
        };
        assert_eq!(to_string(&table, &CsvOptions::default()).unwrap(), "A,B\n");
        assert_eq!(
            to_string(&TableSnapshot::default(), &CsvOptions::default()).unwrap(),
            ""
        );
    }

    #[test]
    fn merged_blocks() {
        let tables = vec![sample("Expenses"), sample("  ")];
        let csv = merged(&tables, &CsvOptions::default()).unwrap();
        let expected = "\
# TABLE: Expenses
Item,Amount
Pens,4.50
\"Paper, A4\",12

# TABLE: Untitled
Item,Amount
Pens,4.50
\"Paper, A4\",12
";
        assert_eq!(csv, expected);
    }
}
