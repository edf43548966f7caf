//! PDF export via `lopdf`.
//!
//! A4 portrait, built-in Helvetica. Each table starts on a new page with its
//! name as a title; tables taller than a page continue on further pages with
//! the header row repeated. Cell text that does not fit its column is cut
//! with `..`.

use super::NamedTable;
use crate::error::Pic2CsvError;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 40;
const TITLE_BASELINE: i64 = PAGE_HEIGHT - 56;
const TABLE_TOP: i64 = PAGE_HEIGHT - 72;
const ROW_HEIGHT: i64 = 18;
const FONT_SIZE: i64 = 9;
const TITLE_SIZE: i64 = 14;
const CELL_PADDING: i64 = 4;

/// Body rows that fit under the header row on one page.
pub const ROWS_PER_PAGE: usize = ((TABLE_TOP - MARGIN) / ROW_HEIGHT - 1) as usize;

fn export_err(detail: impl std::fmt::Display) -> Pic2CsvError {
    Pic2CsvError::ExportFailed {
        format: "PDF",
        detail: detail.to_string(),
    }
}

/// Build the document in memory.
pub fn document_bytes(tables: &[NamedTable]) -> Result<Vec<u8>, Pic2CsvError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    if tables.is_empty() {
        kids.push(add_page(&mut doc, pages_id, Vec::new())?.into());
    }
    for named in tables {
        for operations in layout_table(named) {
            kids.push(add_page(&mut doc, pages_id, operations)?.into());
        }
    }

    let count = kids.len() as i64;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut buf = Vec::new();
    doc.save_to(&mut buf).map_err(export_err)?;
    Ok(buf)
}

fn add_page(
    doc: &mut Document,
    parent: ObjectId,
    operations: Vec<Operation>,
) -> Result<ObjectId, Pic2CsvError> {
    let content = Content { operations };
    let stream = Stream::new(dictionary! {}, content.encode().map_err(export_err)?);
    let content_id = doc.add_object(stream);
    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => parent,
        "Contents" => content_id,
    }))
}

// ── Layout ───────────────────────────────────────────────────────────────────

/// Page content streams for one table.
fn layout_table(named: &NamedTable) -> Vec<Vec<Operation>> {
    let title = match named.name.trim() {
        "" => "Untitled",
        name => name,
    };
    let columns = &named.table.columns;
    if columns.is_empty() {
        let mut ops = Vec::new();
        text(&mut ops, "F2", TITLE_SIZE, MARGIN, TITLE_BASELINE, title);
        text(&mut ops, "F1", FONT_SIZE, MARGIN, TABLE_TOP - ROW_HEIGHT, "(empty table)");
        return vec![ops];
    }

    let col_width = (PAGE_WIDTH - 2 * MARGIN) / columns.len() as i64;
    let max_chars = max_chars_for(col_width);

    let body: Vec<Vec<&str>> = named
        .table
        .rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|key| row.get(key).map(String::as_str).unwrap_or(""))
                .collect()
        })
        .collect();

    let chunks: Vec<&[Vec<&str>]> = if body.is_empty() {
        vec![&body[..]]
    } else {
        body.chunks(ROWS_PER_PAGE).collect()
    };

    chunks
        .into_iter()
        .enumerate()
        .map(|(page_no, rows)| {
            let mut ops = Vec::new();
            let heading = if page_no == 0 {
                title.to_string()
            } else {
                format!("{title} (continued)")
            };
            text(&mut ops, "F2", TITLE_SIZE, MARGIN, TITLE_BASELINE, &heading);

            // Header band.
            let mut y = TABLE_TOP - ROW_HEIGHT;
            fill(&mut ops, (0.29, 0.33, 0.41), MARGIN, y, col_width * columns.len() as i64);
            ops.push(Operation::new(
                "rg",
                vec![Object::Real(1.0), Object::Real(1.0), Object::Real(1.0)],
            ));
            for (c, key) in columns.iter().enumerate() {
                let x = MARGIN + c as i64 * col_width + CELL_PADDING;
                text(&mut ops, "F2", FONT_SIZE, x, y + 6, &clip(key, max_chars));
            }
            ops.push(Operation::new(
                "rg",
                vec![Object::Real(0.0), Object::Real(0.0), Object::Real(0.0)],
            ));

            for (r, cells) in rows.iter().enumerate() {
                y -= ROW_HEIGHT;
                if r % 2 == 1 {
                    fill(&mut ops, (0.96, 0.97, 0.98), MARGIN, y, col_width * columns.len() as i64);
                    ops.push(Operation::new(
                        "rg",
                        vec![Object::Real(0.0), Object::Real(0.0), Object::Real(0.0)],
                    ));
                }
                for (c, value) in cells.iter().enumerate() {
                    let x = MARGIN + c as i64 * col_width + CELL_PADDING;
                    let font = if c == 0 { "F2" } else { "F1" };
                    text(&mut ops, font, FONT_SIZE, x, y + 6, &clip(value, max_chars));
                }
            }

            grid(&mut ops, columns.len() as i64, rows.len() as i64 + 1, col_width);
            ops
        })
        .collect()
}

/// Helvetica averages roughly half an em per glyph.
fn max_chars_for(col_width: i64) -> usize {
    (((col_width - 2 * CELL_PADDING) * 2 / FONT_SIZE).max(1)) as usize
}

fn clip(value: &str, max_chars: usize) -> String {
    let single_line = value.replace(['\n', '\r'], " ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let keep = max_chars.saturating_sub(2);
    let mut clipped: String = single_line.chars().take(keep).collect();
    clipped.push_str("..");
    clipped
}

/// Map to WinAnsi bytes; characters outside Latin-1 become `?`.
fn win_ansi(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| match u32::from(c) {
            0x20..=0x7E | 0xA0..=0xFF => c as u8,
            _ => b'?',
        })
        .collect()
}

fn text(ops: &mut Vec<Operation>, font: &str, size: i64, x: i64, y: i64, s: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![font.into(), size.into()]));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new("Tj", vec![Object::string_literal(win_ansi(s))]));
    ops.push(Operation::new("ET", vec![]));
}

fn fill(ops: &mut Vec<Operation>, rgb: (f32, f32, f32), x: i64, y: i64, width: i64) {
    ops.push(Operation::new(
        "rg",
        vec![Object::Real(rgb.0), Object::Real(rgb.1), Object::Real(rgb.2)],
    ));
    ops.push(Operation::new(
        "re",
        vec![x.into(), y.into(), width.into(), ROW_HEIGHT.into()],
    ));
    ops.push(Operation::new("f", vec![]));
}

fn grid(ops: &mut Vec<Operation>, cols: i64, rows: i64, col_width: i64) {
    ops.push(Operation::new(
        "RG",
        vec![Object::Real(0.8), Object::Real(0.8), Object::Real(0.8)],
    ));
    ops.push(Operation::new("w", vec![Object::Real(0.5)]));
    let top = TABLE_TOP;
    let bottom = TABLE_TOP - rows * ROW_HEIGHT;
    let right = MARGIN + cols * col_width;
    for r in 0..=rows {
        let y = top - r * ROW_HEIGHT;
        line(ops, MARGIN, y, right, y);
    }
    for c in 0..=cols {
        let x = MARGIN + c * col_width;
        line(ops, x, top, x, bottom);
    }
    ops.push(Operation::new("S", vec![]));
}

fn line(ops: &mut Vec<Operation>, x1: i64, y1: i64, x2: i64, y2: i64) {
    ops.push(Operation::new("m", vec![x1.into(), y1.into()]));
    ops.push(Operation::new("l", vec![x2.into(), y2.into()]));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::sample;
    use crate::table::{Record, TableSnapshot};

    fn page_count(bytes: &[u8]) -> usize {
        Document::load_mem(bytes).unwrap().get_pages().len()
    }

    #[test]
    fn one_page_per_small_table() {
        let bytes = document_bytes(&[sample("A"), sample("B")]).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        assert_eq!(page_count(&bytes), 2);
    }

    #[test]
    fn tall_tables_overflow() {
        let rows: Vec<Record> = (0..ROWS_PER_PAGE + 1)
            .map(|i| Record::from_iter([("N".to_string(), i.to_string())]))
            .collect();
        let named = NamedTable {
            name: "Long".into(),
            table: TableSnapshot {
                columns: vec!["N".into()],
                rows,
            },
        };
        assert_eq!(page_count(&document_bytes(&[named]).unwrap()), 2);
    }

    #[test]
    fn empty_inputs_render() {
        assert_eq!(page_count(&document_bytes(&[]).unwrap()), 1);
        let headers_only = NamedTable {
            name: String::new(),
            table: TableSnapshot {
                columns: vec!["A".into()],
                rows: vec![],
            },
        };
        assert_eq!(page_count(&document_bytes(&[headers_only]).unwrap()), 1);
    }

    #[test]
    fn clipping_and_encoding() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("abcdefghijkl", 6), "abcd..");
        assert_eq!(clip("a\nb", 10), "a b");
        assert_eq!(win_ansi("café €"), vec![b'c', b'a', b'f', 0xE9, b' ', b'?']);
    }
}
