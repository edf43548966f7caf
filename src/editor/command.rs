//! A small line language for driving a [`crate::editor::GridEditor`] from a
//! terminal.
//!
//! Words are split with shell rules (`shlex`), so keys and values with
//! spaces are quoted: `rename "Unit Price" Price`. Positions are 1-based as
//! displayed by `show`; they are resolved to row ids only when the command
//! runs.

use crate::export::ExportFormat;
use std::path::PathBuf;
use thiserror::Error;

pub const HELP: &str = "\
Commands (positions are 1-based as shown by `show`):
  show                          print the current table
  tables                        list extracted tables
  use <n>                       switch to table n
  rename <column> <new name>    rename a column, keeping its values
  move-col <from> <to>          move a column
  move-row <from> <to>          move a row
  drag <item> [<item>]          drag col:<key> or row:<n> onto another item
                                (no target = drop outside, nothing moves)
  set <row> <column> <value>    edit one cell
  add-col                       append an auto-named column
  del-col <column>              delete a column (never the last one)
  add-row                       append an empty row
  del-row <row>                 delete a row
  export <path> [csv|xlsx|pdf|json]
  help                          show this text
  quit                          finish editing";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unbalanced quotes")]
    Unbalanced,

    #[error("unknown command '{0}' (try `help`)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("'{0}' is not a position (positions start at 1)")]
    BadPosition(String),

    #[error("'{0}' is not an item: use col:<key> or row:<n>")]
    BadItem(String),

    #[error("unknown export format '{0}'")]
    BadFormat(String),
}

/// A drag endpoint as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemRef {
    Column(String),
    /// 1-based display position.
    Row(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Show,
    Tables,
    Use(usize),
    Rename { column: String, to: String },
    MoveColumn { from: usize, to: usize },
    MoveRow { from: usize, to: usize },
    Drag { source: ItemRef, target: Option<ItemRef> },
    Set { row: usize, column: String, value: String },
    AddColumn,
    DeleteColumn(String),
    AddRow,
    DeleteRow(usize),
    Export { path: PathBuf, format: Option<ExportFormat> },
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines and `#` comments give `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }
        let words = shlex::split(trimmed).ok_or(CommandError::Unbalanced)?;
        let Some((head, args)) = words.split_first() else {
            return Ok(None);
        };

        let cmd = match (head.to_lowercase().as_str(), args) {
            ("show" | "ls", []) => Command::Show,
            ("tables", []) => Command::Tables,
            ("use", [n]) => Command::Use(position(n)?),
            ("use", _) => return Err(CommandError::Usage("use <n>")),

            ("rename", [column, to]) => Command::Rename {
                column: column.clone(),
                to: to.clone(),
            },
            ("rename", _) => return Err(CommandError::Usage("rename <column> <new name>")),

            ("move-col", [from, to]) => Command::MoveColumn {
                from: position(from)?,
                to: position(to)?,
            },
            ("move-col", _) => return Err(CommandError::Usage("move-col <from> <to>")),

            ("move-row", [from, to]) => Command::MoveRow {
                from: position(from)?,
                to: position(to)?,
            },
            ("move-row", _) => return Err(CommandError::Usage("move-row <from> <to>")),

            ("drag", [source]) => Command::Drag {
                source: item(source)?,
                target: None,
            },
            ("drag", [source, target]) => Command::Drag {
                source: item(source)?,
                target: Some(item(target)?),
            },
            ("drag", _) => return Err(CommandError::Usage("drag <item> [<item>]")),

            ("set", [row, column, value @ ..]) if !value.is_empty() => Command::Set {
                row: position(row)?,
                column: column.clone(),
                value: value.join(" "),
            },
            ("set", _) => return Err(CommandError::Usage("set <row> <column> <value>")),

            ("add-col", []) => Command::AddColumn,
            ("del-col", [column]) => Command::DeleteColumn(column.clone()),
            ("del-col", _) => return Err(CommandError::Usage("del-col <column>")),
            ("add-row", []) => Command::AddRow,
            ("del-row", [row]) => Command::DeleteRow(position(row)?),
            ("del-row", _) => return Err(CommandError::Usage("del-row <row>")),

            ("export", [path]) => Command::Export {
                path: PathBuf::from(path),
                format: None,
            },
            ("export", [path, format]) => Command::Export {
                path: PathBuf::from(path),
                format: Some(
                    format
                        .parse()
                        .map_err(|_| CommandError::BadFormat(format.clone()))?,
                ),
            },
            ("export", _) => return Err(CommandError::Usage("export <path> [format]")),

            ("help" | "?", _) => Command::Help,
            ("quit" | "exit" | "q", []) => Command::Quit,
            (other, _) => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(cmd))
    }
}

fn position(word: &str) -> Result<usize, CommandError> {
    match word.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(CommandError::BadPosition(word.to_string())),
    }
}

fn item(word: &str) -> Result<ItemRef, CommandError> {
    if let Some(key) = word.strip_prefix("col:") {
        Ok(ItemRef::Column(key.to_string()))
    } else if let Some(n) = word.strip_prefix("row:") {
        Ok(ItemRef::Row(position(n)?))
    } else {
        Err(CommandError::BadItem(word.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Command {
        Command::parse(line).unwrap().unwrap()
    }

    #[test]
    fn blank_and_comment_lines() {
        assert_eq!(Command::parse("   "), Ok(None));
        assert_eq!(Command::parse("# note"), Ok(None));
    }

    #[test]
    fn quoted_column_names() {
        assert_eq!(
            parse(r#"rename "Unit Price" Price"#),
            Command::Rename {
                column: "Unit Price".into(),
                to: "Price".into()
            }
        );
    }

    #[test]
    fn set_joins_trailing_words() {
        assert_eq!(
            parse("set 2 Name Bob Smith"),
            Command::Set {
                row: 2,
                column: "Name".into(),
                value: "Bob Smith".into()
            }
        );
        assert_eq!(
            parse(r#"set 1 Notes """#),
            Command::Set {
                row: 1,
                column: "Notes".into(),
                value: String::new()
            }
        );
    }

    #[test]
    fn drag_items() {
        assert_eq!(
            parse("drag col:Age row:1"),
            Command::Drag {
                source: ItemRef::Column("Age".into()),
                target: Some(ItemRef::Row(1))
            }
        );
        assert_eq!(
            parse("drag row:3"),
            Command::Drag {
                source: ItemRef::Row(3),
                target: None
            }
        );
        assert_eq!(
            Command::parse("drag Age Name"),
            Err(CommandError::BadItem("Age".into()))
        );
    }

    #[test]
    fn positions_are_one_based() {
        assert_eq!(
            Command::parse("del-row 0"),
            Err(CommandError::BadPosition("0".into()))
        );
        assert_eq!(parse("move-col 1 3"), Command::MoveColumn { from: 1, to: 3 });
    }

    #[test]
    fn export_with_format() {
        assert_eq!(
            parse("export out.bin xlsx"),
            Command::Export {
                path: PathBuf::from("out.bin"),
                format: Some(ExportFormat::Xlsx)
            }
        );
        assert_eq!(
            Command::parse("export out.x docx"),
            Err(CommandError::BadFormat("docx".into()))
        );
    }

    #[test]
    fn errors() {
        assert_eq!(
            Command::parse("frobnicate"),
            Err(CommandError::Unknown("frobnicate".into()))
        );
        assert_eq!(Command::parse("rename \"open"), Err(CommandError::Unbalanced));
        assert!(matches!(Command::parse("rename A"), Err(CommandError::Usage(_))));
    }
}
