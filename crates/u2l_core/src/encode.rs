//! ASCII-only JSON writers for the declaration file and lookup tables.
//!
//! # Responsibility
//! - Render JSON with every character outside printable ASCII escaped as
//!   `\uXXXX` (surrogate pairs above the BMP).
//! - Lay out declaration files one entry per line and tables one key per
//!   line, so diffs between runs stay readable.
//!
//! # Invariants
//! - Output depends only on the value: object keys are written in sorted
//!   order and separators are fixed (`, ` and `: `).
//! - Every rendered document ends with a newline.

use crate::model::declaration::Declaration;
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Serializer, Value};
use std::io;

const INDENT: &str = "  ";

/// Compact formatter with `, `/`: ` separators that escapes every
/// character outside printable ASCII.
///
/// Quotes, backslashes and C0 controls reach `write_char_escape`, whose
/// default output already matches; only DEL and non-ASCII text is left
/// for `write_string_fragment`.
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (position, ch) in fragment.char_indices() {
            if (' '..='~').contains(&ch) {
                continue;
            }
            writer.write_all(fragment[start..position].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = position + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }

    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Renders one value on a single line with sorted object keys.
///
/// The value goes through [`serde_json::to_value`] first so struct fields
/// come out in key order like map entries.
pub fn encode_value<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    let mut serializer = Serializer::with_formatter(Vec::new(), AsciiFormatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(serializer.into_inner()).map_err(serde::ser::Error::custom)
}

/// Renders one declaration row as `[ from, relation, to(, metadata) ]`.
pub fn encode_declaration_row(declaration: &Declaration) -> Result<String, serde_json::Error> {
    let elements = declaration
        .to_json_row()?
        .iter()
        .map(encode_value)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("[ {} ]", elements.join(", ")))
}

/// Renders a declaration file, one declaration per line.
pub fn encode_declarations(declarations: &[Declaration]) -> Result<String, serde_json::Error> {
    let rows = declarations
        .iter()
        .map(|declaration| Ok(format!("{INDENT}{}", encode_declaration_row(declaration)?)))
        .collect::<Result<Vec<_>, serde_json::Error>>()?;
    Ok(format!("[\n{}\n]\n", rows.join(",\n")))
}

/// Renders a serializable table with one top-level key per line.
///
/// # Errors
/// - Returns the serializer error when the table does not serialize to a
///   JSON object.
pub fn encode_table<T: Serialize>(table: &T) -> Result<String, serde_json::Error> {
    let Value::Object(map) = serde_json::to_value(table)? else {
        return Err(serde::ser::Error::custom("table must serialize to a JSON object"));
    };
    let members = map
        .iter()
        .map(|(key, value)| Ok(format!("{INDENT}{}: {}", encode_value(key)?, encode_value(value)?)))
        .collect::<Result<Vec<_>, serde_json::Error>>()?;
    Ok(format!("{{\n{}\n}}\n", members.join(",\n")))
}

#[cfg(test)]
mod tests {
    use super::{encode_declarations, encode_table, encode_value};
    use crate::model::declaration::{Declaration, Endpoint, Relation};
    use crate::model::fact::Metadata;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn escapes_everything_outside_printable_ascii() {
        assert_eq!(encode_value("é").unwrap(), "\"\\u00e9\"");
        assert_eq!(encode_value("\u{7f}").unwrap(), "\"\\u007f\"");
        assert_eq!(encode_value("\\'e").unwrap(), "\"\\\\'e\"");
        assert_eq!(encode_value("𝔸").unwrap(), "\"\\ud835\\udd38\"");
        assert_eq!(encode_value("\u{01}").unwrap(), "\"\\u0001\"");
        assert_eq!(
            encode_value("a\"b\n\u{2009}c\u{7f}").unwrap(),
            "\"a\\\"b\\n\\u2009c\\u007f\""
        );
    }

    #[test]
    fn nested_values_use_python_separators() {
        assert_eq!(
            encode_value(&json!({"space": true, "mathpackages": ["amssymb"]})).unwrap(),
            "{\"mathpackages\": [\"amssymb\"], \"space\": true}"
        );
    }

    #[test]
    fn declaration_file_has_one_entry_per_line() {
        let declarations = vec![
            Declaration::new(
                Endpoint::One("é".to_string()),
                Relation::UnicodeIsText,
                Endpoint::One("\\'e".to_string()),
                Metadata::default(),
            ),
            Declaration::new(
                Endpoint::Many(vec!["µ".to_string(), "μ".to_string()]),
                Relation::UnicodeToMath,
                Endpoint::One("\\mu".to_string()),
                Metadata {
                    space: true,
                    ..Metadata::default()
                },
            ),
        ];
        assert_eq!(
            encode_declarations(&declarations).unwrap(),
            concat!(
                "[\n",
                "  [ \"\\u00e9\", \"unicode-is-text\", \"\\\\'e\" ],\n",
                "  [ [\"\\u00b5\", \"\\u03bc\"], \"unicode-to-math\", \"\\\\mu\", {\"space\": true} ]\n",
                "]\n"
            )
        );
    }

    #[test]
    fn tables_write_one_sorted_key_per_line() {
        let mut table = BTreeMap::new();
        table.insert("b".to_string(), json!({"text": "\\b"}));
        table.insert("a".to_string(), json!("x"));
        assert_eq!(
            encode_table(&table).unwrap(),
            "{\n  \"a\": \"x\",\n  \"b\": {\"text\": \"\\\\b\"}\n}\n"
        );
    }
}
