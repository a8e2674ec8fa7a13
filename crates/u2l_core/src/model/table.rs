//! Output table records.
//!
//! Every record here is a read-only snapshot derived from the fact store.
//! Absent fields are skipped on serialization so written tables only carry
//! what a consumer needs.

use crate::model::fact::Mode;
use serde::Serialize;
use std::collections::BTreeMap;

/// Table keyed by code point or markup, written in key order.
pub type Table<T> = BTreeMap<String, T>;

/// Per-code-point record of the ASCII, Unicode and bibtex tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CharEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub math: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub textpackages: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mathpackages: Vec<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub space: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub combiningdiacritic: bool,
    /// A trailing `{}` or space is needed after `text`.
    #[serde(skip_serializing_if = "is_false")]
    pub commandspacer: bool,
}

impl CharEntry {
    pub fn markup(&self, mode: Mode) -> Option<&str> {
        match mode {
            Mode::Text => self.text.as_deref(),
            Mode::Math => self.math.as_deref(),
        }
    }
}

/// Value of the LaTeX-to-Unicode table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LatexTarget {
    Codepoint(String),
    Combining { combiningdiacritic: String },
}

/// Command applied for one combining code point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiacriticCommand {
    pub mode: Mode,
    pub command: String,
}

/// Combining diacritic lookup tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiacriticTable {
    /// Sorted, deduplicated command names.
    pub commands: Vec<String>,
    /// Code point (any character order) to command.
    pub tolatex: Table<DiacriticCommand>,
    /// Command name to code point.
    pub tounicode: Table<String>,
}

/// Every dictionary produced by one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tables {
    pub latex: Table<LatexTarget>,
    pub ascii: Table<CharEntry>,
    pub unicode: Table<CharEntry>,
    pub bibtex: Table<CharEntry>,
    pub diacritics: DiacriticTable,
}

fn is_false(value: &bool) -> bool {
    !*value
}
