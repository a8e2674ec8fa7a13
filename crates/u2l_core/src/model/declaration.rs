//! High-level relation declarations.
//!
//! # Responsibility
//! - Parse raw declaration-file entries into typed declarations.
//! - Normalize metadata at construction time.
//! - Render compacted declarations back into declaration-file rows.
//!
//! # Invariants
//! - Parsing rejects unknown relation kinds and metadata keys before any
//!   fact is written.
//! - `Endpoint::Many` always holds at least one value.

use crate::model::fact::{Metadata, Mode};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Relation kind named by a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Relation {
    UnicodeToText,
    UnicodeToMath,
    UnicodeToTex,
    TexToUnicode,
    UnicodeIsText,
    UnicodeIsMath,
    UnicodeIsTex,
}

impl Relation {
    pub const ALL: [Relation; 7] = [
        Self::UnicodeToText,
        Self::UnicodeToMath,
        Self::UnicodeToTex,
        Self::TexToUnicode,
        Self::UnicodeIsText,
        Self::UnicodeIsMath,
        Self::UnicodeIsTex,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnicodeToText => "unicode-to-text",
            Self::UnicodeToMath => "unicode-to-math",
            Self::UnicodeToTex => "unicode-to-tex",
            Self::TexToUnicode => "tex-to-unicode",
            Self::UnicodeIsText => "unicode-is-text",
            Self::UnicodeIsMath => "unicode-is-math",
            Self::UnicodeIsTex => "unicode-is-tex",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|relation| relation.as_str() == value)
    }

    /// Single-mode forward relation for `mode`.
    pub fn unicode_to(mode: Mode) -> Self {
        match mode {
            Mode::Text => Self::UnicodeToText,
            Mode::Math => Self::UnicodeToMath,
        }
    }

    /// Single-mode bidirectional relation for `mode`.
    pub fn unicode_is(mode: Mode) -> Self {
        match mode {
            Mode::Text => Self::UnicodeIsText,
            Mode::Math => Self::UnicodeIsMath,
        }
    }

    /// Whether `from` holds code points (every kind except `tex-to-unicode`).
    pub fn is_unicode_first(self) -> bool {
        self != Self::TexToUnicode
    }
}

impl Display for Relation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a declaration: a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Endpoint {
    One(String),
    Many(Vec<String>),
}

impl Endpoint {
    /// Builds an endpoint from sorted values, collapsing a singleton.
    pub fn from_sorted(mut values: Vec<String>) -> Self {
        values.sort();
        values.dedup();
        if values.len() == 1 {
            Self::One(values.remove(0))
        } else {
            Self::Many(values)
        }
    }

    pub fn values(&self) -> &[String] {
        match self {
            Self::One(value) => std::slice::from_ref(value),
            Self::Many(values) => values.as_slice(),
        }
    }

    /// Smallest value by code point order.
    pub fn min_value(&self) -> &str {
        self.values()
            .iter()
            .min()
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::One(value) => Value::String(value.clone()),
            Self::Many(values) => {
                Value::Array(values.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

/// One declaration-file entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub from: Endpoint,
    pub relation: Relation,
    pub to: Endpoint,
    pub metadata: Metadata,
}

impl Declaration {
    pub fn new(from: Endpoint, relation: Relation, to: Endpoint, metadata: Metadata) -> Self {
        Self {
            from,
            relation,
            to,
            metadata,
        }
    }

    /// Parses entry `index` of a declaration file.
    ///
    /// # Errors
    /// - Returns [`ConfigError`] for any shape, relation or metadata defect.
    pub fn from_json(index: usize, value: &Value) -> Result<Self, ConfigError> {
        let items = value.as_array().ok_or(ConfigError::NotAnEntry { index })?;
        if items.len() != 3 && items.len() != 4 {
            return Err(ConfigError::WrongArity {
                index,
                len: items.len(),
            });
        }

        let relation_name = items[1]
            .as_str()
            .ok_or(ConfigError::InvalidField {
                index,
                field: "relation",
            })?;
        let relation = Relation::parse(relation_name).ok_or_else(|| {
            ConfigError::UnknownRelation {
                index,
                relation: relation_name.to_string(),
            }
        })?;

        let from = parse_endpoint(index, "from", &items[0])?;
        let to = parse_endpoint(index, "to", &items[2])?;
        let metadata = match items.get(3) {
            Some(raw) => parse_metadata(index, raw)?,
            None => Metadata::default(),
        };

        Ok(Self::new(from, relation, to, metadata))
    }

    /// Declaration-file row: `[from, relation, to]` plus metadata when present.
    pub fn to_json_row(&self) -> Result<Vec<Value>, serde_json::Error> {
        let mut row = vec![
            self.from.to_json(),
            Value::String(self.relation.as_str().to_string()),
            self.to.to_json(),
        ];
        if !self.metadata.is_empty() {
            row.push(serde_json::to_value(&self.metadata)?);
        }
        Ok(row)
    }

    /// Code point side of the declaration.
    pub fn codepoints(&self) -> &Endpoint {
        if self.relation.is_unicode_first() {
            &self.from
        } else {
            &self.to
        }
    }

    /// Markup side of the declaration.
    pub fn markups(&self) -> &Endpoint {
        if self.relation.is_unicode_first() {
            &self.to
        } else {
            &self.from
        }
    }
}

/// Parses a whole declaration file.
pub fn parse_declarations(value: &Value) -> Result<Vec<Declaration>, ConfigError> {
    let entries = value.as_array().ok_or(ConfigError::NotAList)?;
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| Declaration::from_json(index, entry))
        .collect()
}

fn parse_endpoint(index: usize, field: &'static str, value: &Value) -> Result<Endpoint, ConfigError> {
    let invalid = || ConfigError::InvalidField { index, field };
    match value {
        Value::String(text) if !text.is_empty() => Ok(Endpoint::One(text.clone())),
        Value::Array(items) if !items.is_empty() => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match item.as_str() {
                    Some(text) if !text.is_empty() => values.push(text.to_string()),
                    _ => return Err(invalid()),
                }
            }
            Ok(Endpoint::Many(values))
        }
        _ => Err(invalid()),
    }
}

/// Normalizes one raw metadata object.
///
/// Falsy values (`null`, `false`, `0`, `""`, `[]`, `{}`) are dropped. Any
/// other flag value turns the flag on; package values accept a
/// whitespace/comma separated string or a list of strings.
pub fn parse_metadata(index: usize, value: &Value) -> Result<Metadata, ConfigError> {
    let object: &Map<String, Value> = value
        .as_object()
        .ok_or(ConfigError::InvalidField {
            index,
            field: "metadata",
        })?;

    let mut metadata = Metadata::default();
    for (key, raw) in object {
        let known = matches!(
            key.as_str(),
            "textpackages" | "mathpackages" | "space" | "combiningdiacritic"
        );
        if !known {
            return Err(ConfigError::UnknownMetadataKey {
                index,
                key: key.clone(),
            });
        }
        if is_falsy(raw) {
            continue;
        }

        let invalid_value = || ConfigError::InvalidMetadataValue {
            index,
            key: key.clone(),
            value: raw.to_string(),
        };
        match key.as_str() {
            "textpackages" => {
                metadata.textpackages = parse_packages(raw).ok_or_else(invalid_value)?;
            }
            "mathpackages" => {
                metadata.mathpackages = parse_packages(raw).ok_or_else(invalid_value)?;
            }
            flag => {
                if flag == "space" {
                    metadata.space = true;
                } else {
                    metadata.combiningdiacritic = true;
                }
            }
        }
    }

    Ok(metadata)
}

fn is_falsy(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(entries) => entries.is_empty(),
    }
}

fn parse_packages(value: &Value) -> Option<Vec<String>> {
    let mut packages = BTreeSet::new();
    match value {
        Value::String(text) => {
            packages.extend(
                text.split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|name| !name.is_empty())
                    .map(str::to_string),
            );
        }
        Value::Array(items) => {
            for item in items {
                let name = item.as_str()?.trim();
                if !name.is_empty() {
                    packages.insert(name.to_string());
                }
            }
        }
        _ => return None,
    }
    Some(packages.into_iter().collect())
}

/// Declaration-file shape error (ConfigShapeError).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The file is not a JSON array.
    NotAList,
    NotAnEntry {
        index: usize,
    },
    WrongArity {
        index: usize,
        len: usize,
    },
    InvalidField {
        index: usize,
        field: &'static str,
    },
    UnknownRelation {
        index: usize,
        relation: String,
    },
    UnknownMetadataKey {
        index: usize,
        key: String,
    },
    InvalidMetadataValue {
        index: usize,
        key: String,
        value: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAList => write!(f, "declaration file must be a JSON array"),
            Self::NotAnEntry { index } => write!(f, "entry {index}: expected an array"),
            Self::WrongArity { index, len } => write!(
                f,
                "entry {index}: expected 3 or 4 elements, found {len}"
            ),
            Self::InvalidField { index, field } => {
                write!(f, "entry {index}: invalid `{field}` value")
            }
            Self::UnknownRelation { index, relation } => {
                write!(f, "entry {index}: unknown relation `{relation}`")
            }
            Self::UnknownMetadataKey { index, key } => {
                write!(f, "entry {index}: unexpected metadata `{key}`")
            }
            Self::InvalidMetadataValue { index, key, value } => {
                write!(f, "entry {index}: invalid value {value} for metadata `{key}`")
            }
        }
    }
}

impl Error for ConfigError {}
