//! Atomic fact model.
//!
//! # Responsibility
//! - Define the indivisible directional mapping stored in the fact store.
//! - Define the closed metadata record shared by facts and declarations.
//!
//! # Invariants
//! - `codepoint` and `markup` are never empty.
//! - Metadata package lists are sorted and deduplicated; an empty list and a
//!   `false` flag both mean "absent".
//! - Two metadata values are equal iff their canonical JSON forms are equal.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Rendering context for a code point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Text,
    Math,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Math => "math",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "math" => Some(Self::Math),
            _ => None,
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of one atomic fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    /// `unicode→text` or `unicode→math`.
    UnicodeTo(Mode),
    /// `tex→unicode`.
    TexToUnicode,
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnicodeTo(mode) => write!(f, "unicode-to-{mode}"),
            Self::TexToUnicode => f.write_str("tex-to-unicode"),
        }
    }
}

/// Optional attributes attached to a fact.
///
/// Field order is alphabetical so the serialized form doubles as the
/// canonical grouping key used by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    /// Markup composes with the following base character.
    #[serde(default, skip_serializing_if = "is_false")]
    pub combiningdiacritic: bool,
    /// Packages required by the math-mode rendering.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mathpackages: Vec<String>,
    /// Markup renders as inter-word space.
    #[serde(default, skip_serializing_if = "is_false")]
    pub space: bool,
    /// Packages required by the text-mode rendering.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub textpackages: Vec<String>,
}

impl Metadata {
    /// Returns whether every field is absent.
    pub fn is_empty(&self) -> bool {
        !self.combiningdiacritic
            && !self.space
            && self.mathpackages.is_empty()
            && self.textpackages.is_empty()
    }

    /// Canonical JSON text, used as the equality key in the fact store.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses the canonical JSON text written by [`Metadata::to_canonical_json`].
    pub fn from_canonical_json(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value)
    }

    /// Package list for one rendering mode.
    pub fn packages(&self, mode: Mode) -> &[String] {
        match mode {
            Mode::Text => &self.textpackages,
            Mode::Math => &self.mathpackages,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// One directional mapping between a code point and a markup string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fact {
    pub codepoint: String,
    pub direction: Direction,
    pub markup: String,
    pub metadata: Metadata,
}

impl Fact {
    pub fn new(
        codepoint: impl Into<String>,
        direction: Direction,
        markup: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            codepoint: codepoint.into(),
            direction,
            markup: markup.into(),
            metadata,
        }
    }
}

impl Display for Fact {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            serde_json::Value::String(self.codepoint.clone()),
            self.direction,
            serde_json::Value::String(self.markup.clone()),
            self.metadata
                .to_canonical_json()
                .map_err(|_| std::fmt::Error)?
        )
    }
}

/// Strips one trailing empty-argument suffix (`{}`) from markup.
///
/// Markup that would become empty is returned unchanged.
pub fn strip_empty_argument(markup: &str) -> &str {
    match markup.strip_suffix("{}") {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => markup,
    }
}
