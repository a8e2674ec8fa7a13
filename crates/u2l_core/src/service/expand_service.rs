//! Relation expansion service.
//!
//! # Responsibility
//! - Turn high-level declarations into atomic directional facts.
//! - Load a whole declaration file into the fact store.
//!
//! # Invariants
//! - List endpoints expand to every `(from, to)` combination with the same
//!   metadata.
//! - `unicode-is-*` declarations always add the reverse fact with the same
//!   metadata as the forward facts.
//! - Markup is stored without a trailing empty-argument suffix.

use crate::model::declaration::{parse_declarations, ConfigError, Declaration, Relation};
use crate::model::fact::{strip_empty_argument, Direction, Fact, Metadata, Mode};
use crate::repo::fact_repo::{FactRepository, RepoError, RepoResult};
use log::{debug, error, info};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Error raised while loading a declaration file.
#[derive(Debug)]
pub enum ExpandError {
    Config(ConfigError),
    /// Store rejected a fact; carries the index of the declaration.
    Repo { index: usize, source: RepoError },
}

impl Display for ExpandError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Repo { index, source } => write!(f, "entry {index}: {source}"),
        }
    }
}

impl Error for ExpandError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Repo { source, .. } => Some(source),
        }
    }
}

impl From<ConfigError> for ExpandError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// Expands one declaration into atomic facts without touching the store.
pub fn expand_declaration(declaration: &Declaration) -> Vec<Fact> {
    let mut facts = Vec::new();
    for from in declaration.from.values() {
        for to in declaration.to.values() {
            push_facts(&mut facts, declaration.relation, from, to, &declaration.metadata);
        }
    }
    facts
}

fn push_facts(facts: &mut Vec<Fact>, relation: Relation, from: &str, to: &str, metadata: &Metadata) {
    let forward = |mode: Mode| {
        Fact::new(
            from,
            Direction::UnicodeTo(mode),
            strip_empty_argument(to),
            metadata.clone(),
        )
    };
    let reverse = |markup: &str, codepoint: &str| {
        Fact::new(
            codepoint,
            Direction::TexToUnicode,
            strip_empty_argument(markup),
            metadata.clone(),
        )
    };

    match relation {
        Relation::UnicodeToText => facts.push(forward(Mode::Text)),
        Relation::UnicodeToMath => facts.push(forward(Mode::Math)),
        Relation::UnicodeToTex => {
            facts.push(forward(Mode::Text));
            facts.push(forward(Mode::Math));
        }
        Relation::TexToUnicode => facts.push(reverse(from, to)),
        Relation::UnicodeIsText => {
            facts.push(forward(Mode::Text));
            facts.push(reverse(to, from));
        }
        Relation::UnicodeIsMath => {
            facts.push(forward(Mode::Math));
            facts.push(reverse(to, from));
        }
        Relation::UnicodeIsTex => {
            facts.push(forward(Mode::Text));
            facts.push(forward(Mode::Math));
            facts.push(reverse(to, from));
        }
    }
}

/// Use-case service that feeds declarations into the fact store.
pub struct ExpandService<R: FactRepository> {
    repo: R,
}

impl<R: FactRepository> ExpandService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Expands one declaration and stores its facts.
    ///
    /// Returns the number of facts inserted.
    pub fn expand(&self, declaration: &Declaration) -> RepoResult<usize> {
        let facts = expand_declaration(declaration);
        for fact in &facts {
            self.repo.insert_fact(fact)?;
        }
        Ok(facts.len())
    }

    /// Stores every declaration, stopping at the first rejected fact.
    ///
    /// Callers run this inside a transaction so a failure leaves no
    /// partial fact set behind.
    pub fn load(&self, declarations: &[Declaration]) -> Result<usize, ExpandError> {
        let started_at = Instant::now();
        info!(
            "event=expand module=expand status=start declarations={}",
            declarations.len()
        );

        let mut inserted = 0;
        for (index, declaration) in declarations.iter().enumerate() {
            match self.expand(declaration) {
                Ok(count) => inserted += count,
                Err(source) => {
                    error!(
                        "event=expand module=expand status=error index={} error_code=fact_rejected error={}",
                        index, source
                    );
                    return Err(ExpandError::Repo { index, source });
                }
            }
        }

        info!(
            "event=expand module=expand status=ok declarations={} facts={} duration_ms={}",
            declarations.len(),
            inserted,
            started_at.elapsed().as_millis()
        );
        Ok(inserted)
    }

    /// Parses a raw declaration file and stores it.
    ///
    /// Every entry is parsed before the first insert, so a shape error
    /// never leaves facts behind.
    pub fn load_json(&self, value: &Value) -> Result<usize, ExpandError> {
        let declarations = parse_declarations(value)?;
        debug!(
            "event=expand_parse module=expand status=ok declarations={}",
            declarations.len()
        );
        self.load(&declarations)
    }
}
