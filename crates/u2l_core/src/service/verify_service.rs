//! Consistency verification over the expanded fact set.
//!
//! # Responsibility
//! - Find forward markup that contains TeX control characters but has no
//!   reverse mapping.
//!
//! # Invariants
//! - Every violation is collected before reporting; verification never stops
//!   at the first one.
//! - Markup containing a plain space is exempt.

use crate::repo::fact_repo::{FactRepository, RepoError};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const CONTROL_CHARS: [char; 5] = ['\\', '{', '}', '^', '_'];

/// Forward markups that lack a `tex→unicode` fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyError {
    pub missing: Vec<String>,
}

impl Display for ConsistencyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (position, markup) in self.missing.iter().enumerate() {
            if position > 0 {
                writeln!(f)?;
            }
            write!(
                f,
                "Missing tex2ucode mapping for {}",
                serde_json::Value::String(markup.clone())
            )?;
        }
        Ok(())
    }
}

impl Error for ConsistencyError {}

#[derive(Debug)]
pub enum VerifyError {
    Consistency(ConsistencyError),
    Repo(RepoError),
}

impl Display for VerifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Consistency(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for VerifyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Consistency(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for VerifyError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<ConsistencyError> for VerifyError {
    fn from(value: ConsistencyError) -> Self {
        Self::Consistency(value)
    }
}

/// Returns whether forward `markup` must have a reverse mapping.
pub fn needs_reverse_mapping(markup: &str) -> bool {
    !markup.contains(' ') && markup.contains(&CONTROL_CHARS[..])
}

/// Verifier facade over the fact store.
pub struct VerifyService<R: FactRepository> {
    repo: R,
}

impl<R: FactRepository> VerifyService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Checks that every control-character markup can be read back.
    ///
    /// # Errors
    /// - [`VerifyError::Consistency`] listing every offending markup.
    pub fn verify(&self) -> Result<(), VerifyError> {
        let started_at = Instant::now();
        info!("event=verify module=verify status=start");

        let missing: Vec<String> = self
            .repo
            .unmatched_markup()?
            .into_iter()
            .filter(|markup| needs_reverse_mapping(markup))
            .collect();

        if !missing.is_empty() {
            error!(
                "event=verify module=verify status=error duration_ms={} error_code=missing_reverse_mapping missing={}",
                started_at.elapsed().as_millis(),
                missing.len()
            );
            return Err(ConsistencyError { missing }.into());
        }

        info!(
            "event=verify module=verify status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(())
    }
}
