//! Compaction of the fact store into canonical declarations.
//!
//! # Responsibility
//! - Re-derive the smallest declaration list that expands back to exactly
//!   the stored facts.
//! - Order the result so the written file is a pure function of the facts.
//!
//! # Invariants
//! - Passes run strictly in order: `unicode-is-tex`, `unicode-is-{mode}`,
//!   `unicode-to-tex`, `unicode-to-{mode}`, `tex-to-unicode`.
//! - Every fact is claimed by exactly one declaration; leftovers and double
//!   claims are both [`CompactionError`]s.
//! - Facts with different metadata never share a declaration.

use crate::model::declaration::{Declaration, Endpoint, Relation};
use crate::model::fact::{Direction, Fact, Metadata, Mode};
use crate::repo::fact_repo::{
    FactId, FactListQuery, FactMatch, FactRepository, FactTable, RepoError, RepoResult,
};
use log::{debug, error, info};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

#[derive(Debug)]
pub enum CompactionError {
    /// Facts no declaration absorbed.
    Unclaimed(Vec<Fact>),
    /// A pass tried to absorb a fact a previous declaration already owns.
    AlreadyClaimed(FactId),
    Repo(RepoError),
}

impl Display for CompactionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unclaimed(facts) => {
                write!(f, "{} facts not claimed by any declaration:", facts.len())?;
                for fact in facts {
                    write!(f, "\n  {fact}")?;
                }
                Ok(())
            }
            Self::AlreadyClaimed(id) => write!(f, "fact {id} claimed twice during compaction"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CompactionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for CompactionError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::AlreadyClaimed(id) => Self::AlreadyClaimed(id),
            other => Self::Repo(other),
        }
    }
}

/// Compactor facade over the fact store.
///
/// Compaction claims facts as it goes, so it runs once per loaded store.
pub struct CompactService<R: FactRepository> {
    repo: R,
}

impl<R: FactRepository> CompactService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Runs every pass and returns the ordered declaration list.
    ///
    /// # Errors
    /// - [`CompactionError::Unclaimed`] when a fact survives every pass.
    /// - [`CompactionError::AlreadyClaimed`] when a pass overlaps an earlier
    ///   claim.
    pub fn compact(&self) -> Result<Vec<Declaration>, CompactionError> {
        let started_at = Instant::now();
        info!("event=compact module=compact status=start");

        match self.run_passes() {
            Ok(declarations) => {
                info!(
                    "event=compact module=compact status=ok declarations={} duration_ms={}",
                    declarations.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(order_declarations(declarations))
            }
            Err(err) => {
                error!(
                    "event=compact module=compact status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn run_passes(&self) -> Result<Vec<Declaration>, CompactionError> {
        let mut declarations = Vec::new();

        let before = declarations.len();
        self.claim_matches(self.repo.is_tex_matches()?, &mut declarations, |_| {
            Relation::UnicodeIsTex
        })?;
        log_pass(Relation::UnicodeIsTex.as_str(), declarations.len() - before);

        let before = declarations.len();
        self.claim_matches(self.repo.is_mode_matches()?, &mut declarations, |found| {
            found.mode.map_or(Relation::UnicodeIsTex, Relation::unicode_is)
        })?;
        log_pass("unicode-is-mode", declarations.len() - before);

        let before = declarations.len();
        self.claim_matches(self.repo.to_tex_matches()?, &mut declarations, |_| {
            Relation::UnicodeToTex
        })?;
        log_pass(Relation::UnicodeToTex.as_str(), declarations.len() - before);

        let before = declarations.len();
        self.group_forward(&mut declarations)?;
        log_pass("unicode-to-mode", declarations.len() - before);

        let before = declarations.len();
        self.group_reverse(&mut declarations)?;
        log_pass(Relation::TexToUnicode.as_str(), declarations.len() - before);

        let leftovers = self.repo.list_facts(&FactListQuery {
            unclaimed_only: true,
            ..FactListQuery::default()
        })?;
        if !leftovers.is_empty() {
            return Err(CompactionError::Unclaimed(
                leftovers.into_iter().map(|stored| stored.fact).collect(),
            ));
        }

        Ok(declarations)
    }

    /// Claims each join match unless one of its facts was taken earlier in
    /// the same pass.
    fn claim_matches(
        &self,
        matches: Vec<FactMatch>,
        declarations: &mut Vec<Declaration>,
        relation_of: impl Fn(&FactMatch) -> Relation,
    ) -> RepoResult<()> {
        let mut taken: HashSet<FactId> = HashSet::new();
        for found in matches {
            if found.ids.iter().any(|id| taken.contains(id)) {
                continue;
            }
            let relation = relation_of(&found);
            self.repo.claim(&found.ids, relation)?;
            taken.extend(found.ids.iter().copied());
            declarations.push(Declaration::new(
                Endpoint::One(found.codepoint),
                relation,
                Endpoint::One(found.markup),
                found.metadata,
            ));
        }
        Ok(())
    }

    fn group_forward(&self, declarations: &mut Vec<Declaration>) -> RepoResult<()> {
        let remaining = self.repo.list_facts(&FactListQuery {
            table: Some(FactTable::Forward),
            unclaimed_only: true,
            ..FactListQuery::default()
        })?;

        let mut groups: BTreeMap<(String, Mode, Metadata), (Vec<String>, Vec<FactId>)> =
            BTreeMap::new();
        for stored in remaining {
            let Direction::UnicodeTo(mode) = stored.fact.direction else {
                continue;
            };
            let group = groups
                .entry((stored.fact.markup, mode, stored.fact.metadata))
                .or_default();
            group.0.push(stored.fact.codepoint);
            group.1.push(stored.id);
        }

        for ((markup, mode, metadata), (codepoints, ids)) in groups {
            let relation = Relation::unicode_to(mode);
            self.repo.claim(&ids, relation)?;
            declarations.push(Declaration::new(
                Endpoint::from_sorted(codepoints),
                relation,
                Endpoint::One(markup),
                metadata,
            ));
        }
        Ok(())
    }

    fn group_reverse(&self, declarations: &mut Vec<Declaration>) -> RepoResult<()> {
        let remaining = self.repo.list_facts(&FactListQuery {
            table: Some(FactTable::Reverse),
            unclaimed_only: true,
            ..FactListQuery::default()
        })?;

        let mut groups: BTreeMap<(String, Metadata), (Vec<String>, Vec<FactId>)> = BTreeMap::new();
        for stored in remaining {
            let group = groups
                .entry((stored.fact.codepoint, stored.fact.metadata))
                .or_default();
            group.0.push(stored.fact.markup);
            group.1.push(stored.id);
        }

        for ((codepoint, metadata), (markups, ids)) in groups {
            self.repo.claim(&ids, Relation::TexToUnicode)?;
            declarations.push(Declaration::new(
                Endpoint::from_sorted(markups),
                Relation::TexToUnicode,
                Endpoint::One(codepoint),
                metadata,
            ));
        }
        Ok(())
    }
}

fn log_pass(pass: &str, declarations: usize) {
    debug!("event=compact_pass module=compact status=ok pass={pass} declarations={declarations}");
}

/// Sort key: diacritic flag, code point, then per-group secondary keys,
/// with the full declaration content as the final tie-break.
type OrderKey = (bool, String, Reverse<String>, String, (Endpoint, Endpoint, Metadata));

fn order_key(declaration: &Declaration) -> OrderKey {
    let codepoint = declaration.codepoints().min_value().to_string();
    let row = (
        declaration.from.clone(),
        declaration.to.clone(),
        declaration.metadata.clone(),
    );
    let relation = declaration.relation.as_str().to_string();
    if declaration.metadata.combiningdiacritic {
        let markup = declaration.markups().min_value().to_string();
        (true, codepoint, Reverse(markup), relation, row)
    } else {
        (false, codepoint, Reverse(relation), String::new(), row)
    }
}

/// Orders declarations for output.
///
/// Plain declarations sort by code point ascending then relation kind
/// descending. Combining diacritic declarations follow, by code point
/// ascending, markup descending, relation kind ascending.
pub fn order_declarations(mut declarations: Vec<Declaration>) -> Vec<Declaration> {
    declarations.sort_by_cached_key(order_key);
    declarations
}

#[cfg(test)]
mod tests {
    use super::order_declarations;
    use crate::model::declaration::{Declaration, Endpoint, Relation};
    use crate::model::fact::Metadata;

    fn decl(from: &str, relation: Relation, to: &str, combining: bool) -> Declaration {
        Declaration::new(
            Endpoint::One(from.to_string()),
            relation,
            Endpoint::One(to.to_string()),
            Metadata {
                combiningdiacritic: combining,
                ..Metadata::default()
            },
        )
    }

    #[test]
    fn plain_declarations_sort_by_codepoint_then_relation_descending() {
        let ordered = order_declarations(vec![
            decl("b", Relation::UnicodeToText, "\\b", false),
            decl("\\a", Relation::TexToUnicode, "a", false),
            decl("a", Relation::UnicodeToMath, "\\alpha", false),
        ]);
        let relations: Vec<Relation> = ordered.iter().map(|d| d.relation).collect();
        assert_eq!(
            relations,
            vec![
                Relation::UnicodeToMath,
                Relation::TexToUnicode,
                Relation::UnicodeToText
            ]
        );
    }

    #[test]
    fn combining_declarations_come_last_with_markup_descending() {
        let ordered = order_declarations(vec![
            decl("\u{301}", Relation::UnicodeIsText, "\\'", true),
            decl("\\acute", Relation::TexToUnicode, "\u{301}", true),
            decl("z", Relation::UnicodeIsText, "z", false),
        ]);
        assert_eq!(ordered[0].relation, Relation::UnicodeIsText);
        assert_eq!(ordered[0].from, Endpoint::One("z".to_string()));
        assert_eq!(ordered[1].relation, Relation::TexToUnicode);
        assert_eq!(ordered[2].to, Endpoint::One("\\'".to_string()));
    }

    #[test]
    fn ties_do_not_depend_on_input_order() {
        let forward = order_declarations(vec![
            decl("\\alpha", Relation::TexToUnicode, "a", false),
            decl("\\a", Relation::TexToUnicode, "a", false),
        ]);
        let backward = order_declarations(vec![
            decl("\\a", Relation::TexToUnicode, "a", false),
            decl("\\alpha", Relation::TexToUnicode, "a", false),
        ]);
        assert_eq!(forward, backward);
        assert_eq!(forward[0].from, Endpoint::One("\\a".to_string()));
    }
}
