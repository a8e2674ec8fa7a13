//! Fact store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist atomic facts in the `ucode2tex` / `tex2ucode` staging tables.
//! - Provide the correlation queries used by verification and compaction.
//! - Track which declaration kind claimed each fact.
//!
//! # Invariants
//! - At most one markup per `(codepoint, mode)` and one code point per
//!   reverse markup; duplicates are rejected with [`RepoError::DuplicateFact`].
//! - A fact is claimed at most once; a second claim is
//!   [`RepoError::AlreadyClaimed`].
//! - Every listing is ordered, so callers see the same sequence on every run.

use crate::db::DbError;
use crate::model::declaration::Relation;
use crate::model::fact::{Direction, Fact, Metadata, Mode};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for fact persistence and correlation queries.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// A fact collides with the primary key of an existing one.
    DuplicateFact { fact: Fact, existing: String },
    AlreadyClaimed(FactId),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::DuplicateFact { fact, existing } => match fact.direction {
                Direction::UnicodeTo(mode) => write!(
                    f,
                    "duplicate {mode} mapping for {}: {} conflicts with existing {}",
                    json_string(&fact.codepoint),
                    json_string(&fact.markup),
                    json_string(existing)
                ),
                Direction::TexToUnicode => write!(
                    f,
                    "duplicate tex-to-unicode mapping for {}: {} conflicts with existing {}",
                    json_string(&fact.markup),
                    json_string(&fact.codepoint),
                    json_string(existing)
                ),
            },
            Self::AlreadyClaimed(id) => write!(f, "fact {id} was already claimed"),
            Self::InvalidData(message) => write!(f, "invalid stored fact: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Row identity of a stored fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FactId {
    /// Row of `ucode2tex`.
    Forward(i64),
    /// Row of `tex2ucode`.
    Reverse(i64),
}

impl Display for FactId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forward(rowid) => write!(f, "ucode2tex#{rowid}"),
            Self::Reverse(rowid) => write!(f, "tex2ucode#{rowid}"),
        }
    }
}

/// Fact plus its store bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFact {
    pub id: FactId,
    pub fact: Fact,
    /// Declaration kind that claimed this fact, if any.
    pub exported: Option<Relation>,
}

/// Which staging table to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactTable {
    /// `unicode→text|math` facts.
    Forward,
    /// `tex→unicode` facts.
    Reverse,
}

/// Query options for listing facts.
///
/// Forward facts come ordered by `codepoint, mode, markup` (math before
/// text); reverse facts by `codepoint, markup`. With no table filter the
/// forward facts are listed first.
#[derive(Debug, Clone, Default)]
pub struct FactListQuery {
    pub table: Option<FactTable>,
    /// Only meaningful for forward facts.
    pub mode: Option<Mode>,
    pub unclaimed_only: bool,
}

/// Facts sharing codepoint, markup and metadata found by a compaction join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactMatch {
    pub ids: Vec<FactId>,
    pub codepoint: String,
    pub markup: String,
    /// Mode of the forward fact for single-mode matches.
    pub mode: Option<Mode>,
    pub metadata: Metadata,
}

/// Repository interface for the fact store.
pub trait FactRepository {
    /// Inserts one fact, rejecting primary-key collisions.
    fn insert_fact(&self, fact: &Fact) -> RepoResult<FactId>;
    /// Total number of stored facts.
    fn count_facts(&self) -> RepoResult<usize>;
    fn list_facts(&self, query: &FactListQuery) -> RepoResult<Vec<StoredFact>>;
    /// Distinct forward markups with no reverse fact for the same markup,
    /// ignoring a trailing `{}` on either side.
    fn unmatched_markup(&self) -> RepoResult<Vec<String>>;
    /// Unclaimed (reverse, text, math) triples with equal content.
    fn is_tex_matches(&self) -> RepoResult<Vec<FactMatch>>;
    /// Unclaimed (forward, reverse) pairs with equal content.
    fn is_mode_matches(&self) -> RepoResult<Vec<FactMatch>>;
    /// Unclaimed (text, math) pairs with equal content.
    fn to_tex_matches(&self) -> RepoResult<Vec<FactMatch>>;
    /// Marks facts as exported by a declaration of `kind`.
    fn claim(&self, ids: &[FactId], kind: Relation) -> RepoResult<()>;
}

/// SQLite-backed fact repository.
#[derive(Clone, Copy)]
pub struct SqliteFactRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteFactRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl FactRepository for SqliteFactRepository<'_> {
    fn insert_fact(&self, fact: &Fact) -> RepoResult<FactId> {
        let metadata = fact
            .metadata
            .to_canonical_json()
            .map_err(|err| RepoError::InvalidData(format!("unencodable metadata: {err}")))?;
        match fact.direction {
            Direction::UnicodeTo(mode) => {
                let existing: Option<String> = self
                    .conn
                    .query_row(
                        "SELECT tex FROM ucode2tex WHERE ucode = ?1 AND mode = ?2;",
                        params![fact.codepoint, mode.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(existing) = existing {
                    return Err(RepoError::DuplicateFact {
                        fact: fact.clone(),
                        existing,
                    });
                }

                self.conn.execute(
                    "INSERT INTO ucode2tex (ucode, tex, mode, metadata) VALUES (?1, ?2, ?3, ?4);",
                    params![fact.codepoint, fact.markup, mode.as_str(), metadata],
                )?;
                Ok(FactId::Forward(self.conn.last_insert_rowid()))
            }
            Direction::TexToUnicode => {
                let existing: Option<String> = self
                    .conn
                    .query_row(
                        "SELECT ucode FROM tex2ucode WHERE tex = ?1;",
                        [fact.markup.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(existing) = existing {
                    return Err(RepoError::DuplicateFact {
                        fact: fact.clone(),
                        existing,
                    });
                }

                self.conn.execute(
                    "INSERT INTO tex2ucode (tex, ucode, metadata) VALUES (?1, ?2, ?3);",
                    params![fact.markup, fact.codepoint, metadata],
                )?;
                Ok(FactId::Reverse(self.conn.last_insert_rowid()))
            }
        }
    }

    fn count_facts(&self) -> RepoResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT (SELECT COUNT(*) FROM ucode2tex) + (SELECT COUNT(*) FROM tex2ucode);",
            [],
            |row| row.get(0),
        )?;
        usize::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative fact count {count}")))
    }

    fn list_facts(&self, query: &FactListQuery) -> RepoResult<Vec<StoredFact>> {
        let mut facts = Vec::new();

        if query.table != Some(FactTable::Reverse) {
            let mut sql = String::from(
                "SELECT rowid AS fact_id, ucode, tex, mode, metadata, exported FROM ucode2tex WHERE 1 = 1",
            );
            let mut bind_values: Vec<Value> = Vec::new();
            if let Some(mode) = query.mode {
                sql.push_str(" AND mode = ?");
                bind_values.push(Value::Text(mode.as_str().to_string()));
            }
            if query.unclaimed_only {
                sql.push_str(" AND exported IS NULL");
            }
            sql.push_str(" ORDER BY ucode ASC, mode ASC, tex ASC");

            let mut stmt = self.conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(bind_values))?;
            while let Some(row) = rows.next()? {
                facts.push(parse_forward_row(row)?);
            }
        }

        if query.table != Some(FactTable::Forward) {
            let mut sql = String::from(
                "SELECT rowid AS fact_id, ucode, tex, metadata, exported FROM tex2ucode WHERE 1 = 1",
            );
            if query.unclaimed_only {
                sql.push_str(" AND exported IS NULL");
            }
            sql.push_str(" ORDER BY ucode ASC, tex ASC");

            let mut stmt = self.conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                facts.push(parse_reverse_row(row)?);
            }
        }

        Ok(facts)
    }

    fn unmatched_markup(&self) -> RepoResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT u.tex
             FROM ucode2tex u
             WHERE NOT EXISTS (
                SELECT 1
                FROM tex2ucode t
                WHERE t.tex = u.tex
                   OR t.tex = u.tex || '{}'
                   OR u.tex = t.tex || '{}'
             )
             ORDER BY u.tex ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut markups = Vec::new();
        while let Some(row) = rows.next()? {
            markups.push(row.get(0)?);
        }
        Ok(markups)
    }

    fn is_tex_matches(&self) -> RepoResult<Vec<FactMatch>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.rowid, text.rowid, math.rowid, r.ucode, r.tex, r.metadata
             FROM tex2ucode r
             INNER JOIN ucode2tex text
                ON text.mode = 'text'
               AND text.ucode = r.ucode
               AND text.tex = r.tex
               AND text.metadata = r.metadata
             INNER JOIN ucode2tex math
                ON math.mode = 'math'
               AND math.ucode = r.ucode
               AND math.tex = r.tex
               AND math.metadata = r.metadata
             WHERE r.exported IS NULL
               AND text.exported IS NULL
               AND math.exported IS NULL
             ORDER BY r.ucode ASC, r.tex ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut matches = Vec::new();
        while let Some(row) = rows.next()? {
            matches.push(FactMatch {
                ids: vec![
                    FactId::Reverse(row.get(0)?),
                    FactId::Forward(row.get(1)?),
                    FactId::Forward(row.get(2)?),
                ],
                codepoint: row.get(3)?,
                markup: row.get(4)?,
                mode: None,
                metadata: parse_metadata(&row.get::<_, String>(5)?)?,
            });
        }
        Ok(matches)
    }

    fn is_mode_matches(&self) -> RepoResult<Vec<FactMatch>> {
        let mut stmt = self.conn.prepare(
            "SELECT u.rowid, r.rowid, u.ucode, u.tex, u.mode, u.metadata
             FROM ucode2tex u
             INNER JOIN tex2ucode r
                ON r.ucode = u.ucode
               AND r.tex = u.tex
               AND r.metadata = u.metadata
             WHERE u.exported IS NULL
               AND r.exported IS NULL
             ORDER BY u.ucode ASC, u.mode DESC, u.tex ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut matches = Vec::new();
        while let Some(row) = rows.next()? {
            matches.push(FactMatch {
                ids: vec![FactId::Forward(row.get(0)?), FactId::Reverse(row.get(1)?)],
                codepoint: row.get(2)?,
                markup: row.get(3)?,
                mode: Some(parse_mode(&row.get::<_, String>(4)?)?),
                metadata: parse_metadata(&row.get::<_, String>(5)?)?,
            });
        }
        Ok(matches)
    }

    fn to_tex_matches(&self) -> RepoResult<Vec<FactMatch>> {
        let mut stmt = self.conn.prepare(
            "SELECT text.rowid, math.rowid, text.ucode, text.tex, text.metadata
             FROM ucode2tex text
             INNER JOIN ucode2tex math
                ON math.mode = 'math'
               AND math.ucode = text.ucode
               AND math.tex = text.tex
               AND math.metadata = text.metadata
             WHERE text.mode = 'text'
               AND text.exported IS NULL
               AND math.exported IS NULL
             ORDER BY text.ucode ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut matches = Vec::new();
        while let Some(row) = rows.next()? {
            matches.push(FactMatch {
                ids: vec![FactId::Forward(row.get(0)?), FactId::Forward(row.get(1)?)],
                codepoint: row.get(2)?,
                markup: row.get(3)?,
                mode: None,
                metadata: parse_metadata(&row.get::<_, String>(4)?)?,
            });
        }
        Ok(matches)
    }

    fn claim(&self, ids: &[FactId], kind: Relation) -> RepoResult<()> {
        for id in ids {
            let changed = match *id {
                FactId::Forward(rowid) => self.conn.execute(
                    "UPDATE ucode2tex SET exported = ?1 WHERE rowid = ?2 AND exported IS NULL;",
                    params![kind.as_str(), rowid],
                )?,
                FactId::Reverse(rowid) => self.conn.execute(
                    "UPDATE tex2ucode SET exported = ?1 WHERE rowid = ?2 AND exported IS NULL;",
                    params![kind.as_str(), rowid],
                )?,
            };
            if changed == 0 {
                return Err(RepoError::AlreadyClaimed(*id));
            }
        }
        Ok(())
    }
}

fn parse_forward_row(row: &Row<'_>) -> RepoResult<StoredFact> {
    let mode = parse_mode(&row.get::<_, String>("mode")?)?;
    Ok(StoredFact {
        id: FactId::Forward(row.get("fact_id")?),
        fact: Fact::new(
            row.get::<_, String>("ucode")?,
            Direction::UnicodeTo(mode),
            row.get::<_, String>("tex")?,
            parse_metadata(&row.get::<_, String>("metadata")?)?,
        ),
        exported: parse_exported(row.get("exported")?)?,
    })
}

fn parse_reverse_row(row: &Row<'_>) -> RepoResult<StoredFact> {
    Ok(StoredFact {
        id: FactId::Reverse(row.get("fact_id")?),
        fact: Fact::new(
            row.get::<_, String>("ucode")?,
            Direction::TexToUnicode,
            row.get::<_, String>("tex")?,
            parse_metadata(&row.get::<_, String>("metadata")?)?,
        ),
        exported: parse_exported(row.get("exported")?)?,
    })
}

fn parse_mode(value: &str) -> RepoResult<Mode> {
    Mode::parse(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid mode `{value}` in ucode2tex.mode")))
}

fn parse_metadata(value: &str) -> RepoResult<Metadata> {
    Metadata::from_canonical_json(value)
        .map_err(|err| RepoError::InvalidData(format!("invalid metadata `{value}`: {err}")))
}

fn parse_exported(value: Option<String>) -> RepoResult<Option<Relation>> {
    match value {
        None => Ok(None),
        Some(kind) => Relation::parse(&kind)
            .map(Some)
            .ok_or_else(|| RepoError::InvalidData(format!("invalid exported kind `{kind}`"))),
    }
}

fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
