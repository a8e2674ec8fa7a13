//! End-to-end build run.
//!
//! # Responsibility
//! - Drive expansion, verification, table building and compaction over one
//!   fact store.
//! - Render every artifact in memory and write them atomically.
//!
//! # Invariants
//! - No artifact is written unless every stage succeeded.
//! - Each artifact is written to a temporary file in its target directory
//!   and renamed into place.
//! - A failed expansion or compaction leaves no partial state in the store.

use crate::db::{open_db_in_memory, open_fresh_db, DbError};
use crate::encode::{encode_declarations, encode_table};
use crate::model::declaration::{parse_declarations, ConfigError, Declaration};
use crate::model::table::Tables;
use crate::repo::fact_repo::{FactRepository, RepoError, SqliteFactRepository};
use crate::service::compact_service::{CompactService, CompactionError};
use crate::service::expand_service::{ExpandError, ExpandService};
use crate::service::table_service::TableService;
use crate::service::verify_service::{ConsistencyError, VerifyError, VerifyService};
use log::{error, info};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const LATEX_TABLE_FILE: &str = "latex.json";
pub const ASCII_TABLE_FILE: &str = "ascii.json";
pub const UNICODE_TABLE_FILE: &str = "unicode.json";
pub const DIACRITICS_TABLE_FILE: &str = "diacritics.json";
pub const BIBTEX_TABLE_FILE: &str = "bibtex.json";
pub const DEFAULT_TABLES_DIR: &str = "tables";

/// Error for one build run.
#[derive(Debug)]
pub enum BuildError {
    Config(ConfigError),
    Expand(ExpandError),
    Consistency(ConsistencyError),
    Compaction(CompactionError),
    Repo(RepoError),
    Db(DbError),
    Io { path: PathBuf, source: std::io::Error },
    Json(serde_json::Error),
}

impl Display for BuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Expand(err) => write!(f, "{err}"),
            Self::Consistency(err) => write!(f, "{err}"),
            Self::Compaction(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Json(err) => write!(f, "invalid JSON: {err}"),
        }
    }
}

impl Error for BuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Expand(err) => Some(err),
            Self::Consistency(err) => Some(err),
            Self::Compaction(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::Json(err) => Some(err),
        }
    }
}

impl From<ConfigError> for BuildError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<ExpandError> for BuildError {
    fn from(value: ExpandError) -> Self {
        match value {
            ExpandError::Config(err) => Self::Config(err),
            other => Self::Expand(other),
        }
    }
}

impl From<VerifyError> for BuildError {
    fn from(value: VerifyError) -> Self {
        match value {
            VerifyError::Consistency(err) => Self::Consistency(err),
            VerifyError::Repo(err) => Self::Repo(err),
        }
    }
}

impl From<CompactionError> for BuildError {
    fn from(value: CompactionError) -> Self {
        Self::Compaction(value)
    }
}

impl From<RepoError> for BuildError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<DbError> for BuildError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for BuildError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for BuildError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Inputs and destinations of one build run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Declaration file to read.
    pub config_path: PathBuf,
    /// Directory receiving the lookup tables.
    pub tables_dir: PathBuf,
    /// Compacted declaration destination; `None` rewrites `config_path`.
    pub compacted_path: Option<PathBuf>,
    /// Keep the staging store in this file instead of memory.
    pub db_path: Option<PathBuf>,
}

impl BuildOptions {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            tables_dir: PathBuf::from(DEFAULT_TABLES_DIR),
            compacted_path: None,
            db_path: None,
        }
    }

    pub fn compacted_target(&self) -> &Path {
        self.compacted_path.as_deref().unwrap_or(&self.config_path)
    }
}

/// In-memory result of the pipeline, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub compacted: Vec<Declaration>,
    pub tables: Tables,
    /// Number of atomic facts in the store.
    pub facts: usize,
}

/// Rendered file contents keyed by destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub contents: String,
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub declarations_in: usize,
    pub facts: usize,
    pub declarations_out: usize,
    pub written: Vec<PathBuf>,
}

/// Runs expansion, verification, table building and compaction over `conn`.
///
/// Expansion and compaction each run in their own transaction.
///
/// # Errors
/// - [`BuildError::Expand`] for a rejected fact.
/// - [`BuildError::Consistency`] for markup with no reverse mapping.
/// - [`BuildError::Compaction`] when the compacted form does not cover the
///   facts exactly once.
pub fn build_from_declarations(
    conn: &mut Connection,
    declarations: &[Declaration],
) -> Result<BuildOutput, BuildError> {
    let tx = conn.transaction()?;
    ExpandService::new(SqliteFactRepository::new(&tx)).load(declarations)?;
    tx.commit()?;

    let repo = SqliteFactRepository::new(conn);
    VerifyService::new(repo).verify()?;
    let tables = TableService::new(repo).build()?;
    let facts = repo.count_facts()?;

    let tx = conn.transaction()?;
    let compacted = CompactService::new(SqliteFactRepository::new(&tx)).compact()?;
    tx.commit()?;

    Ok(BuildOutput {
        compacted,
        tables,
        facts,
    })
}

/// Renders the compacted declaration file and every table.
pub fn render_artifacts(
    output: &BuildOutput,
    compacted_path: &Path,
    tables_dir: &Path,
) -> Result<Vec<Artifact>, BuildError> {
    let tables = &output.tables;
    let mut artifacts = vec![Artifact {
        path: compacted_path.to_path_buf(),
        contents: encode_declarations(&output.compacted)?,
    }];

    let rendered = [
        (LATEX_TABLE_FILE, encode_table(&tables.latex)?),
        (ASCII_TABLE_FILE, encode_table(&tables.ascii)?),
        (UNICODE_TABLE_FILE, encode_table(&tables.unicode)?),
        (DIACRITICS_TABLE_FILE, encode_table(&tables.diacritics)?),
        (BIBTEX_TABLE_FILE, encode_table(&tables.bibtex)?),
    ];
    artifacts.extend(rendered.into_iter().map(|(name, contents)| Artifact {
        path: tables_dir.join(name),
        contents,
    }));
    Ok(artifacts)
}

/// Replaces `path` with `contents` through a temporary sibling file.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), BuildError> {
    let io_error = |source: std::io::Error| BuildError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
    file.write_all(contents.as_bytes()).map_err(io_error)?;
    file.as_file().sync_all().map_err(io_error)?;
    file.persist(path).map_err(|err| io_error(err.error))?;
    Ok(())
}

/// Runs one full build: read, expand, verify, compact, build tables, write.
///
/// # Side effects
/// - Replaces the compacted declaration file and every table file.
/// - Replaces `db_path` when one is configured.
pub fn run_build(options: &BuildOptions) -> Result<BuildReport, BuildError> {
    let started_at = Instant::now();
    info!(
        "event=build module=build status=start config={}",
        options.config_path.display()
    );

    match run_build_inner(options) {
        Ok(report) => {
            info!(
                "event=build module=build status=ok declarations_in={} facts={} declarations_out={} artifacts={} duration_ms={}",
                report.declarations_in,
                report.facts,
                report.declarations_out,
                report.written.len(),
                started_at.elapsed().as_millis()
            );
            Ok(report)
        }
        Err(err) => {
            error!(
                "event=build module=build status=error duration_ms={} error_code={}",
                started_at.elapsed().as_millis(),
                error_code(&err)
            );
            Err(err)
        }
    }
}

fn run_build_inner(options: &BuildOptions) -> Result<BuildReport, BuildError> {
    let raw = std::fs::read_to_string(&options.config_path).map_err(|source| BuildError::Io {
        path: options.config_path.clone(),
        source,
    })?;
    let declarations = parse_declarations(&serde_json::from_str(&raw)?)?;

    let mut conn = match &options.db_path {
        Some(path) => open_fresh_db(path)?,
        None => open_db_in_memory()?,
    };
    let output = build_from_declarations(&mut conn, &declarations)?;
    let artifacts = render_artifacts(&output, options.compacted_target(), &options.tables_dir)?;

    std::fs::create_dir_all(&options.tables_dir).map_err(|source| BuildError::Io {
        path: options.tables_dir.clone(),
        source,
    })?;
    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        write_atomic(&artifact.path, &artifact.contents)?;
        info!(
            "event=artifact_write module=build status=ok path={} bytes={}",
            artifact.path.display(),
            artifact.contents.len()
        );
        written.push(artifact.path);
    }

    Ok(BuildReport {
        declarations_in: declarations.len(),
        facts: output.facts,
        declarations_out: output.compacted.len(),
        written,
    })
}

fn error_code(err: &BuildError) -> &'static str {
    match err {
        BuildError::Config(_) | BuildError::Json(_) => "invalid_config",
        BuildError::Expand(_) => "fact_rejected",
        BuildError::Consistency(_) => "missing_reverse_mapping",
        BuildError::Compaction(_) => "compaction_integrity",
        BuildError::Repo(_) | BuildError::Db(_) => "db_error",
        BuildError::Io { .. } => "io_error",
    }
}

#[cfg(test)]
mod tests {
    use super::{build_from_declarations, render_artifacts, write_atomic, BuildOptions};
    use crate::db::open_db_in_memory;
    use crate::model::declaration::parse_declarations;
    use serde_json::json;
    use std::path::Path;

    #[test]
    fn compacted_target_defaults_to_config() {
        let mut options = BuildOptions::new("config.json");
        assert_eq!(options.compacted_target(), Path::new("config.json"));
        options.compacted_path = Some("out.json".into());
        assert_eq!(options.compacted_target(), Path::new("out.json"));
    }

    #[test]
    fn render_produces_compacted_file_and_five_tables() {
        let declarations =
            parse_declarations(&json!([["é", "unicode-is-text", "\\'e"]])).unwrap();
        let mut conn = open_db_in_memory().unwrap();
        let output = build_from_declarations(&mut conn, &declarations).unwrap();
        assert_eq!(output.facts, 2);

        let artifacts = render_artifacts(&output, Path::new("c.json"), Path::new("t")).unwrap();
        assert_eq!(artifacts.len(), 6);
        assert_eq!(
            artifacts[0].contents,
            "[\n  [ \"\\u00e9\", \"unicode-is-text\", \"\\\\'e\" ]\n]\n"
        );
        assert_eq!(artifacts[1].path, Path::new("t").join("latex.json"));
    }

    #[test]
    fn write_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ascii.json");
        std::fs::write(&path, "old").unwrap();
        write_atomic(&path, "new\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
    }
}
