//! Core logic for the unicode2latex table builder.
//! This crate is the single source of truth for mapping invariants.

pub mod db;
pub mod encode;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::declaration::{parse_declarations, ConfigError, Declaration, Endpoint, Relation};
pub use model::fact::{Direction, Fact, Metadata, Mode};
pub use model::table::{CharEntry, DiacriticTable, LatexTarget, Tables};
pub use repo::fact_repo::{
    FactId, FactListQuery, FactRepository, FactTable, RepoError, RepoResult, SqliteFactRepository,
    StoredFact,
};
pub use service::build_service::{
    build_from_declarations, run_build, BuildError, BuildOptions, BuildOutput, BuildReport,
};
pub use service::compact_service::{CompactService, CompactionError};
pub use service::expand_service::{ExpandError, ExpandService};
pub use service::table_service::TableService;
pub use service::verify_service::{ConsistencyError, VerifyError, VerifyService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
