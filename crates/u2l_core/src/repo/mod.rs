//! Repository layer for the fact store.
//!
//! # Responsibility
//! - Define the data access contract used by expansion, verification,
//!   compaction and table building.
//! - Isolate SQLite query details from the service layer.
//!
//! # Invariants
//! - Primary-key collisions surface as semantic errors, not raw SQLite
//!   constraint failures.

pub mod fact_repo;
