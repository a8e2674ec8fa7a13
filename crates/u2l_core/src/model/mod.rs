//! Domain model for code point / markup mappings.
//!
//! # Responsibility
//! - Define atomic facts, high-level declarations and output table records.
//!
//! # Invariants
//! - Metadata is a closed record; unknown attributes never reach the store.
//! - Table records are built once per run and never mutated afterwards.

pub mod declaration;
pub mod fact;
pub mod table;
