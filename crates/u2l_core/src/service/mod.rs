//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate fact-store calls into the build stages: expansion,
//!   verification, compaction and table building.
//! - Keep the CLI decoupled from storage details.

pub mod build_service;
pub mod compact_service;
pub mod expand_service;
pub mod table_service;
pub mod verify_service;
