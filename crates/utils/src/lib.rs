//! Shared ambient-stack utilities for the control plane binaries.
//!
//! This crate provides:
//! - Logging configuration
//! - Observability helpers (per-loop health snapshots)
//! - Common helper functions

pub mod helpers;
pub mod logger;
pub mod observability;

pub use helpers::*;
pub use logger::*;
pub use observability::*;
