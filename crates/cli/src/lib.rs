//! # recblock-cli
//!
//! Async driver around `recblock-core`: concurrent index builds, snapshot
//! reuse, and a background writer for candidate pairs.

/// Run orchestration: index preparation and pair streaming.
pub mod runner;
/// Group-commit writer task for candidate pairs.
pub mod writer;
