//! Core data models for the asset upload subsystem.
//!
//! These entities map to database rows via `sqlx::FromRow` and serialize
//! naturally as JSON via `serde`. The asset lifecycle is a closed state
//! machine, not a set of ad-hoc status strings.

pub mod asset;
