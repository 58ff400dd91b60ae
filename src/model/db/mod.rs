//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs are serialised in MongoDB's own format.

pub mod admin;
pub mod candidate;
pub mod position;
pub mod vote;
pub mod voter;
