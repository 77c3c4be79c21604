//! Core types, payload flattening and incremental-load reconciliation
//!
//! This crate holds the pure parts of the weather load: decoding forecast
//! payloads, flattening them into one row schema, reconciling rows against
//! stored keys, and the pipeline that drives collaborators through a batch.

pub mod flatten;
pub mod payload;
pub mod pipeline;
pub mod reconcile;
pub mod types;
pub mod units;

pub use flatten::*;
pub use payload::*;
pub use pipeline::*;
pub use reconcile::*;
pub use types::*;
pub use units::*;
