//! Graft session layer.
//!
//! [`GraftClient`] owns the enriched schema, the driver, and the
//! configuration, and runs the query and mutation pipelines around their
//! I/O boundaries. The pipelines themselves are pure; everything async in
//! this workspace happens here or in the driver.

mod client;
mod error;

pub use client::*;
pub use error::*;
