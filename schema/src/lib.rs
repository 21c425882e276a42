//! Graft schema definitions and enrichment.
//!
//! A raw schema declares entities and relations with data fields, link
//! fields, roles, and single inheritance. Enrichment turns that declaration
//! into a fully resolved bidirectional graph: inheritance-flattened field
//! lists, `played_by` on every role, and `opposite_players` on every link
//! field. Everything downstream (query compiler, mutation reconciler) reads
//! only the enriched form.

mod builder;
mod enrich;
mod error;
mod types;

pub use builder::*;
pub use enrich::*;
pub use error::*;
pub use types::*;
