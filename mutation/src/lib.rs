//! Graft mutation reconciler.
//!
//! Turns a desired-state document into a minimal, dependency-ordered set of
//! node and edge write operations, using a read-back of current state to
//! compute link/unlink diffs.
//!
//! The pipeline is a plain sequence of pure transforms around two I/O
//! boundaries (a read, then a write, both owned by the caller):
//!
//! ```text
//! enrich -> split_ids -> add_intermediaries
//!        -> [pre-query via the query compiler, when any non-create op exists]
//!        -> reconcile -> build -> [execute write] -> parse_response
//! ```

mod build;
mod enrich;
mod error;
mod intermediary;
mod op;
mod prequery;
mod reconcile;
mod response;
mod split;
mod tree;

pub use build::*;
pub use enrich::*;
pub use error::*;
pub use intermediary::*;
pub use op::*;
pub use prequery::*;
pub use reconcile::*;
pub use response::*;
pub use split::*;
pub use tree::*;
