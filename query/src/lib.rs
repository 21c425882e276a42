//! Graft query compiler.
//!
//! Lowers a BQL field-selection tree into one match/fetch statement per
//! selector and losslessly reconstructs the flat fetch response back into
//! the originally requested nested shape.
//!
//! The pipeline is a sequence of pure transforms around one I/O boundary
//! (owned by the caller):
//!
//! ```text
//! enrich -> build -> [execute via driver] -> parse -> post_hooks -> clean
//! ```

mod build;
mod clean;
mod enrich;
mod error;
mod fetch_key;
mod filter;
mod hooks;
mod parse;
mod request;

pub use build::*;
pub use clean::*;
pub use enrich::*;
pub use error::*;
pub use fetch_key::*;
pub use filter::*;
pub use hooks::*;
pub use parse::*;
pub use request::*;
