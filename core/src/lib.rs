//! Graft Core Types
//!
//! This crate provides the foundational types used throughout the graft
//! pipeline:
//! - Handle types for per-compile node/edge identity (NodeHandle, EdgeHandle)
//! - Value types (the DataValue enum for typed attribute values)
//! - Path types (RequestPath, ObjPath)
//! - The configuration surface (Config)

mod config;
mod id;
mod path;
mod value;

pub use config::*;
pub use id::*;
pub use path::*;
pub use value::*;
