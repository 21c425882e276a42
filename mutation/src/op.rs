//! Operation kinds.
//!
//! Requested operations form a closed set; every consumer matches
//! exhaustively so a new operation cannot be silently ignored. The
//! reconciler narrows them into the node-write and edge-write domains.

use crate::MutationError;
use std::fmt;

/// A requested (or inferred) operation on a mutation node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Update,
    Delete,
    Link,
    Unlink,
    Replace,
    /// No change of its own; the node participates in an edge.
    Match,
}

impl Op {
    /// Parse an explicit `$op` value.
    pub fn parse(text: &str) -> Result<Self, MutationError> {
        match text {
            "create" => Ok(Op::Create),
            "update" => Ok(Op::Update),
            "delete" => Ok(Op::Delete),
            "link" => Ok(Op::Link),
            "unlink" => Ok(Op::Unlink),
            "replace" => Ok(Op::Replace),
            "match" => Ok(Op::Match),
            other => Err(MutationError::UnknownOp(other.to_string())),
        }
    }

    /// True for operations that need to observe current state before the
    /// write (everything except a pure create).
    pub fn needs_prequery(&self) -> bool {
        match self {
            Op::Update | Op::Link | Op::Unlink | Op::Replace | Op::Delete => true,
            Op::Create | Op::Match => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Create => "create",
            Op::Update => "update",
            Op::Delete => "delete",
            Op::Link => "link",
            Op::Unlink => "unlink",
            Op::Replace => "replace",
            Op::Match => "match",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final operation of a node write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOp {
    Create,
    Update,
    Delete,
    /// No data change; the instance is bound so edges can reference it.
    Match,
}

impl NodeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeOp::Create => "create",
            NodeOp::Update => "update",
            NodeOp::Delete => "delete",
            NodeOp::Match => "match",
        }
    }
}

/// Final operation of an edge write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOp {
    /// Insert a new relation instance with its role bindings.
    Create,
    /// Insert a role binding on an existing relation.
    Link,
    /// Delete a role binding.
    Unlink,
    /// Delete the relation instance.
    Delete,
    /// Bind an existing relation instance without changing it.
    Match,
}

impl EdgeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeOp::Create => "create",
            EdgeOp::Link => "link",
            EdgeOp::Unlink => "unlink",
            EdgeOp::Delete => "delete",
            EdgeOp::Match => "match",
        }
    }
}
