//! The enriched mutation tree.
//!
//! Enrichment turns the inbound document into this tree; every later stage
//! transforms it (split, intermediaries) or folds it (reconcile). Nodes
//! carry their handle from the moment they are built, and traversals pass
//! context down explicitly; nothing annotates a node in place.

use crate::Op;
use graft_core::{DataValue, NodeHandle, RequestPath};
use graft_query::IdSelector;
use graft_schema::ThingKind;
use indexmap::IndexMap;
use serde_json::Value as Json;

/// One instance-level operation on a thing.
#[derive(Debug, Clone)]
pub struct MutNode {
    /// Per-compile identity.
    pub handle: NodeHandle,
    /// Thing name.
    pub thing: String,
    /// Entity or relation.
    pub kind: ThingKind,
    /// Requested or inferred operation.
    pub op: Op,
    /// The caller named the operation explicitly.
    pub explicit_op: bool,
    /// Real id(s); arrays are expanded by the split stage.
    pub id: Option<IdSelector>,
    /// Caller-supplied identifier for a not-yet-created instance.
    pub temp_id: Option<String>,
    /// Raw `$filter`, resolved lazily by the pre-query and the builder.
    pub filter: Option<Json>,
    /// Data-field delta, keyed by field path.
    pub data: IndexMap<String, DataValue>,
    /// Nested operations, keyed by the link-field path or role name they
    /// were reached through.
    pub children: IndexMap<String, Vec<MutNode>>,
    /// Dot-path by which this node was reached in the request.
    pub path: RequestPath,
    /// Set on intermediary relation nodes synthesized between a parent and
    /// its link-field children.
    pub synth: Option<SynthVia>,
}

/// Role wiring of a synthesized intermediary relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthVia {
    /// Role the parent plays.
    pub plays: String,
    /// Role the nested child plays.
    pub reach: String,
}

impl MutNode {
    /// The single real id, once arrays have been split.
    pub fn single_id(&self) -> Option<&str> {
        match &self.id {
            Some(IdSelector::One(id)) => Some(id),
            _ => None,
        }
    }

    /// True when the node carries an identity (id, temp id, or filter).
    pub fn has_identity(&self) -> bool {
        self.id.is_some() || self.temp_id.is_some() || self.filter.is_some()
    }
}

/// A whole mutation request, enriched.
#[derive(Debug, Clone, Default)]
pub struct MutationTree {
    pub roots: Vec<MutNode>,
}

impl MutationTree {
    /// Visit every node, parents before children.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a MutNode)) {
        fn walk<'a>(node: &'a MutNode, f: &mut impl FnMut(&'a MutNode)) {
            f(node);
            for children in node.children.values() {
                for child in children {
                    walk(child, f);
                }
            }
        }
        for root in &self.roots {
            walk(root, f);
        }
    }

    /// True when any reachable node carries the given predicate.
    pub fn any(&self, mut pred: impl FnMut(&MutNode) -> bool) -> bool {
        let mut found = false;
        self.visit(&mut |node| {
            if pred(node) {
                found = true;
            }
        });
        found
    }

    /// True when any reachable operation must observe current state first.
    pub fn needs_prequery(&self) -> bool {
        self.any(|node| node.op.needs_prequery())
    }
}
