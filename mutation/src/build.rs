//! Write-statement building.
//!
//! Groups the reconciled node and edge writes into four statement bodies
//! (`deletion_matches`, `deletions`, `insertion_matches`, `insertions`) and
//! renders them into at most one delete statement and one insert statement,
//! each preceded by its own match clause. The delete statement runs first
//! inside the write transaction, so an implicit unlink never observes a
//! link inserted by the same mutation.

use crate::{EdgeAnchor, EdgeOp, EdgeWrite, NodeOp, NodeWrite, ReconcilePlan};
use graft_core::{DataValue, NodeHandle};
use indexmap::IndexMap;
use std::collections::BTreeSet;

/// The four statement bodies of one mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationStatements {
    pub deletion_matches: Vec<String>,
    pub deletions: Vec<String>,
    pub insertion_matches: Vec<String>,
    pub insertions: Vec<String>,
}

impl MutationStatements {
    /// The `match ...; delete ...` statement, when anything deletes.
    pub fn delete_statement(&self) -> Option<String> {
        render_statement(&self.deletion_matches, "delete", &self.deletions)
    }

    /// The `match ...; insert ...` statement, when anything inserts.
    pub fn insert_statement(&self) -> Option<String> {
        render_statement(&self.insertion_matches, "insert", &self.insertions)
    }

    /// True when the plan produced no write at all.
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty() && self.insertions.is_empty()
    }
}

fn render_statement(matches: &[String], verb: &str, body: &[String]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let mut lines = Vec::with_capacity(matches.len() + body.len() + 2);
    if !matches.is_empty() {
        lines.push("match".to_string());
        lines.extend(matches.iter().cloned());
    }
    lines.push(verb.to_string());
    lines.extend(body.iter().cloned());
    Some(lines.join("\n"))
}

/// Build the statement bodies for a reconciled plan.
pub fn build_mutation(plan: &ReconcilePlan) -> MutationStatements {
    let mut out = MutationStatements::default();

    // Role players must be bound on the side of the statement that uses
    // them, except instances created by this same mutation: the insert
    // statement binds those itself.
    let mut delete_refs: BTreeSet<NodeHandle> = BTreeSet::new();
    let mut insert_refs: BTreeSet<NodeHandle> = BTreeSet::new();
    for edge in &plan.edges {
        let players = edge.roles.values().flatten().copied();
        match edge.op {
            EdgeOp::Unlink | EdgeOp::Delete => delete_refs.extend(players),
            EdgeOp::Create | EdgeOp::Link | EdgeOp::Match => insert_refs.extend(players),
        }
    }

    for node in &plan.nodes {
        let updates = node.op == NodeOp::Update && !node.data.is_empty();
        let needs_delete_match =
            node.op == NodeOp::Delete || updates || delete_refs.contains(&node.handle);
        let needs_insert_match = node.op != NodeOp::Create
            && (updates || insert_refs.contains(&node.handle));
        if needs_delete_match && node.op != NodeOp::Create {
            out.deletion_matches.push(match_node_line(node));
        }
        if needs_insert_match {
            out.insertion_matches.push(match_node_line(node));
        }

        match node.op {
            NodeOp::Create => out.insertions.push(insert_node_line(node)),
            NodeOp::Update => {
                let var = node.handle.var();
                for (storage, value) in &node.data {
                    // Rebind the old attribute value so it can be removed,
                    // then insert the new one.
                    let old = attr_var(&var, storage);
                    out.deletion_matches
                        .push(format!("${var} has {storage} {old};"));
                    out.deletions.push(format!("${var} has {storage} {old};"));
                    push_attr_inserts(&mut out.insertions, &var, storage, value);
                }
            }
            NodeOp::Delete => {
                out.deletions
                    .push(format!("${} isa {};", node.handle.var(), node.thing));
            }
            NodeOp::Match => {}
        }
    }

    for edge in &plan.edges {
        let var = edge.handle.var();
        match edge.op {
            EdgeOp::Create => out.insertions.push(insert_edge_line(edge)),
            EdgeOp::Link => {
                out.insertion_matches.push(anchor_line(edge, false));
                out.insertions
                    .push(format!("${var} {};", roles_pattern(&edge.roles)));
            }
            EdgeOp::Unlink => {
                out.deletion_matches.push(anchor_line(edge, true));
                out.deletions
                    .push(format!("${var} {};", roles_pattern(&edge.roles)));
            }
            EdgeOp::Delete => {
                out.deletion_matches.push(anchor_line(edge, true));
                out.deletions
                    .push(format!("${var} isa {};", edge.relation));
            }
            EdgeOp::Match => out.insertion_matches.push(anchor_line(edge, true)),
        }
    }

    out
}

/// Bind one instance by its id attribute.
fn match_node_line(node: &NodeWrite) -> String {
    let var = node.handle.var();
    match (&node.id, &node.id_storage) {
        (Some(id), Some(storage)) => format!(
            "${var} isa {}, has {storage} {};",
            node.thing,
            DataValue::String(id.clone()).to_literal()
        ),
        _ => format!("${var} isa {};", node.thing),
    }
}

fn insert_node_line(node: &NodeWrite) -> String {
    let mut line = format!("${} isa {}", node.handle.var(), node.thing);
    for (storage, value) in &node.data {
        push_has(&mut line, storage, value);
    }
    line.push(';');
    line
}

fn insert_edge_line(edge: &EdgeWrite) -> String {
    let mut line = format!(
        "${} {} isa {}",
        edge.handle.var(),
        roles_pattern(&edge.roles),
        edge.relation
    );
    for (storage, value) in &edge.data {
        push_has(&mut line, storage, value);
    }
    line.push(';');
    line
}

/// The relation anchor: by id, by its role bindings, or bare.
fn anchor_line(edge: &EdgeWrite, with_roles: bool) -> String {
    let var = edge.handle.var();
    let head = if with_roles && !edge.roles.is_empty() {
        format!("${var} {} isa {}", roles_pattern(&edge.roles), edge.relation)
    } else {
        format!("${var} isa {}", edge.relation)
    };
    match &edge.anchor {
        EdgeAnchor::ById { id, id_storage } => format!(
            "{head}, has {id_storage} {};",
            DataValue::String(id.clone()).to_literal()
        ),
        EdgeAnchor::New | EdgeAnchor::ByRoles => format!("{head};"),
    }
}

/// `(role: $n0, role: $n1, other: $n2)` with one entry per player.
fn roles_pattern(roles: &IndexMap<String, Vec<NodeHandle>>) -> String {
    let mut parts = Vec::new();
    for (role, players) in roles {
        for player in players {
            parts.push(format!("{role}: ${}", player.var()));
        }
    }
    format!("({})", parts.join(", "))
}

fn push_has(line: &mut String, storage: &str, value: &DataValue) {
    match value {
        DataValue::Null => {}
        DataValue::List(items) => {
            for item in items {
                line.push_str(&format!(", has {storage} {}", item.to_literal()));
            }
        }
        scalar => line.push_str(&format!(", has {storage} {}", scalar.to_literal())),
    }
}

fn push_attr_inserts(insertions: &mut Vec<String>, var: &str, storage: &str, value: &DataValue) {
    match value {
        // Updating to null removes the attribute without a replacement.
        DataValue::Null => {}
        DataValue::List(items) => {
            for item in items {
                insertions.push(format!("${var} has {storage} {};", item.to_literal()));
            }
        }
        scalar => insertions.push(format!("${var} has {storage} {};", scalar.to_literal())),
    }
}

/// A statement variable for one attribute binding of one instance.
fn attr_var(var: &str, storage: &str) -> String {
    let slug: String = storage
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("${var}_{slug}")
}
