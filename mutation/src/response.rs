//! Write-response parsing.
//!
//! Matches the transaction output back to the expected node and edge writes
//! by their synthetic statement variables, substitutes real backend ids for
//! role players that referenced other nodes by handle, and reports `$error`
//! on any expected create/update/link the transaction did not confirm.
//! Deletions get no confirmation from the backend, so their absence from
//! the output is not an error.

use crate::{EdgeOp, NodeOp, NodeWrite, ReconcilePlan};
use graft_core::{MutationConfig, NodeHandle};
use indexmap::IndexMap;
use serde_json::{Map, Value as Json};

/// What an expected write effect was missing from the transaction output.
const NOT_CONFIRMED: &str = "not confirmed by the transaction";

/// Parse the write transaction's output against the plan it executed.
///
/// `inserted` maps insert-statement variables (without the sigil) to the
/// backend ids the transaction reported for them.
pub fn parse_write_response(
    plan: &ReconcilePlan,
    inserted: &IndexMap<String, String>,
    config: &MutationConfig,
) -> Json {
    let by_handle: IndexMap<NodeHandle, &NodeWrite> =
        plan.nodes.iter().map(|node| (node.handle, node)).collect();

    let mut entries = Vec::new();
    for node in &plan.nodes {
        if node.op == NodeOp::Match {
            continue;
        }
        let mut entry = Map::new();
        entry.insert("$thing".to_string(), Json::String(node.thing.clone()));
        entry.insert("$op".to_string(), Json::String(node.op.as_str().to_string()));
        if let Some(id) = node_id(node, inserted) {
            entry.insert("$id".to_string(), Json::String(id));
        }
        if let Some(temp) = &node.temp_id {
            entry.insert("$tempId".to_string(), Json::String(temp.clone()));
        }
        for (storage, value) in &node.data {
            entry.insert(storage.clone(), value.to_json());
        }
        let expects_confirmation = matches!(node.op, NodeOp::Create | NodeOp::Update);
        if expects_confirmation && !inserted.contains_key(&node.handle.var()) {
            entry.insert("$error".to_string(), Json::String(NOT_CONFIRMED.to_string()));
        }
        entries.push(entry);
    }

    for edge in &plan.edges {
        if edge.op == EdgeOp::Match {
            continue;
        }
        let mut entry = Map::new();
        entry.insert("$relation".to_string(), Json::String(edge.relation.clone()));
        entry.insert("$op".to_string(), Json::String(edge.op.as_str().to_string()));
        if let Some(id) = inserted.get(&edge.handle.var()) {
            entry.insert("$id".to_string(), Json::String(id.clone()));
        }
        if let Some(temp) = &edge.temp_id {
            entry.insert("$tempId".to_string(), Json::String(temp.clone()));
        }
        for (role, players) in &edge.roles {
            let ids: Vec<Json> = players
                .iter()
                .map(|player| {
                    by_handle
                        .get(player)
                        .and_then(|node| node_id(node, inserted))
                        .or_else(|| inserted.get(&player.var()).cloned())
                        .map(Json::String)
                        .unwrap_or(Json::Null)
                })
                .collect();
            entry.insert(role.clone(), Json::Array(ids));
        }
        for (storage, value) in &edge.data {
            entry.insert(storage.clone(), value.to_json());
        }
        let expects_confirmation = matches!(edge.op, EdgeOp::Create | EdgeOp::Link);
        if expects_confirmation && !inserted.contains_key(&edge.handle.var()) {
            entry.insert("$error".to_string(), Json::String(NOT_CONFIRMED.to_string()));
        }
        entries.push(entry);
    }

    if config.no_metadata {
        for entry in &mut entries {
            entry.retain(|key, _| !key.starts_with('$') || key == "$error");
        }
    }
    Json::Array(entries.into_iter().map(Json::Object).collect())
}

/// An instance's real id: known before the write, or reported by it.
fn node_id(node: &NodeWrite, inserted: &IndexMap<String, String>) -> Option<String> {
    node.id
        .clone()
        .or_else(|| inserted.get(&node.handle.var()).cloned())
}
