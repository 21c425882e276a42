//! The pre-query: a read-back of current state before the write.
//!
//! Whenever any reachable operation must observe current linkage (anything
//! but a pure create), an equivalent read query is derived from the
//! mutation tree — same things, ids and filters, selecting exactly the
//! child fields the mutation touches — and executed through the query
//! compiler. Its result folds into an immutable [`PathCache`] keyed by
//! object path, which the reconciler threads into the diff step.

use crate::{MutNode, MutationTree};
use graft_core::HandleAllocator;
use graft_query::IdSelector;
use indexmap::IndexMap;
use serde_json::{json, Value as Json};
use std::collections::BTreeSet;

/// Current linkage per object path, plus the set of ids seen to exist.
#[derive(Debug, Clone, Default)]
pub struct PathCache {
    slots: IndexMap<String, BTreeSet<String>>,
    existing: BTreeSet<String>,
}

impl PathCache {
    /// Ids currently linked at the given object path.
    pub fn linked(&self, path: &str) -> Option<&BTreeSet<String>> {
        self.slots.get(path)
    }

    /// True when the pre-query saw this id anywhere.
    pub fn exists(&self, id: &str) -> bool {
        self.existing.contains(id)
    }

    fn record(&mut self, path: String, id: String) {
        self.slots.entry(path).or_default().insert(id);
    }
}

/// The derived read: request documents plus the root index each belongs to.
#[derive(Debug, Clone)]
pub struct PreQuery {
    pub requests: Vec<Json>,
    pub root_indexes: Vec<usize>,
}

/// Derive the read-back for a mutation tree. `None` when nothing needs it.
pub fn build_prequery(tree: &MutationTree) -> Option<PreQuery> {
    let mut requests = Vec::new();
    let mut root_indexes = Vec::new();
    for (index, root) in tree.roots.iter().enumerate() {
        let needs = subtree_needs_state(root);
        if !needs {
            continue;
        }
        requests.push(root_request(root));
        root_indexes.push(index);
    }
    if requests.is_empty() {
        None
    } else {
        Some(PreQuery {
            requests,
            root_indexes,
        })
    }
}

fn subtree_needs_state(node: &MutNode) -> bool {
    if node.op.needs_prequery() {
        return true;
    }
    node.children
        .values()
        .flatten()
        .any(subtree_needs_state)
}

fn root_request(root: &MutNode) -> Json {
    let mut request = serde_json::Map::new();
    request.insert("$thing".to_string(), json!(root.thing));
    request.insert("$thingType".to_string(), json!(root.kind.to_string()));
    if let Some(id) = &root.id {
        let id = match id {
            IdSelector::One(id) => json!(id),
            IdSelector::Many(ids) => json!(ids),
        };
        request.insert("$id".to_string(), id);
    }
    if let Some(filter) = &root.filter {
        request.insert("$filter".to_string(), filter.clone());
    }
    request.insert(
        "$fields".to_string(),
        Json::Array(touched_selectors(&[root])),
    );
    Json::Object(request)
}

/// The field selection is whichever child fields the mutation touches,
/// descending through synthesized intermediaries to the fields the query
/// language actually addresses.
fn touched_selectors(nodes: &[&MutNode]) -> Vec<Json> {
    let mut by_key: IndexMap<String, Vec<&MutNode>> = IndexMap::new();
    for node in nodes {
        for (key, children) in &node.children {
            let inner: Vec<&MutNode> = children.iter().map(unwrap_synth).collect();
            by_key.entry(key.clone()).or_default().extend(inner);
        }
    }
    by_key
        .into_iter()
        .map(|(key, inner)| {
            let nested = touched_selectors(&inner);
            if nested.is_empty() {
                json!({ "$path": key })
            } else {
                json!({ "$path": key, "$fields": nested })
            }
        })
        .collect()
}

fn unwrap_synth(node: &MutNode) -> &MutNode {
    match &node.synth {
        Some(via) => node
            .children
            .get(&via.reach)
            .and_then(|children| children.first())
            .unwrap_or(node),
        None => node,
    }
}

/// Index pre-query results into a path cache. A pure reduction: result
/// trees in, immutable map out.
pub fn build_path_cache(results: &[Json]) -> PathCache {
    let mut cache = PathCache::default();
    for result in results {
        match result {
            Json::Array(rows) => {
                for row in rows {
                    index_object(row, &mut cache);
                }
            }
            Json::Object(_) => index_object(result, &mut cache),
            _ => {}
        }
    }
    cache
}

fn index_object(value: &Json, cache: &mut PathCache) {
    let Some(object) = value.as_object() else {
        return;
    };
    let Some(id) = object.get("$id").and_then(Json::as_str) else {
        return;
    };
    cache.existing.insert(id.to_string());
    index_fields(object, &id.to_string(), cache);
}

fn index_fields(object: &serde_json::Map<String, Json>, chain: &str, cache: &mut PathCache) {
    for (key, value) in object {
        if key.starts_with('$') {
            continue;
        }
        let children: Vec<&Json> = match value {
            Json::Array(items) => items.iter().collect(),
            Json::Object(_) => vec![value],
            _ => continue,
        };
        for child in children {
            let Some(child_object) = child.as_object() else {
                continue;
            };
            let Some(child_id) = child_object.get("$id").and_then(Json::as_str) else {
                continue;
            };
            cache.record(format!("{chain}.{key}"), child_id.to_string());
            cache.existing.insert(child_id.to_string());
            index_fields(child_object, &format!("{chain}.{key}.{child_id}"), cache);
        }
    }
}

/// Expand roots addressed only by `$filter` to the ids the pre-query
/// matched. A filter matching nothing expands to nothing.
pub fn resolve_root_filters(
    tree: MutationTree,
    prequery: &PreQuery,
    results: &[Json],
    alloc: &mut HandleAllocator,
) -> MutationTree {
    let mut matched: IndexMap<usize, Vec<String>> = IndexMap::new();
    for (request_index, root_index) in prequery.root_indexes.iter().enumerate() {
        let Some(result) = results.get(request_index) else {
            continue;
        };
        let ids: Vec<String> = match result {
            Json::Array(rows) => rows
                .iter()
                .filter_map(|row| row.get("$id").and_then(Json::as_str))
                .map(str::to_string)
                .collect(),
            Json::Object(_) => result
                .get("$id")
                .and_then(Json::as_str)
                .map(|id| vec![id.to_string()])
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        matched.insert(*root_index, ids);
    }

    let mut roots = Vec::new();
    for (index, mut root) in tree.roots.into_iter().enumerate() {
        let filter_only = root.id.is_none() && root.filter.is_some();
        if !filter_only {
            roots.push(root);
            continue;
        }
        let Some(ids) = matched.get(&index) else {
            roots.push(root);
            continue;
        };
        match ids.as_slice() {
            [] => {}
            [one] => {
                root.id = Some(IdSelector::One(one.clone()));
                roots.push(root);
            }
            many => {
                root.id = Some(IdSelector::Many(many.to_vec()));
                roots.push(root);
            }
        }
    }
    let tree = MutationTree { roots };
    // Re-run the split so every node holds one identity again.
    crate::split_ids(tree, alloc)
}
