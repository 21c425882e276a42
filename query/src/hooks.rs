//! Post-hooks over the reconstructed tree.
//!
//! One more walk after parsing, guided by the request paths recorded during
//! enrichment: requested virtual fields are filled from their derived-value
//! function over the node's own values, and explicitly excluded fields are
//! deleted.

use crate::{EnrichedQuery, Selection};
use graft_core::DataValue;
use graft_schema::DefaultValue;
use indexmap::IndexMap;
use serde_json::{Map, Value as Json};

/// Run the post-hooks on a parsed tree.
pub fn post_hooks(query: &EnrichedQuery, tree: &mut Json) {
    apply(tree, &query.selections, &query.excluded);
}

fn apply(value: &mut Json, selections: &[Selection], excluded: &[String]) {
    match value {
        Json::Array(items) => {
            for item in items {
                apply(item, selections, excluded);
            }
        }
        Json::Object(object) => apply_node(object, selections, excluded),
        _ => {}
    }
}

fn apply_node(object: &mut Map<String, Json>, selections: &[Selection], excluded: &[String]) {
    for selection in selections {
        match selection {
            Selection::Data(data) => {
                if !data.is_virtual {
                    continue;
                }
                let missing = object
                    .get(&data.alias)
                    .map(Json::is_null)
                    .unwrap_or(true);
                if missing {
                    if let Some(DefaultValue::Computed(derive)) = &data.default {
                        let fields = own_values(object);
                        object.insert(data.alias.clone(), derive(&fields).to_json());
                    }
                }
            }
            Selection::Link(link) => {
                if link.just_id {
                    continue;
                }
                if let Some(child) = object.get_mut(&link.alias) {
                    apply(child, &link.selections, &link.excluded);
                }
            }
            Selection::Role(role) => {
                if role.just_id {
                    continue;
                }
                if let Some(child) = object.get_mut(&role.alias) {
                    apply(child, &role.selections, &role.excluded);
                }
            }
        }
    }

    for field in excluded {
        object.remove(field);
    }
}

/// The node's own scalar values, keyed by field name, as derived-value
/// function input.
fn own_values(object: &Map<String, Json>) -> IndexMap<String, DataValue> {
    let mut fields = IndexMap::new();
    for (key, value) in object {
        if key.starts_with('$') {
            continue;
        }
        if let Ok(scalar) = DataValue::from_json(value) {
            fields.insert(key.clone(), scalar);
        }
    }
    fields
}
