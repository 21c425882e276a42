//! Output cleaning.
//!
//! Final pass over the tree: null and empty-array values drop unless
//! `returnNulls` keeps them, and `$`-prefixed metadata strips when
//! `noMetadata` is set.

use graft_core::QueryConfig;
use serde_json::Value as Json;

/// Clean a result tree in place according to configuration.
pub fn clean_output(tree: &mut Json, config: &QueryConfig) {
    clean_value(tree, config);
}

fn clean_value(value: &mut Json, config: &QueryConfig) {
    match value {
        Json::Array(items) => {
            for item in items {
                clean_value(item, config);
            }
        }
        Json::Object(object) => {
            for (_, child) in object.iter_mut() {
                clean_value(child, config);
            }
            object.retain(|key, child| {
                if config.no_metadata && key.starts_with('$') {
                    return false;
                }
                if !config.return_nulls {
                    if child.is_null() {
                        return false;
                    }
                    if child.as_array().map(Vec::is_empty).unwrap_or(false) {
                        return false;
                    }
                }
                true
            });
        }
        _ => {}
    }
}
