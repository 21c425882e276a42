//! Fetch block keys.
//!
//! Every fetch sub-block is keyed by a string embedding the dotted request
//! path plus decode metadata. The key is the single channel through which
//! the response parser learns how to decode a block; it never re-derives
//! any of this from the schema.
//!
//! Paths and aliases come from the schema, which never contains the `|`
//! separator, so no escaping is needed.

use graft_core::RequestPath;
use graft_schema::Cardinality;
use std::fmt;

/// Decoded form of a fetch block key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchKey {
    /// Dotted request path of the field.
    pub path: RequestPath,
    /// Display alias under which the value surfaces.
    pub alias: String,
    /// Declared cardinality; ONE collapses arrays on decode.
    pub cardinality: Cardinality,
    /// Children were narrowed to bare ids.
    pub just_id: bool,
    /// The field is an id that was auto-added rather than requested.
    pub id_added: bool,
    /// The block holds a scalar attribute value rather than sub-rows.
    pub scalar: bool,
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|as:{}|card:{}|justid:{}|idadded:{}|scalar:{}",
            self.path,
            self.alias,
            if self.cardinality.is_many() { "many" } else { "one" },
            flag(self.just_id),
            flag(self.id_added),
            flag(self.scalar),
        )
    }
}

fn flag(value: bool) -> char {
    if value {
        't'
    } else {
        'f'
    }
}

impl FetchKey {
    /// Decode a key produced by `Display`. Returns `None` for keys that are
    /// not fetch keys (foreign keys in a response row are skipped, not
    /// errors).
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split('|');
        let path = RequestPath::parse(parts.next()?);
        let mut alias = None;
        let mut cardinality = None;
        let mut just_id = None;
        let mut id_added = None;
        let mut scalar = None;
        for part in parts {
            let (name, value) = part.split_once(':')?;
            match name {
                "as" => alias = Some(value.to_string()),
                "card" => {
                    cardinality = Some(match value {
                        "many" => Cardinality::Many,
                        "one" => Cardinality::One,
                        _ => return None,
                    })
                }
                "justid" => just_id = parse_flag(value),
                "idadded" => id_added = parse_flag(value),
                "scalar" => scalar = parse_flag(value),
                _ => return None,
            }
        }
        Some(FetchKey {
            path,
            alias: alias?,
            cardinality: cardinality?,
            just_id: just_id?,
            id_added: id_added?,
            scalar: scalar?,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "t" => Some(true),
        "f" => Some(false),
        _ => None,
    }
}
