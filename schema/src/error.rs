//! Schema error types.

use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while building or enriching a schema. All of these are
/// fatal at startup; nothing downstream runs against a schema that failed
/// enrichment.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Duplicate thing name: {0}")]
    DuplicateThing(String),

    #[error("Unknown thing: {0}")]
    UnknownThing(String),

    #[error("Unknown parent {parent} on thing {thing}")]
    UnknownParent { thing: String, parent: String },

    #[error("Inheritance cycle detected involving thing: {0}")]
    InheritanceCycle(String),

    #[error("Unsupported content type: {content}")]
    UnsupportedContent { content: String },

    #[error("Roles declared on entity {0}; only relations carry roles")]
    RolesOnEntity(String),

    #[error("Link field {field} on {thing} references unknown relation {relation}")]
    UnknownRelation {
        thing: String,
        field: String,
        relation: String,
    },

    #[error("Link field {field} on {thing} plays unknown role {role} of {relation}")]
    UnknownRole {
        thing: String,
        field: String,
        relation: String,
        role: String,
    },

    #[error("Role {role} of relation {relation} is not played by any link field")]
    UnplayedRole { relation: String, role: String },

    #[error("Role {role} of relation {relation} is played by multiple things: {players:?}")]
    AmbiguousRole {
        relation: String,
        role: String,
        players: Vec<String>,
    },

    #[error("Link field {field} on {thing} resolves to no opposite players")]
    NoOpposite { thing: String, field: String },
}
