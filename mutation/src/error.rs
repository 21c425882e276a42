//! Mutation error types.
//!
//! Request validation errors surface while the tree is being enriched;
//! reconciliation errors surface before any write transaction opens, so a
//! write is never attempted against an invalid plan.

use thiserror::Error;

/// Result type for mutation operations.
pub type MutationResult<T> = Result<T, MutationError>;

/// Errors that can occur while compiling a mutation.
#[derive(Debug, Error)]
pub enum MutationError {
    // ---- request validation ----
    #[error("Unknown thing: {0}")]
    UnknownThing(String),

    #[error("Unknown field {field} on {thing}")]
    UnknownField { thing: String, field: String },

    #[error("Unknown operation: {0}")]
    UnknownOp(String),

    #[error("Malformed mutation: {0}")]
    Malformed(String),

    #[error("Thing {thing} has a composite id; addressing it by $id is unsupported")]
    CompositeIdUnsupported { thing: String },

    #[error("Malformed temp id: {0}")]
    MalformedTempId(String),

    #[error("$id cannot be written on a create; set the id field instead")]
    IdWriteOnCreate,

    #[error("Operation {op} is not allowed under a parent create")]
    IllegalOpUnderCreate { op: String },

    #[error("Fields cannot be supplied on a delete")]
    FieldsOnDelete,

    #[error("Data field {field} cannot be supplied on a {op}")]
    DataOnLinkOp { field: String, op: String },

    #[error("Invalid value for {field} on {thing}: {reason}")]
    InvalidValue {
        thing: String,
        field: String,
        reason: String,
    },

    #[error("Missing required field {field} on {thing}")]
    MissingRequired { thing: String, field: String },

    #[error("Value for {field} on {thing} does not match pattern {pattern}")]
    PatternViolation {
        thing: String,
        field: String,
        pattern: String,
    },

    #[error("Value for {field} on {thing} is not among the allowed values")]
    NotAllowedValue { thing: String, field: String },

    #[error("Create of {thing} carries no id value and the id field has no default")]
    CreateWithoutId { thing: String },

    #[error("Field {field} on {thing} holds one value; an array was supplied")]
    CardinalityOneArray { thing: String, field: String },

    // ---- reconciliation ----
    #[error("Cardinality-ONE slot {field} of {thing} {id} is already occupied by {current}")]
    OccupiedSlot {
        thing: String,
        id: String,
        field: String,
        current: String,
    },

    #[error("No current link for {id} at {field}; nothing to target")]
    MissingTarget { field: String, id: String },

    #[error("Orphan temp id {0}: it is referenced but never created in this mutation")]
    OrphanTempId(String),

    #[error("Duplicate id {0} on two create operations")]
    DuplicateId(String),

    #[error("Conflicting operations {first} and {second} on one {relation} instance")]
    EdgeOpConflict {
        relation: String,
        first: String,
        second: String,
    },

    #[error("Relation {relation} instance has no role players")]
    RelationWithoutEdges { relation: String },

    #[error("replace requires the pre-query; it is disabled by configuration")]
    ReplaceWithoutPreQuery,

    // ---- collaborators ----
    #[error(transparent)]
    Query(#[from] graft_query::QueryError),
}

impl MutationError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    pub fn unknown_field(thing: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            thing: thing.into(),
            field: field.into(),
        }
    }

    pub fn invalid_value(
        thing: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            thing: thing.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}
