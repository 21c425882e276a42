//! Query error types.

use thiserror::Error;

/// Result type for query compilation.
pub type QueryCompileResult<T> = Result<T, QueryError>;

/// Errors raised while compiling a query or decoding its response. All of
/// these surface before (or instead of) any statement execution.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unknown thing: {0}")]
    UnknownThing(String),

    #[error("Unknown field {field} on {thing}")]
    UnknownField { thing: String, field: String },

    #[error("Thing {thing} has a composite id; addressing it by $id is unsupported")]
    CompositeIdUnsupported { thing: String },

    #[error("Unsupported filter operator: {0}")]
    UnsupportedOperator(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Malformed response row: {0}")]
    MalformedResponse(String),
}

impl QueryError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest(message.into())
    }

    pub fn bad_response(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    pub fn unknown_field(thing: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            thing: thing.into(),
            field: field.into(),
        }
    }
}
