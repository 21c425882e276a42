//! Aggregated session errors.

use thiserror::Error;

/// Result type for session operations.
pub type GraftResult<T> = Result<T, GraftError>;

/// Any error a request can surface: schema resolution, request compilation,
/// plan reconciliation, or the driver's transport/transaction failures.
#[derive(Debug, Error)]
pub enum GraftError {
    #[error(transparent)]
    Schema(#[from] graft_schema::SchemaError),

    #[error(transparent)]
    Query(#[from] graft_query::QueryError),

    #[error(transparent)]
    Mutation(#[from] graft_mutation::MutationError),

    #[error(transparent)]
    Driver(#[from] graft_driver::DriverError),
}
