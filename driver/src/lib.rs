//! Graft driver interface.
//!
//! The pipelines compile statements; executing them belongs to a transport
//! collaborator implementing [`GraphDriver`]: one read-only transaction per
//! query statement, one write transaction per mutation (delete, then
//! insert, committed or rolled back atomically). Sessions and transactions
//! are the implementor's scoped resources, opened lazily and closed on
//! every exit path. Timeouts and retries are likewise the implementor's
//! concern; this layer exposes neither.

mod error;

pub use error::*;

use async_trait::async_trait;
use futures::future::try_join_all;
use indexmap::IndexMap;
use serde_json::Value as Json;

/// The write half of one mutation: at most one delete and one insert
/// statement, executed in this order inside a single transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    pub delete: Option<String>,
    pub insert: Option<String>,
}

impl WriteBatch {
    /// True when there is nothing to execute.
    pub fn is_empty(&self) -> bool {
        self.delete.is_none() && self.insert.is_none()
    }
}

/// What a committed write transaction reported back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Backend id per insert-statement variable, keyed without the sigil.
    pub inserted: IndexMap<String, String>,
    /// Number of answers the delete statement matched.
    pub deleted: usize,
}

/// A connection to the backing graph database.
#[async_trait]
pub trait GraphDriver: Send + Sync {
    /// Execute one match/fetch statement in a read-only transaction and
    /// return its flat rows.
    async fn read(&self, statement: &str) -> DriverResult<Vec<Json>>;

    /// Execute independent statements as concurrent read transactions
    /// sharing one session. Results correlate by index; the transactions
    /// themselves run in no guaranteed order.
    async fn read_batch(&self, statements: &[String]) -> DriverResult<Vec<Vec<Json>>> {
        try_join_all(statements.iter().map(|statement| self.read(statement))).await
    }

    /// Execute one write transaction: the delete statement (if any), then
    /// the insert statement (if any), committed or rolled back atomically.
    async fn write(&self, batch: &WriteBatch) -> DriverResult<WriteOutcome>;
}
