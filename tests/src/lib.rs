//! Integration test harness for Graft.
//!
//! [`fixture`] builds the schema the scenarios share and [`fake`] provides
//! a scripted driver that records every statement and replays canned rows.
//! The scenario files under `tests/` run the full pipelines through
//! `GraftClient` against that pair.

pub mod fake;
pub mod fixture;

pub mod prelude {
    pub use crate::fake::FakeDriver;
    pub use crate::fixture::fixture_schema;
    pub use graft_core::{Config, MutationConfig, QueryConfig};
    pub use graft_driver::{GraphDriver, WriteBatch, WriteOutcome};
    pub use graft_session::{GraftClient, GraftError};
    pub use serde_json::json;
    pub use std::sync::Arc;

    /// A client over the fixture schema with default configuration.
    pub fn fixture_client(driver: Arc<FakeDriver>) -> GraftClient {
        GraftClient::new(fixture_schema(), driver, Config::default())
    }
}
