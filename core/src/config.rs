//! The configuration surface recognized by the pipeline.

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Query pipeline options.
    pub query: QueryConfig,
    /// Mutation pipeline options.
    pub mutation: MutationConfig,
}

/// Query pipeline options.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryConfig {
    /// Strip all `$`-prefixed metadata keys from results.
    pub no_metadata: bool,
    /// Keep explicit nulls for requested-but-absent fields instead of
    /// dropping them.
    pub return_nulls: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            no_metadata: false,
            return_nulls: false,
        }
    }
}

/// Mutation pipeline options.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MutationConfig {
    /// Strip all `$`-prefixed metadata keys from mutation results.
    pub no_metadata: bool,
    /// Treat update/delete/unlink against a missing target as a no-op
    /// instead of an error.
    pub ignore_nonexisting_things: bool,
    /// Run the read-back that feeds link/unlink diffing. When disabled,
    /// `replace` is rejected outright.
    pub pre_query: bool,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            no_metadata: false,
            ignore_nonexisting_things: false,
            pre_query: true,
        }
    }
}
