//! The object-graph mapper facade.

use crate::GraftResult;
use graft_core::{Config, HandleAllocator};
use graft_driver::{GraphDriver, WriteBatch, WriteOutcome};
use graft_mutation::{
    add_intermediaries, build_mutation, build_path_cache, build_prequery, enrich_mutation,
    parse_write_response, reconcile, resolve_root_filters, split_ids, PathCache,
};
use graft_query::{
    build_query, clean_output, enrich_batch, enrich_query, parse_response, post_hooks,
    EnrichedQuery, QueryRequest,
};
use graft_schema::Schema;
use serde_json::Value as Json;
use std::sync::Arc;
use tracing::{debug, trace};

/// One client per enriched schema and driver pair.
///
/// Requests borrow the client immutably, so independent requests may run
/// concurrently against the same driver. Within one mutation, the pre-query
/// and the write are strictly sequential; between two mutations there is no
/// coordination, so the diff-then-write step is read-then-write and two
/// concurrent mutations touching the same link can lose an update. The
/// backing database's transaction isolation is the only consistency
/// guarantee at this layer.
pub struct GraftClient {
    schema: Schema,
    driver: Arc<dyn GraphDriver>,
    config: Config,
}

impl GraftClient {
    /// Create a client over an already-enriched schema.
    pub fn new(schema: Schema, driver: Arc<dyn GraphDriver>, config: Config) -> Self {
        Self {
            schema,
            driver,
            config,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one query selector, or a batch of them, through the pipeline:
    /// enrich, build, execute, parse, post-hooks, clean. A batch fans out
    /// as concurrent read transactions and correlates results by index.
    pub async fn query(&self, request: &Json) -> GraftResult<Json> {
        let requests = QueryRequest::parse_batch(request)?;
        let enriched = enrich_batch(&self.schema, &requests)?;
        let statements: Vec<String> = enriched
            .iter()
            .map(|query| build_query(query).statement)
            .collect();
        for statement in &statements {
            trace!(%statement, "query statement");
        }

        debug!(queries = statements.len(), "executing read batch");
        let rows = self.driver.read_batch(&statements).await?;

        let mut results = Vec::with_capacity(enriched.len());
        for (query, rows) in enriched.iter().zip(&rows) {
            results.push(self.decode(query, rows)?);
        }
        if request.is_array() {
            Ok(Json::Array(results))
        } else {
            Ok(results.into_iter().next().unwrap_or(Json::Null))
        }
    }

    fn decode(&self, query: &EnrichedQuery, rows: &[Json]) -> GraftResult<Json> {
        let mut tree = parse_response(query, rows)?;
        post_hooks(query, &mut tree);
        clean_output(&mut tree, &self.config.query);
        Ok(tree)
    }

    /// Run one mutation document through the pipeline: enrich, split,
    /// intermediaries, pre-query (when any operation must observe current
    /// state), reconcile, build, write, parse-response.
    pub async fn mutate(&self, request: &Json) -> GraftResult<Json> {
        let mut alloc = HandleAllocator::new();
        let tree = enrich_mutation(&self.schema, request, &mut alloc)?;
        let tree = split_ids(tree, &mut alloc);
        let mut tree = add_intermediaries(&self.schema, tree, &mut alloc)?;

        let mut cache: Option<PathCache> = None;
        if self.config.mutation.pre_query && tree.needs_prequery() {
            if let Some(prequery) = build_prequery(&tree) {
                debug!(reads = prequery.requests.len(), "executing pre-query");
                let results = self.run_prequery(&prequery.requests).await?;
                tree = resolve_root_filters(tree, &prequery, &results, &mut alloc);
                cache = Some(build_path_cache(&results));
            }
        }

        let plan = reconcile(
            &self.schema,
            &tree,
            cache.as_ref(),
            &self.config.mutation,
            &mut alloc,
        )?;
        let statements = build_mutation(&plan);
        let batch = WriteBatch {
            delete: statements.delete_statement(),
            insert: statements.insert_statement(),
        };
        if let Some(statement) = &batch.delete {
            trace!(%statement, "delete statement");
        }
        if let Some(statement) = &batch.insert {
            trace!(%statement, "insert statement");
        }

        let outcome = if batch.is_empty() {
            debug!("mutation reconciled to zero operations");
            WriteOutcome::default()
        } else {
            debug!(
                nodes = plan.nodes.len(),
                edges = plan.edges.len(),
                "executing write transaction"
            );
            self.driver.write(&batch).await?
        };
        Ok(parse_write_response(
            &plan,
            &outcome.inserted,
            &self.config.mutation,
        ))
    }

    /// The read-back feeding the diff step. It runs through the query
    /// pipeline without post-hooks or cleaning, so the path cache sees every
    /// `$id` and empty slot.
    async fn run_prequery(&self, requests: &[Json]) -> GraftResult<Vec<Json>> {
        let mut enriched = Vec::with_capacity(requests.len());
        for request in requests {
            let parsed = QueryRequest::parse(request)?;
            enriched.push(enrich_query(&self.schema, &parsed)?);
        }
        let statements: Vec<String> = enriched
            .iter()
            .map(|query| build_query(query).statement)
            .collect();
        let rows = self.driver.read_batch(&statements).await?;

        let mut results = Vec::with_capacity(enriched.len());
        for (query, rows) in enriched.iter().zip(&rows) {
            results.push(parse_response(query, rows)?);
        }
        Ok(results)
    }
}
