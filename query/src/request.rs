//! Inbound query request surface.
//!
//! A query request is a `$`-keyed JSON document: one thing selector plus
//! optional `$id`, `$filter`, `$fields`, `$excludedFields`, `$sort`,
//! `$offset` and `$limit`. A batch is an array of such selectors. The keys
//! outside the `$` namespace are schema field paths, so the walk is manual
//! rather than a serde derive.

use crate::{QueryCompileResult, QueryError};
use serde_json::Value as Json;

/// One parsed query selector.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Thing name from `$entity`/`$relation`/`$thing`.
    pub thing: String,
    /// True when the request used `$relation`.
    pub relation_selector: bool,
    /// `$id` shorthand.
    pub id: Option<IdSelector>,
    /// Raw `$filter` document; resolved against the schema during enrich.
    pub filter: Option<Json>,
    /// Requested fields; `None` means "all fields".
    pub fields: Option<Vec<FieldSelector>>,
    /// `$excludedFields`.
    pub excluded_fields: Vec<String>,
    /// `$sort` keys.
    pub sort: Vec<SortKey>,
    /// `$offset`.
    pub offset: Option<u64>,
    /// `$limit`.
    pub limit: Option<u64>,
}

/// `$id`: one id or a set of ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdSelector {
    One(String),
    Many(Vec<String>),
}

/// One entry of `$fields`: a bare path or a nested selector object.
#[derive(Debug, Clone)]
pub enum FieldSelector {
    Path(String),
    Nested(NestedSelector),
}

impl FieldSelector {
    /// The field path this selector addresses.
    pub fn path(&self) -> &str {
        match self {
            FieldSelector::Path(p) => p,
            FieldSelector::Nested(n) => &n.path,
        }
    }
}

/// A nested selector: `{$path: "...", $fields: [...], ...}`.
#[derive(Debug, Clone, Default)]
pub struct NestedSelector {
    pub path: String,
    /// Display alias (`$as`), defaulting to the path.
    pub alias: Option<String>,
    pub id: Option<IdSelector>,
    pub filter: Option<Json>,
    pub fields: Option<Vec<FieldSelector>>,
    pub excluded_fields: Vec<String>,
    /// Return bare ids instead of objects (`$justId`).
    pub just_id: bool,
}

/// One `$sort` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub desc: bool,
}

impl QueryRequest {
    /// Parse a batch: a single selector object, or an array of them.
    pub fn parse_batch(value: &Json) -> QueryCompileResult<Vec<QueryRequest>> {
        match value {
            Json::Array(items) => items.iter().map(Self::parse).collect(),
            Json::Object(_) => Ok(vec![Self::parse(value)?]),
            _ => Err(QueryError::malformed("query must be an object or array")),
        }
    }

    /// Parse a single selector object.
    pub fn parse(value: &Json) -> QueryCompileResult<QueryRequest> {
        let object = value
            .as_object()
            .ok_or_else(|| QueryError::malformed("query selector must be an object"))?;

        let (thing, relation_selector) = if let Some(name) = object.get("$entity") {
            (expect_string(name, "$entity")?, false)
        } else if let Some(name) = object.get("$relation") {
            (expect_string(name, "$relation")?, true)
        } else if let Some(name) = object.get("$thing") {
            let is_relation = object
                .get("$thingType")
                .and_then(Json::as_str)
                .map(|t| t == "relation")
                .unwrap_or(false);
            (expect_string(name, "$thing")?, is_relation)
        } else {
            return Err(QueryError::malformed(
                "query selector needs $entity, $relation or $thing",
            ));
        };

        Ok(QueryRequest {
            thing,
            relation_selector,
            id: parse_id(object.get("$id"))?,
            filter: object.get("$filter").cloned(),
            fields: parse_fields(object.get("$fields"))?,
            excluded_fields: parse_string_list(object.get("$excludedFields"), "$excludedFields")?,
            sort: parse_sort(object.get("$sort"))?,
            offset: parse_index(object.get("$offset"), "$offset")?,
            limit: parse_index(object.get("$limit"), "$limit")?,
        })
    }
}

impl NestedSelector {
    fn parse(value: &serde_json::Map<String, Json>) -> QueryCompileResult<Self> {
        let path = value
            .get("$path")
            .and_then(Json::as_str)
            .ok_or_else(|| QueryError::malformed("nested selector needs a string $path"))?
            .to_string();
        Ok(NestedSelector {
            path,
            alias: value.get("$as").and_then(Json::as_str).map(str::to_string),
            id: parse_id(value.get("$id"))?,
            filter: value.get("$filter").cloned(),
            fields: parse_fields(value.get("$fields"))?,
            excluded_fields: parse_string_list(value.get("$excludedFields"), "$excludedFields")?,
            just_id: value
                .get("$justId")
                .and_then(Json::as_bool)
                .unwrap_or(false),
        })
    }
}

fn expect_string(value: &Json, key: &str) -> QueryCompileResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| QueryError::malformed(format!("{key} must be a string")))
}

fn parse_id(value: Option<&Json>) -> QueryCompileResult<Option<IdSelector>> {
    match value {
        None | Some(Json::Null) => Ok(None),
        Some(Json::String(id)) => Ok(Some(IdSelector::One(id.clone()))),
        Some(Json::Array(items)) => {
            let ids = items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| QueryError::malformed("$id array entries must be strings"))
                })
                .collect::<QueryCompileResult<Vec<_>>>()?;
            Ok(Some(IdSelector::Many(ids)))
        }
        Some(_) => Err(QueryError::malformed("$id must be a string or array")),
    }
}

fn parse_fields(value: Option<&Json>) -> QueryCompileResult<Option<Vec<FieldSelector>>> {
    let items = match value {
        None | Some(Json::Null) => return Ok(None),
        Some(Json::Array(items)) => items,
        Some(_) => return Err(QueryError::malformed("$fields must be an array")),
    };
    let mut selectors = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Json::String(path) => selectors.push(FieldSelector::Path(path.clone())),
            Json::Object(object) => {
                selectors.push(FieldSelector::Nested(NestedSelector::parse(object)?));
            }
            _ => {
                return Err(QueryError::malformed(
                    "$fields entries must be strings or selector objects",
                ))
            }
        }
    }
    Ok(Some(selectors))
}

fn parse_string_list(value: Option<&Json>, key: &str) -> QueryCompileResult<Vec<String>> {
    match value {
        None | Some(Json::Null) => Ok(Vec::new()),
        Some(Json::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| QueryError::malformed(format!("{key} entries must be strings")))
            })
            .collect(),
        Some(_) => Err(QueryError::malformed(format!("{key} must be an array"))),
    }
}

fn parse_sort(value: Option<&Json>) -> QueryCompileResult<Vec<SortKey>> {
    let items = match value {
        None | Some(Json::Null) => return Ok(Vec::new()),
        Some(Json::Array(items)) => items.clone(),
        Some(single) => vec![single.clone()],
    };
    let mut keys = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Json::String(field) => keys.push(SortKey { field, desc: false }),
            Json::Object(object) => {
                let field = object
                    .get("field")
                    .and_then(Json::as_str)
                    .ok_or_else(|| QueryError::malformed("$sort objects need a field"))?
                    .to_string();
                let desc = object.get("desc").and_then(Json::as_bool).unwrap_or(false);
                keys.push(SortKey { field, desc });
            }
            _ => return Err(QueryError::malformed("$sort entries must be strings or objects")),
        }
    }
    Ok(keys)
}

fn parse_index(value: Option<&Json>, key: &str) -> QueryCompileResult<Option<u64>> {
    match value {
        None | Some(Json::Null) => Ok(None),
        Some(Json::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| QueryError::malformed(format!("{key} must be a non-negative integer"))),
        Some(_) => Err(QueryError::malformed(format!("{key} must be a number"))),
    }
}
