//! Response parsing.
//!
//! Reassembles flat fetch rows into the requested nested shape. Each block
//! is located by the fetch key its selection emitted; the key's metadata
//! (cardinality, justId, idAdded) drives the decode, and the enriched query
//! supplies the child selections for recursion. Cardinality ONE collapses
//! an array to its single element or null; a filter-by-unique request
//! collapses the whole result to a single object or null.

use crate::{
    DataSelection, EnrichedQuery, LinkSelection, QueryCompileResult, QueryError, RoleSelection,
    Selection,
};
use graft_schema::Cardinality;
use serde_json::{Map, Value as Json};

/// Parse the rows of one query back into the requested tree.
pub fn parse_response(query: &EnrichedQuery, rows: &[Json]) -> QueryCompileResult<Json> {
    let mut nodes = Vec::with_capacity(rows.len());
    for row in rows {
        nodes.push(parse_node(row, &query.selections, &query.thing)?);
    }
    if query.filter_by_unique {
        Ok(nodes.into_iter().next().unwrap_or(Json::Null))
    } else {
        Ok(Json::Array(nodes))
    }
}

fn parse_node(row: &Json, selections: &[Selection], thing: &str) -> QueryCompileResult<Json> {
    let object = row
        .as_object()
        .ok_or_else(|| QueryError::bad_response("row is not an object"))?;

    let mut out = Map::new();
    out.insert("$thing".to_string(), Json::String(thing.to_string()));

    for selection in selections {
        match selection {
            Selection::Data(data) => parse_data(object, data, &mut out),
            Selection::Link(link) => parse_link(object, link, &mut out)?,
            Selection::Role(role) => parse_role(object, role, &mut out)?,
        }
    }
    Ok(Json::Object(out))
}

fn parse_data(row: &Map<String, Json>, data: &DataSelection, out: &mut Map<String, Json>) {
    // Virtual fields never come back from the database; post-hooks fill them.
    if data.is_virtual {
        return;
    }
    let key = data.fetch_key().to_string();
    let value = collapse(row.get(&key).cloned().unwrap_or(Json::Null), data.cardinality);
    if data.is_id {
        out.insert("$id".to_string(), value.clone());
    }
    // Auto-added ids surface as $id metadata only.
    if !data.id_added {
        out.insert(data.alias.clone(), value);
    }
}

fn parse_link(
    row: &Map<String, Json>,
    link: &LinkSelection,
    out: &mut Map<String, Json>,
) -> QueryCompileResult<()> {
    let key = link.fetch_key().to_string();
    let children = parse_children(
        row.get(&key),
        &link.selections,
        &link.child_thing,
        link.just_id,
    )?;
    out.insert(link.alias.clone(), collapse(Json::Array(children), link.cardinality));
    Ok(())
}

fn parse_role(
    row: &Map<String, Json>,
    role: &RoleSelection,
    out: &mut Map<String, Json>,
) -> QueryCompileResult<()> {
    let key = role.fetch_key().to_string();
    let children = parse_children(
        row.get(&key),
        &role.selections,
        &role.child_thing,
        role.just_id,
    )?;
    out.insert(role.alias.clone(), collapse(Json::Array(children), role.cardinality));
    Ok(())
}

fn parse_children(
    block: Option<&Json>,
    selections: &[Selection],
    child_thing: &str,
    just_id: bool,
) -> QueryCompileResult<Vec<Json>> {
    let rows = match block {
        None | Some(Json::Null) => return Ok(Vec::new()),
        Some(Json::Array(rows)) => rows,
        Some(_) => return Err(QueryError::bad_response("link block is not an array")),
    };
    let mut children = Vec::with_capacity(rows.len());
    for row in rows {
        let node = parse_node(row, selections, child_thing)?;
        if just_id {
            let id = node
                .get("$id")
                .cloned()
                .ok_or_else(|| QueryError::bad_response("justId row carries no id"))?;
            children.push(id);
        } else {
            children.push(node);
        }
    }
    Ok(children)
}

/// Cardinality ONE always yields a scalar (or null), never a
/// single-element array.
fn collapse(value: Json, cardinality: Cardinality) -> Json {
    match (cardinality, value) {
        (Cardinality::One, Json::Array(items)) => items.into_iter().next().unwrap_or(Json::Null),
        (_, value) => value,
    }
}
