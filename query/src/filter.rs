//! Filter resolution and predicate compilation.
//!
//! Resolution maps request field names to storage paths and linked things
//! while the request is being enriched; compilation renders the resolved
//! tree into statement predicates. Every predicate appearance gets a fresh
//! synthetic variable, which is the only thing allowed to differ between two
//! compilations of the same filter.

use crate::{QueryCompileResult, QueryError};
use graft_core::DataValue;
use graft_schema::{LinkTarget, Schema, ThingDef};
use serde_json::Value as Json;

/// Mints synthetic statement variables (`$v0`, `$v1`, ...) for one compile.
#[derive(Debug, Default)]
pub struct VarGen {
    next: u32,
}

impl VarGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the next variable, with the `$` sigil.
    pub fn fresh(&mut self) -> String {
        let var = format!("$v{}", self.next);
        self.next += 1;
        var
    }
}

/// Comparison applied to one data field.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(DataValue),
    Ne(DataValue),
    In(Vec<DataValue>),
    Nin(Vec<DataValue>),
    Exists(bool),
}

/// A filter resolved against the schema.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedFilter {
    And(Vec<ResolvedFilter>),
    Or(Vec<ResolvedFilter>),
    Not(Box<ResolvedFilter>),
    /// Predicate on a data field, addressed by storage path.
    Data { storage_path: String, op: FilterOp },
    /// Existential sub-pattern over a link or role.
    Link {
        /// The relation joining subject and target.
        relation: String,
        /// Role the subject plays; `None` when the subject is the relation.
        via_role: Option<String>,
        /// Role reached on the other side; `None` when the link field
        /// targets the relation instance itself.
        reach_role: Option<String>,
        /// Filter applied to the reached instance.
        inner: Option<Box<ResolvedFilter>>,
    },
}

/// Resolve a raw `$filter` document against a thing.
pub fn resolve_filter(
    schema: &Schema,
    thing: &ThingDef,
    raw: &Json,
) -> QueryCompileResult<ResolvedFilter> {
    let object = raw
        .as_object()
        .ok_or_else(|| QueryError::malformed("$filter must be an object"))?;

    let mut conjuncts = Vec::new();
    for (key, value) in object {
        match key.as_str() {
            "$and" => conjuncts.push(ResolvedFilter::And(resolve_list(schema, thing, value)?)),
            "$or" => conjuncts.push(ResolvedFilter::Or(resolve_list(schema, thing, value)?)),
            "$not" => conjuncts.push(ResolvedFilter::Not(Box::new(resolve_filter(
                schema, thing, value,
            )?))),
            other if other.starts_with('$') => {
                return Err(QueryError::UnsupportedOperator(other.to_string()));
            }
            field => conjuncts.push(resolve_field(schema, thing, field, value)?),
        }
    }

    if conjuncts.len() == 1 {
        Ok(conjuncts.remove(0))
    } else {
        Ok(ResolvedFilter::And(conjuncts))
    }
}

fn resolve_list(
    schema: &Schema,
    thing: &ThingDef,
    value: &Json,
) -> QueryCompileResult<Vec<ResolvedFilter>> {
    let items = value
        .as_array()
        .ok_or_else(|| QueryError::malformed("$and/$or take an array"))?;
    items
        .iter()
        .map(|item| resolve_filter(schema, thing, item))
        .collect()
}

fn resolve_field(
    schema: &Schema,
    thing: &ThingDef,
    field: &str,
    value: &Json,
) -> QueryCompileResult<ResolvedFilter> {
    if let Some(data) = thing.data_field(field) {
        return Ok(ResolvedFilter::Data {
            storage_path: data.storage_path.clone(),
            op: resolve_op(value)?,
        });
    }

    if let Some(link) = thing.link_field(field) {
        let opposite = link
            .opposite_players
            .first()
            .ok_or_else(|| QueryError::unknown_field(&thing.name, field))?;
        let reach_role = match link.target {
            LinkTarget::Relation => None,
            LinkTarget::Role => Some(opposite.plays.clone()),
        };
        let child = match link.target {
            LinkTarget::Relation => schema.thing(&link.relation),
            LinkTarget::Role => schema.thing(&opposite.thing),
        }
        .ok_or_else(|| QueryError::UnknownThing(link.relation.clone()))?;
        let inner = resolve_linked_value(schema, child, value)?;
        return Ok(ResolvedFilter::Link {
            relation: link.relation.clone(),
            via_role: Some(link.plays.clone()),
            reach_role,
            inner,
        });
    }

    if let Some(role) = thing.role(field) {
        let player = role
            .player()
            .ok_or_else(|| QueryError::unknown_field(&thing.name, field))?;
        let child = schema
            .thing(&player.thing)
            .ok_or_else(|| QueryError::UnknownThing(player.thing.clone()))?;
        let inner = resolve_linked_value(schema, child, value)?;
        return Ok(ResolvedFilter::Link {
            relation: thing.name.clone(),
            via_role: None,
            reach_role: Some(role.name.clone()),
            inner,
        });
    }

    Err(QueryError::unknown_field(&thing.name, field))
}

/// The value side of a link/role predicate: an id (or id set), or a nested
/// filter object on the linked thing. `null` asserts absence.
fn resolve_linked_value(
    schema: &Schema,
    child: &ThingDef,
    value: &Json,
) -> QueryCompileResult<Option<Box<ResolvedFilter>>> {
    match value {
        Json::Null => Ok(None),
        Json::Object(_) => Ok(Some(Box::new(resolve_filter(schema, child, value)?))),
        Json::String(_) | Json::Array(_) => {
            let id_field = child
                .single_id_field()
                .ok_or_else(|| QueryError::CompositeIdUnsupported {
                    thing: child.name.clone(),
                })?;
            let storage = child
                .data_field(id_field)
                .map(|f| f.storage_path.clone())
                .unwrap_or_else(|| id_field.to_string());
            Ok(Some(Box::new(ResolvedFilter::Data {
                storage_path: storage,
                op: resolve_op(value)?,
            })))
        }
        _ => Err(QueryError::malformed("link filter values must be ids or objects")),
    }
}

fn resolve_op(value: &Json) -> QueryCompileResult<FilterOp> {
    match value {
        Json::Object(object) => {
            let (op, operand) = object
                .iter()
                .next()
                .ok_or_else(|| QueryError::malformed("empty operator object"))?;
            if object.len() > 1 {
                return Err(QueryError::malformed(
                    "one operator per field predicate",
                ));
            }
            match op.as_str() {
                "$eq" => Ok(FilterOp::Eq(coerce(operand)?)),
                "$ne" => Ok(FilterOp::Ne(coerce(operand)?)),
                "$in" => Ok(FilterOp::In(coerce_list(operand)?)),
                "$nin" => Ok(FilterOp::Nin(coerce_list(operand)?)),
                "$exists" => operand
                    .as_bool()
                    .map(FilterOp::Exists)
                    .ok_or_else(|| QueryError::malformed("$exists takes a boolean")),
                other => Err(QueryError::UnsupportedOperator(other.to_string())),
            }
        }
        // Implicit array = $in, implicit scalar = $eq.
        Json::Array(_) => Ok(FilterOp::In(coerce_list(value)?)),
        _ => Ok(FilterOp::Eq(coerce(value)?)),
    }
}

fn coerce(value: &Json) -> QueryCompileResult<DataValue> {
    DataValue::from_json(value).map_err(|e| QueryError::malformed(e.to_string()))
}

fn coerce_list(value: &Json) -> QueryCompileResult<Vec<DataValue>> {
    let items = value
        .as_array()
        .ok_or_else(|| QueryError::malformed("$in/$nin take an array"))?;
    items.iter().map(coerce).collect()
}

/// Render a resolved filter as statement predicates against `subject`.
/// Appends one line per predicate to `out`.
pub fn compile_filter(filter: &ResolvedFilter, subject: &str, vars: &mut VarGen, out: &mut Vec<String>) {
    match filter {
        ResolvedFilter::And(parts) => {
            for part in parts {
                compile_filter(part, subject, vars, out);
            }
        }
        ResolvedFilter::Or(parts) => {
            let branches: Vec<String> = parts
                .iter()
                .map(|part| {
                    let mut inner = Vec::new();
                    compile_filter(part, subject, vars, &mut inner);
                    format!("{{ {} }}", inner.join(" "))
                })
                .collect();
            out.push(format!("{};", branches.join(" or ")));
        }
        ResolvedFilter::Not(part) => {
            let mut inner = Vec::new();
            compile_filter(part, subject, vars, &mut inner);
            out.push(format!("not {{ {} }};", inner.join(" ")));
        }
        ResolvedFilter::Data { storage_path, op } => compile_data(storage_path, op, subject, vars, out),
        ResolvedFilter::Link {
            relation,
            via_role,
            reach_role,
            inner,
        } => {
            let target = vars.fresh();
            match (via_role, reach_role) {
                (Some(via), Some(reach)) => {
                    out.push(format!(
                        "({via}: {subject}, {reach}: {target}) isa {relation};"
                    ));
                }
                (Some(via), None) => {
                    out.push(format!("{target} ({via}: {subject}) isa {relation};"));
                }
                (None, Some(reach)) => {
                    out.push(format!("{subject} ({reach}: {target});"));
                }
                (None, None) => {
                    out.push(format!("{target} isa {relation};"));
                }
            }
            if let Some(inner) = inner {
                compile_filter(inner, &target, vars, out);
            }
        }
    }
}

fn compile_data(storage_path: &str, op: &FilterOp, subject: &str, vars: &mut VarGen, out: &mut Vec<String>) {
    match op {
        FilterOp::Eq(value) => {
            out.push(format!("{subject} has {storage_path} {};", value.to_literal()));
        }
        FilterOp::Ne(value) => {
            let var = vars.fresh();
            out.push(format!("{subject} has {storage_path} {var};"));
            out.push(format!("{var} != {};", value.to_literal()));
        }
        FilterOp::In(values) => {
            let var = vars.fresh();
            out.push(format!("{subject} has {storage_path} {var};"));
            let branches: Vec<String> = values
                .iter()
                .map(|value| format!("{{ {var} == {}; }}", value.to_literal()))
                .collect();
            out.push(format!("{};", branches.join(" or ")));
        }
        FilterOp::Nin(values) => {
            let branches: Vec<String> = values
                .iter()
                .map(|value| format!("{{ {subject} has {storage_path} {}; }}", value.to_literal()))
                .collect();
            out.push(format!("not {{ {}; }};", branches.join(" or ")));
        }
        FilterOp::Exists(true) => {
            let var = vars.fresh();
            out.push(format!("{subject} has {storage_path} {var};"));
        }
        FilterOp::Exists(false) => {
            let var = vars.fresh();
            out.push(format!("not {{ {subject} has {storage_path} {var}; }};"));
        }
    }
}
