//! Mutation enrichment.
//!
//! Walks the inbound desired-state document into a [`MutationTree`]: thing
//! selectors normalize, every node gets a handle, data values coerce to
//! their declared content (JSON content serializes to strings), operations
//! are inferred where `$op` is absent, and the request-validation table is
//! enforced. Traversal passes an immutable context down; nodes are never
//! annotated after construction.

use crate::{MutNode, MutationError, MutationResult, MutationTree, Op};
use graft_core::{DataValue, HandleAllocator, RequestPath};
use graft_query::IdSelector;
use graft_schema::{Cardinality, ContentKind, DataFieldDef, DefaultValue, LinkTarget, Schema, ThingDef};
use indexmap::IndexMap;
use regex_lite::Regex;
use serde_json::{Map, Value as Json};

/// Traversal context, rebuilt (not mutated) at every step down.
#[derive(Clone, Copy)]
struct Ctx<'a> {
    schema: &'a Schema,
    parent_op: Option<Op>,
}

/// Enrich a mutation document.
pub fn enrich_mutation(
    schema: &Schema,
    request: &Json,
    alloc: &mut HandleAllocator,
) -> MutationResult<MutationTree> {
    let roots: Vec<&Json> = match request {
        Json::Array(items) => items.iter().collect(),
        Json::Object(_) => vec![request],
        _ => {
            return Err(MutationError::malformed(
                "mutation must be an object or array",
            ))
        }
    };

    let mut tree = MutationTree::default();
    for root in roots {
        let object = root
            .as_object()
            .ok_or_else(|| MutationError::malformed("mutation entries must be objects"))?;
        let thing = root_thing(schema, object)?;
        let ctx = Ctx {
            schema,
            parent_op: None,
        };
        tree.roots.push(enrich_node(
            thing,
            object,
            ctx,
            RequestPath::root(),
            alloc,
        )?);
    }
    Ok(tree)
}

fn root_thing<'a>(schema: &'a Schema, object: &Map<String, Json>) -> MutationResult<&'a ThingDef> {
    let (name, relation_selector) = if let Some(name) = object.get("$entity") {
        (name, false)
    } else if let Some(name) = object.get("$relation") {
        (name, true)
    } else if let Some(name) = object.get("$thing") {
        let is_relation = object
            .get("$thingType")
            .and_then(Json::as_str)
            .map(|t| t == "relation")
            .unwrap_or(false);
        (name, is_relation)
    } else {
        return Err(MutationError::malformed(
            "mutation needs $entity, $relation or $thing",
        ));
    };
    let name = name
        .as_str()
        .ok_or_else(|| MutationError::malformed("thing selector must be a string"))?;
    let thing = schema
        .thing(name)
        .ok_or_else(|| MutationError::UnknownThing(name.to_string()))?;
    if thing.is_relation() != relation_selector {
        return Err(MutationError::malformed(format!(
            "{name} is a {}, selected with the wrong key",
            thing.kind
        )));
    }
    Ok(thing)
}

const NODE_KEYS: &[&str] = &[
    "$entity",
    "$relation",
    "$thing",
    "$thingType",
    "$op",
    "$id",
    "$tempId",
    "$filter",
];

fn enrich_node(
    thing: &ThingDef,
    object: &Map<String, Json>,
    ctx: Ctx<'_>,
    path: RequestPath,
    alloc: &mut HandleAllocator,
) -> MutationResult<MutNode> {
    for key in object.keys() {
        if key.starts_with('$') && !NODE_KEYS.contains(&key.as_str()) {
            return Err(MutationError::malformed(format!("unknown key {key}")));
        }
    }

    let id = parse_id(object.get("$id"))?;
    let temp_id = parse_temp_id(object.get("$tempId"))?;
    let filter = object.get("$filter").cloned();
    let explicit = object
        .get("$op")
        .map(|op| {
            op.as_str()
                .ok_or_else(|| MutationError::malformed("$op must be a string"))
                .and_then(Op::parse)
        })
        .transpose()?;

    // Data fields first; the inferred operation depends on them.
    let mut data: IndexMap<String, DataValue> = IndexMap::new();
    for (key, value) in object {
        if key.starts_with('$') {
            continue;
        }
        if let Some(field) = thing.data_field(key) {
            data.insert(key.clone(), coerce_data(thing, field, value)?);
        }
    }

    let op = infer_op(explicit, &id, &filter, &temp_id, &data, object)?;
    validate_op(thing, op, explicit.is_some(), &id, &data, ctx.parent_op)?;

    if op == Op::Create {
        apply_defaults(thing, &mut data);
        check_required(thing, &data)?;
        check_create_id(thing, &data, &temp_id)?;
    }
    check_rules(thing, &data)?;

    // Children second, in the context of this node's operation.
    let mut children: IndexMap<String, Vec<MutNode>> = IndexMap::new();
    for (key, value) in object {
        if key.starts_with('$') || thing.data_field(key).is_some() {
            continue;
        }
        let child_ctx = Ctx {
            parent_op: Some(op),
            ..ctx
        };
        let child_path = path.child(key);
        if let Some(link) = thing.link_field(key) {
            if link.cardinality == Cardinality::One {
                if let Json::Array(items) = value {
                    if items.len() > 1 {
                        return Err(MutationError::CardinalityOneArray {
                            thing: thing.name.clone(),
                            field: key.clone(),
                        });
                    }
                }
            }
            let child_thing = match link.target {
                LinkTarget::Relation => link.relation.clone(),
                LinkTarget::Role => link
                    .opposite_players
                    .first()
                    .map(|p| p.thing.clone())
                    .ok_or_else(|| MutationError::unknown_field(&thing.name, key))?,
            };
            let child_def = ctx
                .schema
                .thing(&child_thing)
                .ok_or_else(|| MutationError::UnknownThing(child_thing.clone()))?;
            children.insert(
                key.clone(),
                enrich_children(child_def, value, child_ctx, child_path, alloc)?,
            );
            continue;
        }
        if let Some(role) = thing.role(key) {
            let player = role
                .player()
                .ok_or_else(|| MutationError::unknown_field(&thing.name, key))?;
            let child_def = ctx
                .schema
                .thing(&player.thing)
                .ok_or_else(|| MutationError::UnknownThing(player.thing.clone()))?;
            children.insert(
                key.clone(),
                enrich_children(child_def, value, child_ctx, child_path, alloc)?,
            );
            continue;
        }
        return Err(MutationError::unknown_field(&thing.name, key));
    }

    if op == Op::Delete && (!data.is_empty() || !children.is_empty()) {
        return Err(MutationError::FieldsOnDelete);
    }

    Ok(MutNode {
        handle: alloc.node(),
        thing: thing.name.clone(),
        kind: thing.kind,
        op,
        explicit_op: explicit.is_some(),
        id,
        temp_id,
        filter,
        data,
        children,
        path,
        synth: None,
    })
}

/// Parse the value side of a link field or role: an object, an array of
/// objects and id strings, a bare id string, or `null` (unlink everything).
fn enrich_children(
    thing: &ThingDef,
    value: &Json,
    ctx: Ctx<'_>,
    path: RequestPath,
    alloc: &mut HandleAllocator,
) -> MutationResult<Vec<MutNode>> {
    let entries: Vec<&Json> = match value {
        Json::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    let mut nodes = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            Json::Object(object) => {
                nodes.push(enrich_node(thing, object, ctx, path.clone(), alloc)?);
            }
            Json::String(id) => nodes.push(shorthand_node(thing, Some(id.clone()), ctx, &path, alloc)?),
            Json::Null => nodes.push(shorthand_unlink_all(thing, ctx, &path, alloc)?),
            _ => {
                return Err(MutationError::malformed(
                    "linked values must be objects, id strings or null",
                ))
            }
        }
    }
    Ok(nodes)
}

/// A bare id under a link field means "link this existing instance".
fn shorthand_node(
    thing: &ThingDef,
    id: Option<String>,
    ctx: Ctx<'_>,
    path: &RequestPath,
    alloc: &mut HandleAllocator,
) -> MutationResult<MutNode> {
    validate_op(
        thing,
        Op::Link,
        false,
        &id.clone().map(IdSelector::One),
        &IndexMap::new(),
        ctx.parent_op,
    )?;
    Ok(MutNode {
        handle: alloc.node(),
        thing: thing.name.clone(),
        kind: thing.kind,
        op: Op::Link,
        explicit_op: false,
        id: id.map(IdSelector::One),
        temp_id: None,
        filter: None,
        data: IndexMap::new(),
        children: IndexMap::new(),
        path: path.clone(),
        synth: None,
    })
}

/// A `null` under a link field means "unlink whatever is currently there".
fn shorthand_unlink_all(
    thing: &ThingDef,
    ctx: Ctx<'_>,
    path: &RequestPath,
    alloc: &mut HandleAllocator,
) -> MutationResult<MutNode> {
    if ctx.parent_op == Some(Op::Create) {
        return Err(MutationError::IllegalOpUnderCreate {
            op: Op::Unlink.as_str().to_string(),
        });
    }
    Ok(MutNode {
        handle: alloc.node(),
        thing: thing.name.clone(),
        kind: thing.kind,
        op: Op::Unlink,
        explicit_op: true,
        id: None,
        temp_id: None,
        filter: None,
        data: IndexMap::new(),
        children: IndexMap::new(),
        path: path.clone(),
        synth: None,
    })
}

fn parse_id(value: Option<&Json>) -> MutationResult<Option<IdSelector>> {
    match value {
        None | Some(Json::Null) => Ok(None),
        Some(Json::String(id)) => Ok(Some(IdSelector::One(id.clone()))),
        Some(Json::Array(items)) => {
            let ids = items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| MutationError::malformed("$id array entries must be strings"))
                })
                .collect::<MutationResult<Vec<_>>>()?;
            Ok(Some(IdSelector::Many(ids)))
        }
        Some(_) => Err(MutationError::malformed("$id must be a string or array")),
    }
}

fn parse_temp_id(value: Option<&Json>) -> MutationResult<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let text = value
        .as_str()
        .ok_or_else(|| MutationError::MalformedTempId(value.to_string()))?;
    if text.is_empty() || text.contains('.') || text.contains('|') {
        return Err(MutationError::MalformedTempId(text.to_string()));
    }
    Ok(Some(text.to_string()))
}

/// `getOp`: explicit `$op` wins; else a node with an id or filter is an
/// update when it touches data and a link otherwise; a temp-id node is a
/// create when it carries anything and a link reference when bare; plain
/// nodes create.
fn infer_op(
    explicit: Option<Op>,
    id: &Option<IdSelector>,
    filter: &Option<Json>,
    temp_id: &Option<String>,
    data: &IndexMap<String, DataValue>,
    object: &Map<String, Json>,
) -> MutationResult<Op> {
    if let Some(op) = explicit {
        return Ok(op);
    }
    if id.is_some() || filter.is_some() {
        if data.is_empty() {
            return Ok(Op::Link);
        }
        return Ok(Op::Update);
    }
    if temp_id.is_some() {
        let touches_anything = !data.is_empty()
            || object
                .keys()
                .any(|key| !key.starts_with('$'));
        if touches_anything {
            return Ok(Op::Create);
        }
        return Ok(Op::Link);
    }
    Ok(Op::Create)
}

/// The illegal-`$op`-combination table.
fn validate_op(
    thing: &ThingDef,
    op: Op,
    explicit: bool,
    id: &Option<IdSelector>,
    data: &IndexMap<String, DataValue>,
    parent_op: Option<Op>,
) -> MutationResult<()> {
    if explicit && op == Op::Create && id.is_some() {
        return Err(MutationError::IdWriteOnCreate);
    }
    if parent_op == Some(Op::Create) {
        match op {
            Op::Update | Op::Delete | Op::Unlink | Op::Replace => {
                return Err(MutationError::IllegalOpUnderCreate {
                    op: op.as_str().to_string(),
                });
            }
            Op::Create | Op::Link | Op::Match => {}
        }
    }
    match op {
        Op::Link | Op::Unlink | Op::Replace | Op::Match => {
            if let Some(field) = data.keys().next() {
                return Err(MutationError::DataOnLinkOp {
                    field: field.clone(),
                    op: op.as_str().to_string(),
                });
            }
        }
        Op::Create | Op::Update | Op::Delete => {}
    }
    let _ = thing;
    Ok(())
}

fn coerce_data(
    thing: &ThingDef,
    field: &DataFieldDef,
    value: &Json,
) -> MutationResult<DataValue> {
    if value.is_null() {
        return Ok(DataValue::Null);
    }
    // JSON-valued fields ride as serialized strings from here on.
    if field.content == ContentKind::Json {
        let text = serde_json::to_string(value)
            .map_err(|e| MutationError::invalid_value(&thing.name, &field.path, e.to_string()))?;
        return Ok(DataValue::String(text));
    }
    match (field.cardinality, value) {
        (Cardinality::Many, Json::Array(items)) => {
            let values = items
                .iter()
                .map(|item| coerce_scalar(thing, field, item))
                .collect::<MutationResult<Vec<_>>>()?;
            Ok(DataValue::List(values))
        }
        (Cardinality::One, Json::Array(_)) => Err(MutationError::CardinalityOneArray {
            thing: thing.name.clone(),
            field: field.path.clone(),
        }),
        (_, scalar) => coerce_scalar(thing, field, scalar),
    }
}

fn coerce_scalar(
    thing: &ThingDef,
    field: &DataFieldDef,
    value: &Json,
) -> MutationResult<DataValue> {
    DataValue::from_json(value)
        .map_err(|e| MutationError::invalid_value(&thing.name, &field.path, e.to_string()))
}

/// Fill absent fields from their defaults, literals first so derived-value
/// functions can read them.
fn apply_defaults(thing: &ThingDef, data: &mut IndexMap<String, DataValue>) {
    for field in thing.data_fields.values() {
        if field.is_virtual || data.contains_key(&field.path) {
            continue;
        }
        if let Some(DefaultValue::Literal(value)) = &field.default {
            data.insert(field.path.clone(), value.clone());
        }
    }
    for field in thing.data_fields.values() {
        if field.is_virtual || data.contains_key(&field.path) {
            continue;
        }
        if let Some(DefaultValue::Computed(derive)) = &field.default {
            let value = derive(data);
            data.insert(field.path.clone(), value);
        }
    }
}

fn check_required(thing: &ThingDef, data: &IndexMap<String, DataValue>) -> MutationResult<()> {
    for field in thing.data_fields.values() {
        if !field.validations.required || field.is_virtual {
            continue;
        }
        let present = data.get(&field.path).map(|v| !v.is_null()).unwrap_or(false);
        if !present {
            return Err(MutationError::MissingRequired {
                thing: thing.name.clone(),
                field: field.path.clone(),
            });
        }
    }
    Ok(())
}

/// A create must end up with an id value when the thing has an id field.
fn check_create_id(
    thing: &ThingDef,
    data: &IndexMap<String, DataValue>,
    temp_id: &Option<String>,
) -> MutationResult<()> {
    if thing.id_fields.is_empty() {
        return Ok(());
    }
    let supplied = thing
        .id_fields
        .iter()
        .all(|field| data.get(field).map(|v| !v.is_null()).unwrap_or(false));
    if !supplied && temp_id.is_none() {
        return Err(MutationError::CreateWithoutId {
            thing: thing.name.clone(),
        });
    }
    Ok(())
}

/// Pattern and allowed-value rules over whatever data the request supplied.
fn check_rules(thing: &ThingDef, data: &IndexMap<String, DataValue>) -> MutationResult<()> {
    for (path, value) in data {
        let Some(field) = thing.data_field(path) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let scalars: Vec<&DataValue> = match value {
            DataValue::List(items) => items.iter().collect(),
            single => vec![single],
        };
        if let Some(pattern) = &field.validations.pattern {
            let regex = Regex::new(pattern).map_err(|e| {
                MutationError::invalid_value(&thing.name, path, format!("bad pattern: {e}"))
            })?;
            for scalar in &scalars {
                if let Some(text) = scalar.as_str() {
                    if !regex.is_match(text) {
                        return Err(MutationError::PatternViolation {
                            thing: thing.name.clone(),
                            field: path.clone(),
                            pattern: pattern.clone(),
                        });
                    }
                }
            }
        }
        if let Some(allowed) = &field.validations.allowed_values {
            for scalar in &scalars {
                if !allowed.contains(scalar) {
                    return Err(MutationError::NotAllowedValue {
                        thing: thing.name.clone(),
                        field: path.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}
