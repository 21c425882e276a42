//! Query enrichment.
//!
//! Normalizes a parsed request against the schema: the thing selector is
//! checked, `$id` folds into the filter under the thing's id field, and the
//! field selection becomes a tree of typed descriptors (data/link/role),
//! each carrying its display alias, storage path, cardinality, defaulted
//! nested selections, and the dot-path by which it was reached in the
//! original request. That recorded path is what lets the post-hook walk
//! find its selection again without a second schema traversal.

use crate::{
    resolve_filter, FilterOp, IdSelector, QueryCompileResult, QueryError, QueryRequest,
    ResolvedFilter, SortKey,
};
use graft_core::RequestPath;
use graft_schema::{
    Cardinality, ContentKind, DefaultValue, LinkTarget, Schema, ThingDef, ThingKind,
};

/// A fully resolved query, ready for statement building.
#[derive(Debug, Clone)]
pub struct EnrichedQuery {
    pub thing: String,
    pub kind: ThingKind,
    pub filter: Option<ResolvedFilter>,
    /// Collapse the whole result to one object (scalar `$id` request).
    pub filter_by_unique: bool,
    pub selections: Vec<Selection>,
    pub excluded: Vec<String>,
    pub sort: Vec<ResolvedSort>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

/// One sort key resolved to its storage path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSort {
    pub storage_path: String,
    pub desc: bool,
}

/// One requested field, resolved.
#[derive(Debug, Clone)]
pub enum Selection {
    Data(DataSelection),
    Link(LinkSelection),
    Role(RoleSelection),
}

impl Selection {
    /// The recorded request path of this selection.
    pub fn request_path(&self) -> &RequestPath {
        match self {
            Selection::Data(s) => &s.request_path,
            Selection::Link(s) => &s.request_path,
            Selection::Role(s) => &s.request_path,
        }
    }

    /// The display alias of this selection.
    pub fn alias(&self) -> &str {
        match self {
            Selection::Data(s) => &s.alias,
            Selection::Link(s) => &s.alias,
            Selection::Role(s) => &s.alias,
        }
    }
}

/// A requested data field.
#[derive(Debug, Clone)]
pub struct DataSelection {
    pub path: String,
    pub alias: String,
    pub storage_path: String,
    pub content: ContentKind,
    pub cardinality: Cardinality,
    /// This is an id field of its thing.
    pub is_id: bool,
    /// Auto-added id: surfaced as `$id` metadata only, not as a plain field.
    pub id_added: bool,
    /// Never fetched; produced by the derived-value function in post-hooks.
    pub is_virtual: bool,
    /// Default carried along for the post-hook computation.
    pub default: Option<DefaultValue>,
    pub request_path: RequestPath,
}

impl DataSelection {
    /// The fetch key under which this field's block is emitted and decoded.
    pub fn fetch_key(&self) -> crate::FetchKey {
        crate::FetchKey {
            path: self.request_path.clone(),
            alias: self.alias.clone(),
            cardinality: self.cardinality,
            just_id: false,
            id_added: self.id_added,
            scalar: true,
        }
    }
}

/// A requested link field, with its resolved far side.
#[derive(Debug, Clone)]
pub struct LinkSelection {
    pub path: String,
    pub alias: String,
    /// Relation joining the subject to the target.
    pub relation: String,
    /// Role the subject plays in it.
    pub plays: String,
    /// Role reached on the far side; `None` when the field targets the
    /// relation instance itself.
    pub reach: Option<String>,
    /// The thing the child nodes are instances of.
    pub child_thing: String,
    pub cardinality: Cardinality,
    pub filter: Option<ResolvedFilter>,
    pub just_id: bool,
    pub selections: Vec<Selection>,
    pub excluded: Vec<String>,
    pub request_path: RequestPath,
}

impl LinkSelection {
    /// The fetch key under which this field's block is emitted and decoded.
    pub fn fetch_key(&self) -> crate::FetchKey {
        crate::FetchKey {
            path: self.request_path.clone(),
            alias: self.alias.clone(),
            cardinality: self.cardinality,
            just_id: self.just_id,
            id_added: false,
            scalar: false,
        }
    }
}

/// A requested role of a relation.
#[derive(Debug, Clone)]
pub struct RoleSelection {
    pub path: String,
    pub alias: String,
    /// The relation is the subject itself.
    pub relation: String,
    pub role: String,
    pub child_thing: String,
    pub cardinality: Cardinality,
    pub filter: Option<ResolvedFilter>,
    pub just_id: bool,
    pub selections: Vec<Selection>,
    pub excluded: Vec<String>,
    pub request_path: RequestPath,
}

impl RoleSelection {
    /// The fetch key under which this role's block is emitted and decoded.
    pub fn fetch_key(&self) -> crate::FetchKey {
        crate::FetchKey {
            path: self.request_path.clone(),
            alias: self.alias.clone(),
            cardinality: self.cardinality,
            just_id: self.just_id,
            id_added: false,
            scalar: false,
        }
    }
}

/// Enrich a batch of parsed requests.
pub fn enrich_batch(
    schema: &Schema,
    requests: &[QueryRequest],
) -> QueryCompileResult<Vec<EnrichedQuery>> {
    requests
        .iter()
        .map(|request| enrich_query(schema, request))
        .collect()
}

/// Enrich one parsed request.
pub fn enrich_query(schema: &Schema, request: &QueryRequest) -> QueryCompileResult<EnrichedQuery> {
    let thing = schema
        .thing(&request.thing)
        .ok_or_else(|| QueryError::UnknownThing(request.thing.clone()))?;
    if request.relation_selector != thing.is_relation() {
        return Err(QueryError::malformed(format!(
            "{} is a {}, selected with the wrong key",
            thing.name, thing.kind
        )));
    }

    let (filter, filter_by_unique) =
        fold_id_filter(schema, thing, request.id.as_ref(), request.filter.as_ref())?;

    let selections = build_selections(
        schema,
        thing,
        request.fields.as_deref(),
        false,
        &RequestPath::root(),
    )?;

    let mut sort = Vec::with_capacity(request.sort.len());
    for key in &request.sort {
        sort.push(resolve_sort(thing, key)?);
    }

    Ok(EnrichedQuery {
        thing: thing.name.clone(),
        kind: thing.kind,
        filter,
        filter_by_unique,
        selections,
        excluded: request.excluded_fields.clone(),
        sort,
        offset: request.offset,
        limit: request.limit,
    })
}

fn resolve_sort(thing: &ThingDef, key: &SortKey) -> QueryCompileResult<ResolvedSort> {
    let field = thing
        .data_field(&key.field)
        .ok_or_else(|| QueryError::unknown_field(&thing.name, &key.field))?;
    Ok(ResolvedSort {
        storage_path: field.storage_path.clone(),
        desc: key.desc,
    })
}

/// Fold `$id` into the filter under the thing's id field. A scalar id also
/// marks the query as filter-by-unique, collapsing the result to one object.
fn fold_id_filter(
    schema: &Schema,
    thing: &ThingDef,
    id: Option<&IdSelector>,
    raw_filter: Option<&serde_json::Value>,
) -> QueryCompileResult<(Option<ResolvedFilter>, bool)> {
    let base = raw_filter
        .map(|raw| resolve_filter(schema, thing, raw))
        .transpose()?;

    let Some(id) = id else {
        return Ok((base, false));
    };

    let id_field = thing
        .single_id_field()
        .ok_or_else(|| QueryError::CompositeIdUnsupported {
            thing: thing.name.clone(),
        })?;
    let storage = thing
        .data_field(id_field)
        .map(|field| field.storage_path.clone())
        .unwrap_or_else(|| id_field.to_string());

    let (op, unique) = match id {
        IdSelector::One(value) => (FilterOp::Eq(value.as_str().into()), true),
        IdSelector::Many(values) => (
            FilterOp::In(values.iter().map(|v| v.as_str().into()).collect()),
            false,
        ),
    };
    let id_part = ResolvedFilter::Data {
        storage_path: storage,
        op,
    };

    let folded = match base {
        Some(existing) => ResolvedFilter::And(vec![id_part, existing]),
        None => id_part,
    };
    Ok((Some(folded), unique))
}

/// Resolve a field-selector list into typed selections.
///
/// `None` defaults to every non-virtual, non-id data field plus the virtual
/// ones (filled by post-hooks). Id fields are always present; when they
/// were not explicitly requested they are flagged `id_added` so they only
/// surface as `$id` metadata.
fn build_selections(
    schema: &Schema,
    thing: &ThingDef,
    fields: Option<&[crate::FieldSelector]>,
    just_id: bool,
    path: &RequestPath,
) -> QueryCompileResult<Vec<Selection>> {
    let mut selections = Vec::new();

    if just_id {
        push_missing_ids(thing, path, &mut selections);
        return Ok(selections);
    }

    match fields {
        None => {
            for field in thing.data_fields.values() {
                if field.content == ContentKind::Id {
                    continue;
                }
                selections.push(Selection::Data(data_selection(thing, &field.path, None, false, path)?));
            }
        }
        Some(fields) => {
            for selector in fields {
                selections.push(resolve_selector(schema, thing, selector, path)?);
            }
        }
    }

    push_missing_ids(thing, path, &mut selections);
    Ok(selections)
}

/// Append `id_added` selections for any id field not explicitly requested.
fn push_missing_ids(thing: &ThingDef, path: &RequestPath, selections: &mut Vec<Selection>) {
    for id_field in &thing.id_fields {
        let already = selections.iter().any(|s| match s {
            Selection::Data(d) => &d.path == id_field,
            _ => false,
        });
        if !already {
            // Id fields exist by construction of `id_fields`.
            if let Ok(mut selection) = data_selection(thing, id_field, None, false, path) {
                selection.id_added = true;
                selections.push(Selection::Data(selection));
            }
        }
    }
}

fn data_selection(
    thing: &ThingDef,
    field_path: &str,
    alias: Option<&str>,
    id_added: bool,
    path: &RequestPath,
) -> QueryCompileResult<DataSelection> {
    let field = thing
        .data_field(field_path)
        .ok_or_else(|| QueryError::unknown_field(&thing.name, field_path))?;
    Ok(DataSelection {
        path: field.path.clone(),
        alias: alias.unwrap_or(&field.path).to_string(),
        storage_path: field.storage_path.clone(),
        content: field.content,
        cardinality: field.cardinality,
        is_id: field.content == ContentKind::Id,
        id_added,
        is_virtual: field.is_virtual,
        default: field.default.clone(),
        request_path: path.child(&field.path),
    })
}

fn resolve_selector(
    schema: &Schema,
    thing: &ThingDef,
    selector: &crate::FieldSelector,
    path: &RequestPath,
) -> QueryCompileResult<Selection> {
    let field_path = selector.path();

    if thing.data_field(field_path).is_some() {
        let alias = match selector {
            crate::FieldSelector::Nested(nested) => nested.alias.as_deref(),
            crate::FieldSelector::Path(_) => None,
        };
        return Ok(Selection::Data(data_selection(
            thing, field_path, alias, false, path,
        )?));
    }

    let nested_defaults;
    let nested = match selector {
        crate::FieldSelector::Nested(nested) => nested,
        crate::FieldSelector::Path(_) => {
            nested_defaults = crate::NestedSelector {
                path: field_path.to_string(),
                ..Default::default()
            };
            &nested_defaults
        }
    };
    let child_path = path.child(field_path);

    if let Some(link) = thing.link_field(field_path) {
        let opposite = link
            .opposite_players
            .first()
            .ok_or_else(|| QueryError::unknown_field(&thing.name, field_path))?;
        let (reach, child_thing) = match link.target {
            LinkTarget::Relation => (None, link.relation.clone()),
            LinkTarget::Role => (Some(opposite.plays.clone()), opposite.thing.clone()),
        };
        let child = schema
            .thing(&child_thing)
            .ok_or_else(|| QueryError::UnknownThing(child_thing.clone()))?;
        let (filter, _) = fold_id_filter(schema, child, nested.id.as_ref(), nested.filter.as_ref())?;
        let selections =
            build_selections(schema, child, nested.fields.as_deref(), nested.just_id, &child_path)?;
        return Ok(Selection::Link(LinkSelection {
            path: field_path.to_string(),
            alias: nested.alias.clone().unwrap_or_else(|| field_path.to_string()),
            relation: link.relation.clone(),
            plays: link.plays.clone(),
            reach,
            child_thing: child.name.clone(),
            cardinality: link.cardinality,
            filter,
            just_id: nested.just_id,
            selections,
            excluded: nested.excluded_fields.clone(),
            request_path: child_path,
        }));
    }

    if let Some(role) = thing.role(field_path) {
        let player = role
            .player()
            .ok_or_else(|| QueryError::unknown_field(&thing.name, field_path))?;
        let child = schema
            .thing(&player.thing)
            .ok_or_else(|| QueryError::UnknownThing(player.thing.clone()))?;
        let (filter, _) = fold_id_filter(schema, child, nested.id.as_ref(), nested.filter.as_ref())?;
        let selections =
            build_selections(schema, child, nested.fields.as_deref(), nested.just_id, &child_path)?;
        return Ok(Selection::Role(RoleSelection {
            path: field_path.to_string(),
            alias: nested.alias.clone().unwrap_or_else(|| field_path.to_string()),
            relation: thing.name.clone(),
            role: role.name.clone(),
            child_thing: child.name.clone(),
            cardinality: role.cardinality,
            filter,
            just_id: nested.just_id,
            selections,
            excluded: nested.excluded_fields.clone(),
            request_path: child_path,
        }));
    }

    Err(QueryError::unknown_field(&thing.name, field_path))
}
