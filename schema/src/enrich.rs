//! Schema enrichment.
//!
//! Pure function from a declared schema to its resolved form:
//!
//! 1. Inheritance flattening: every thing absorbs its ancestors' id fields,
//!    data fields, link fields and (for relations) roles, skipping anything
//!    overridden locally. Inherited data fields keep the storage path of the
//!    originally declaring ancestor.
//! 2. Link resolution: every role learns which link fields fill it
//!    (`played_by`), and every link field learns who sits on the other side
//!    (`opposite_players`).
//!
//! Enrichment is idempotent: the resolution fields are recomputed from the
//! declarations, so running it on its own output changes nothing.

use crate::{
    LinkTarget, PlayedBy, Schema, SchemaError, SchemaResult, ThingDef,
};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Enrich a schema in place and return it.
pub fn enrich_schema(mut schema: Schema) -> SchemaResult<Schema> {
    let order = inheritance_order(&schema)?;
    flatten_inheritance(&mut schema, &order);
    resolve_links(&mut schema)?;
    Ok(schema)
}

/// Thing names ordered parents-first, with cycle and unknown-parent
/// detection. Also rejects roles declared on entities.
fn inheritance_order(schema: &Schema) -> SchemaResult<Vec<String>> {
    let mut depths: Vec<(String, usize)> = Vec::new();
    for (name, thing) in &schema.things {
        if !thing.is_relation() && !thing.roles.is_empty() {
            return Err(SchemaError::RolesOnEntity(name.clone()));
        }
        depths.push((name.clone(), ancestry(schema, name)?.len()));
    }
    depths.sort_by_key(|(_, depth)| *depth);
    Ok(depths.into_iter().map(|(name, _)| name).collect())
}

/// Walk the `extends` chain of one thing, nearest ancestor first.
fn ancestry(schema: &Schema, name: &str) -> SchemaResult<Vec<String>> {
    let mut chain = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(name.to_string());

    let mut current = schema
        .thing(name)
        .ok_or_else(|| SchemaError::UnknownThing(name.to_string()))?
        .extends
        .clone();

    while let Some(parent) = current {
        if !seen.insert(parent.clone()) {
            return Err(SchemaError::InheritanceCycle(name.to_string()));
        }
        let parent_def =
            schema
                .thing(&parent)
                .ok_or_else(|| SchemaError::UnknownParent {
                    thing: name.to_string(),
                    parent: parent.clone(),
                })?;
        chain.push(parent.clone());
        current = parent_def.extends.clone();
    }
    Ok(chain)
}

/// Merge each thing's direct parent into it, parents-first, so the parent is
/// already fully flattened when the child absorbs it.
fn flatten_inheritance(schema: &mut Schema, order: &[String]) {
    for name in order {
        let parent_name = match schema.things[name.as_str()].extends.clone() {
            Some(p) => p,
            None => {
                schema.things[name.as_str()].all_extends = Vec::new();
                continue;
            }
        };
        let parent = schema.things[parent_name.as_str()].clone();
        let child = &mut schema.things[name.as_str()];
        merge_parent(child, &parent);
    }
}

fn merge_parent(child: &mut ThingDef, parent: &ThingDef) {
    child.all_extends = std::iter::once(parent.name.clone())
        .chain(parent.all_extends.iter().cloned())
        .collect();

    for path in &parent.id_fields {
        if !child.id_fields.contains(path) {
            child.id_fields.push(path.clone());
        }
    }

    for (path, field) in &parent.data_fields {
        if !child.data_fields.contains_key(path) {
            let mut inherited = field.clone();
            // The parent's copy already points at the original declarer when
            // the parent inherited it in turn.
            inherited.inherited_from = Some(
                field
                    .inherited_from
                    .clone()
                    .unwrap_or_else(|| parent.name.clone()),
            );
            child.data_fields.insert(path.clone(), inherited);
        }
    }

    for (path, field) in &parent.link_fields {
        if !child.link_fields.contains_key(path) {
            let mut inherited = field.clone();
            inherited.inherited_from = Some(
                field
                    .inherited_from
                    .clone()
                    .unwrap_or_else(|| parent.name.clone()),
            );
            child.link_fields.insert(path.clone(), inherited);
        }
    }

    if child.is_relation() {
        for (role_name, role) in &parent.roles {
            if !child.roles.contains_key(role_name) {
                let mut inherited = role.clone();
                inherited.inherited_from = Some(
                    role.inherited_from
                        .clone()
                        .unwrap_or_else(|| parent.name.clone()),
                );
                child.roles.insert(role_name.clone(), inherited);
            }
        }
    }
}

/// Resolve `played_by` on every role and `opposite_players` on every link
/// field, schema-wide.
fn resolve_links(schema: &mut Schema) -> SchemaResult<()> {
    // Phase 1: collect every link field, tagged with its originally
    // declaring thing. Inherited copies collapse onto the declarer, which is
    // what keeps roles exclusive to one distinct thing under inheritance.
    let mut players: IndexMap<(String, String), Vec<PlayedBy>> = IndexMap::new();
    for (thing_name, thing) in &schema.things {
        for field in thing.link_fields.values() {
            let relation = schema.thing(&field.relation).filter(|t| t.is_relation()).ok_or_else(
                || SchemaError::UnknownRelation {
                    thing: thing_name.clone(),
                    field: field.path.clone(),
                    relation: field.relation.clone(),
                },
            )?;
            if relation.role(&field.plays).is_none() {
                return Err(SchemaError::UnknownRole {
                    thing: thing_name.clone(),
                    field: field.path.clone(),
                    relation: field.relation.clone(),
                    role: field.plays.clone(),
                });
            }
            let declarer = field
                .inherited_from
                .clone()
                .unwrap_or_else(|| thing_name.clone());
            let entry = PlayedBy {
                thing: declarer,
                path: field.path.clone(),
                relation: field.relation.clone(),
                plays: field.plays.clone(),
                target: field.target,
                cardinality: field.cardinality,
            };
            let slot = players
                .entry((field.relation.clone(), field.plays.clone()))
                .or_default();
            if !slot.contains(&entry) {
                slot.push(entry);
            }
        }
    }

    // Phase 2: write played_by into roles, enforcing per-thing exclusivity.
    let relation_names: Vec<String> = schema
        .relations()
        .map(|relation| relation.name.clone())
        .collect();
    for relation_name in &relation_names {
        let role_names: Vec<String> = schema.things[relation_name.as_str()]
            .roles
            .keys()
            .cloned()
            .collect();
        for role_name in role_names {
            let filled = players
                .get(&(relation_name.clone(), role_name.clone()))
                .cloned()
                .unwrap_or_default();
            if filled.is_empty() {
                return Err(SchemaError::UnplayedRole {
                    relation: relation_name.clone(),
                    role: role_name,
                });
            }
            let mut distinct: Vec<String> = Vec::new();
            for player in &filled {
                if !distinct.contains(&player.thing) {
                    distinct.push(player.thing.clone());
                }
            }
            if distinct.len() > 1 {
                return Err(SchemaError::AmbiguousRole {
                    relation: relation_name.clone(),
                    role: role_name,
                    players: distinct,
                });
            }
            schema.things[relation_name.as_str()]
                .roles[role_name.as_str()]
                .played_by = filled;
        }
    }

    // Phase 3: opposite players per link field. Relation targets bind the
    // relation itself; role targets gather every other role's players,
    // narrowed by the field's static filter.
    let thing_names: Vec<String> = schema.things.keys().cloned().collect();
    for thing_name in &thing_names {
        let field_paths: Vec<String> = schema.things[thing_name.as_str()]
            .link_fields
            .keys()
            .cloned()
            .collect();
        for field_path in field_paths {
            let field = schema.things[thing_name.as_str()].link_fields[field_path.as_str()].clone();
            let opposites = match field.target {
                LinkTarget::Relation => vec![PlayedBy {
                    thing: field.relation.clone(),
                    path: field.relation.clone(),
                    relation: field.relation.clone(),
                    plays: String::new(),
                    target: LinkTarget::Relation,
                    cardinality: field.cardinality,
                }],
                LinkTarget::Role => {
                    let relation = &schema.things[field.relation.as_str()];
                    let mut gathered = Vec::new();
                    for (role_name, role) in &relation.roles {
                        if role_name == &field.plays {
                            continue;
                        }
                        for player in &role.played_by {
                            let passes = field
                                .filter
                                .as_ref()
                                .map(|f| f.matches(player))
                                .unwrap_or(true);
                            if passes && !gathered.contains(player) {
                                gathered.push(player.clone());
                            }
                        }
                    }
                    if gathered.is_empty() {
                        return Err(SchemaError::NoOpposite {
                            thing: thing_name.clone(),
                            field: field_path.clone(),
                        });
                    }
                    gathered
                }
            };
            schema.things[thing_name.as_str()]
                .link_fields[field_path.as_str()]
                .opposite_players = opposites;
        }
    }

    Ok(())
}
