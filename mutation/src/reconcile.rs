//! Reconciliation: mutation tree → flat node and edge writes.
//!
//! Walks the (split, intermediary-expanded) tree and emits two lists: one
//! node write per distinct thing instance, one edge write per relation
//! instance operation. Link/unlink/replace intents diff against the
//! pre-query path cache: desired ids not currently linked become implicit
//! links, currently linked ids missing from a replace set become implicit
//! unlinks, and everything already in the desired state produces zero
//! operations. All plan-level validation happens here, before any write
//! statement is built.
//!
//! Traversal context (the object-path chain, the parent's role) is passed
//! down each call; the tree itself is never annotated.

use crate::{
    EdgeOp, MutNode, MutationError, MutationResult, MutationTree, NodeOp, Op, PathCache,
};
use graft_core::{DataValue, EdgeHandle, HandleAllocator, MutationConfig, NodeHandle};
use graft_schema::{Cardinality, LinkFieldDef, LinkTarget, Schema, ThingDef, ThingKind};
use indexmap::IndexMap;
use std::collections::BTreeSet;

/// One write against a thing instance.
#[derive(Debug, Clone)]
pub struct NodeWrite {
    pub handle: NodeHandle,
    pub thing: String,
    pub op: NodeOp,
    /// Real id, when known before the write.
    pub id: Option<String>,
    /// Storage path of the id field used to match the instance.
    pub id_storage: Option<String>,
    pub temp_id: Option<String>,
    /// Data delta as (storage path, value) pairs.
    pub data: Vec<(String, DataValue)>,
}

/// How an edge write locates its relation instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeAnchor {
    /// A fresh relation instance; identity is the insert variable.
    New,
    /// An existing relation instance matched by id.
    ById { id: String, id_storage: String },
    /// An existing relation instance matched by its role bindings.
    ByRoles,
}

/// One write against a relation instance's role bindings.
#[derive(Debug, Clone)]
pub struct EdgeWrite {
    pub handle: EdgeHandle,
    pub relation: String,
    pub op: EdgeOp,
    pub anchor: EdgeAnchor,
    /// Role name → player handles. Array-valued slots union on merge.
    pub roles: IndexMap<String, Vec<NodeHandle>>,
    /// Attributes of a created relation instance.
    pub data: Vec<(String, DataValue)>,
    pub temp_id: Option<String>,
}

/// The reconciled write plan.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    pub nodes: Vec<NodeWrite>,
    pub edges: Vec<EdgeWrite>,
}

/// Reconcile a mutation tree into a write plan.
pub fn reconcile(
    schema: &Schema,
    tree: &MutationTree,
    cache: Option<&PathCache>,
    config: &MutationConfig,
    alloc: &mut HandleAllocator,
) -> MutationResult<ReconcilePlan> {
    let mut reconciler = Reconciler {
        schema,
        cache,
        config,
        alloc,
        nodes: Vec::new(),
        node_by_id: IndexMap::new(),
        edges: Vec::new(),
        temp_creators: IndexMap::new(),
        temp_refs: Vec::new(),
        create_ids: IndexMap::new(),
    };
    reconciler.collect_temp_creators(tree)?;
    for root in &tree.roots {
        let chain = reconciler.root_chain(root)?;
        reconciler.walk_thing(root, None, chain)?;
    }
    reconciler.finish()
}

struct Reconciler<'a> {
    schema: &'a Schema,
    cache: Option<&'a PathCache>,
    config: &'a MutationConfig,
    alloc: &'a mut HandleAllocator,
    nodes: Vec<NodeWrite>,
    /// Canonical node index per (thing, id), so an instance reached two
    /// ways binds once.
    node_by_id: IndexMap<(String, String), usize>,
    edges: Vec<EdgeWrite>,
    temp_creators: IndexMap<String, NodeHandle>,
    temp_refs: Vec<String>,
    create_ids: IndexMap<String, ()>,
}

/// How a relation node reached through a parent's link field binds back to
/// that parent.
struct ParentLink {
    parent: NodeHandle,
    plays: String,
}

impl<'a> Reconciler<'a> {
    fn collect_temp_creators(&mut self, tree: &MutationTree) -> MutationResult<()> {
        let mut duplicate = None;
        tree.visit(&mut |node| {
            if let (Some(temp), Op::Create) = (&node.temp_id, node.op) {
                if self
                    .temp_creators
                    .insert(temp.clone(), node.handle)
                    .is_some()
                {
                    duplicate = Some(temp.clone());
                }
            }
        });
        match duplicate {
            Some(temp) => Err(MutationError::DuplicateId(temp)),
            None => Ok(()),
        }
    }

    fn finish(self) -> MutationResult<ReconcilePlan> {
        for temp in &self.temp_refs {
            if !self.temp_creators.contains_key(temp) {
                return Err(MutationError::OrphanTempId(temp.clone()));
            }
        }
        Ok(ReconcilePlan {
            nodes: self.nodes,
            edges: self.edges,
        })
    }

    fn thing_def(&self, name: &str) -> MutationResult<&'a ThingDef> {
        self.schema
            .thing(name)
            .ok_or_else(|| MutationError::UnknownThing(name.to_string()))
    }

    fn root_chain(&self, root: &MutNode) -> MutationResult<Option<String>> {
        let thing = self.thing_def(&root.thing)?;
        Ok(self.instance_id(root, thing))
    }

    /// Walk one node. `chain` is this node's object path (parent id chain
    /// ending in its own id), when one exists. Returns the canonical handle
    /// other writes should reference.
    fn walk_thing(
        &mut self,
        node: &MutNode,
        parent_link: Option<ParentLink>,
        chain: Option<String>,
    ) -> MutationResult<NodeHandle> {
        match node.kind {
            ThingKind::Entity => self.walk_entity(node, chain),
            ThingKind::Relation => self.walk_relation(node, parent_link, chain),
        }
    }

    fn walk_entity(&mut self, node: &MutNode, chain: Option<String>) -> MutationResult<NodeHandle> {
        let thing = self.thing_def(&node.thing)?;
        let handle = self.emit_node(node, thing)?;

        for (key, children) in &node.children {
            let link = thing
                .link_field(key)
                .ok_or_else(|| MutationError::unknown_field(&thing.name, key))?
                .clone();
            self.walk_slot(handle, chain.as_deref(), key, &link, children)?;
        }
        Ok(handle)
    }

    fn walk_slot(
        &mut self,
        parent: NodeHandle,
        chain: Option<&str>,
        key: &str,
        link: &LinkFieldDef,
        children: &[MutNode],
    ) -> MutationResult<()> {
        match link.target {
            LinkTarget::Role => self.walk_role_slot(parent, chain, key, link, children),
            LinkTarget::Relation => self.walk_relation_slot(parent, chain, key, link, children),
        }
    }

    /// The diffing slot for a link field that reaches the opposite role's
    /// players through synthesized intermediaries.
    fn walk_role_slot(
        &mut self,
        parent: NodeHandle,
        chain: Option<&str>,
        key: &str,
        link: &LinkFieldDef,
        wrappers: &[MutNode],
    ) -> MutationResult<()> {
        let slot = chain.map(|chain| format!("{chain}.{key}"));
        let current: BTreeSet<String> = match (&self.cache, &slot) {
            (Some(cache), Some(slot)) => cache.linked(slot).cloned().unwrap_or_default(),
            _ => BTreeSet::new(),
        };
        let diffing = self.cache.is_some() && slot.is_some();

        let reach = wrappers
            .iter()
            .find_map(|w| w.synth.as_ref())
            .map(|via| via.reach.clone());

        let mut to_link: Vec<NodeHandle> = Vec::new();
        let mut to_unlink: Vec<NodeHandle> = Vec::new();
        let mut removed_ids: BTreeSet<String> = BTreeSet::new();
        let mut replace_desired: Option<BTreeSet<String>> = None;
        let mut replace_thing: Option<String> = None;

        for wrapper in wrappers {
            let via = wrapper
                .synth
                .as_ref()
                .ok_or_else(|| MutationError::malformed("slot child lost its intermediary"))?;
            let inner = wrapper
                .children
                .get(&via.reach)
                .and_then(|children| children.first())
                .ok_or_else(|| MutationError::malformed("intermediary lost its child"))?;
            let inner_id = inner.single_id().map(str::to_string);
            let inner_chain = match (&slot, &inner_id) {
                (Some(slot), Some(id)) => Some(format!("{slot}.{id}")),
                _ => None,
            };

            match wrapper.op {
                Op::Create => {
                    // A link intent: already-linked desired ids are zero ops.
                    if let Some(id) = &inner_id {
                        if diffing && current.contains(id) {
                            self.walk_thing(inner, None, inner_chain)?;
                            continue;
                        }
                    }
                    let handle = self.walk_thing(inner, None, inner_chain)?;
                    to_link.push(handle);
                }
                Op::Replace => {
                    if self.cache.is_none() {
                        return Err(MutationError::ReplaceWithoutPreQuery);
                    }
                    let id = inner_id.clone().ok_or_else(|| {
                        MutationError::malformed("replace targets must carry ids")
                    })?;
                    replace_desired
                        .get_or_insert_with(BTreeSet::new)
                        .insert(id.clone());
                    replace_thing = Some(inner.thing.clone());
                    if diffing && current.contains(&id) {
                        // Already in the desired state: zero operations.
                        continue;
                    }
                    let handle = self.walk_thing(inner, None, inner_chain)?;
                    to_link.push(handle);
                }
                Op::Unlink => match &inner_id {
                    Some(id) => {
                        if diffing && !current.contains(id) {
                            if self.config.ignore_nonexisting_things {
                                continue;
                            }
                            return Err(MutationError::MissingTarget {
                                field: key.to_string(),
                                id: id.clone(),
                            });
                        }
                        let handle = self.walk_thing(inner, None, inner_chain)?;
                        removed_ids.insert(id.clone());
                        to_unlink.push(handle);
                    }
                    None => {
                        // Unlink everything currently in the slot.
                        if !diffing {
                            return Err(MutationError::malformed(
                                "unlinking a whole field requires the pre-query",
                            ));
                        }
                        for id in &current {
                            let handle = self.phantom_match(&inner.thing, id)?;
                            removed_ids.insert(id.clone());
                            to_unlink.push(handle);
                        }
                    }
                },
                Op::Delete => {
                    let id = inner_id.clone().ok_or_else(|| {
                        MutationError::malformed("delete targets must carry ids")
                    })?;
                    if diffing && !current.contains(&id) {
                        if self.config.ignore_nonexisting_things {
                            continue;
                        }
                        return Err(MutationError::MissingTarget {
                            field: key.to_string(),
                            id,
                        });
                    }
                    let handle = self.walk_thing(inner, None, inner_chain)?;
                    removed_ids.insert(inner_id.clone().unwrap_or_default());
                    let edge_handle = self.alloc.edge();
                    self.push_edge(EdgeWrite {
                        handle: edge_handle,
                        relation: link.relation.clone(),
                        op: EdgeOp::Delete,
                        anchor: EdgeAnchor::ByRoles,
                        roles: role_map(&link.plays, parent, reach.as_deref(), &[handle]),
                        data: Vec::new(),
                        temp_id: None,
                    })?;
                }
                Op::Match => {
                    if let Some(id) = &inner_id {
                        if diffing
                            && !current.contains(id)
                            && !self.config.ignore_nonexisting_things
                        {
                            return Err(MutationError::MissingTarget {
                                field: key.to_string(),
                                id: id.clone(),
                            });
                        }
                    }
                    self.walk_thing(inner, None, inner_chain)?;
                }
                Op::Update | Op::Link => {
                    return Err(MutationError::malformed(
                        "unexpected operation on an intermediary relation",
                    ));
                }
            }
        }

        // Replace: currently linked ids missing from the desired set unlink
        // implicitly. The operation's own targets are excluded by the set
        // difference itself.
        if let (Some(desired), Some(thing_name)) = (&replace_desired, &replace_thing) {
            for id in current.difference(desired) {
                let handle = self.phantom_match(thing_name, id)?;
                removed_ids.insert(id.clone());
                to_unlink.push(handle);
            }
        }

        // Cardinality-ONE occupancy: a link into a slot that stays occupied
        // by a different id fails before any statement is built.
        if link.cardinality == Cardinality::One && diffing && !to_link.is_empty() {
            let remaining: BTreeSet<&String> =
                current.iter().filter(|id| !removed_ids.contains(*id)).collect();
            if !remaining.is_empty() {
                return Err(MutationError::OccupiedSlot {
                    thing: link.relation.clone(),
                    id: chain.unwrap_or_default().to_string(),
                    field: key.to_string(),
                    current: remaining
                        .iter()
                        .next()
                        .map(|id| id.to_string())
                        .unwrap_or_default(),
                });
            }
            if to_link.len() > 1 {
                return Err(MutationError::OccupiedSlot {
                    thing: link.relation.clone(),
                    id: chain.unwrap_or_default().to_string(),
                    field: key.to_string(),
                    current: "multiple desired links".to_string(),
                });
            }
        }

        if !to_link.is_empty() {
            let edge_handle = self.alloc.edge();
            self.push_edge(EdgeWrite {
                handle: edge_handle,
                relation: link.relation.clone(),
                op: EdgeOp::Create,
                anchor: EdgeAnchor::New,
                roles: role_map(&link.plays, parent, reach.as_deref(), &to_link),
                data: Vec::new(),
                temp_id: None,
            })?;
        }
        if !to_unlink.is_empty() {
            let edge_handle = self.alloc.edge();
            self.push_edge(EdgeWrite {
                handle: edge_handle,
                relation: link.relation.clone(),
                op: EdgeOp::Unlink,
                anchor: EdgeAnchor::ByRoles,
                roles: role_map(&link.plays, parent, reach.as_deref(), &to_unlink),
                data: Vec::new(),
                temp_id: None,
            })?;
        }
        Ok(())
    }

    /// The slot for a link field that targets relation instances directly.
    fn walk_relation_slot(
        &mut self,
        parent: NodeHandle,
        chain: Option<&str>,
        key: &str,
        link: &LinkFieldDef,
        children: &[MutNode],
    ) -> MutationResult<()> {
        let slot = chain.map(|chain| format!("{chain}.{key}"));
        let current: BTreeSet<String> = match (&self.cache, &slot) {
            (Some(cache), Some(slot)) => cache.linked(slot).cloned().unwrap_or_default(),
            _ => BTreeSet::new(),
        };
        let diffing = self.cache.is_some() && slot.is_some();

        let mut replace_desired: Option<BTreeSet<String>> = None;
        for child in children {
            let child_chain = match (&slot, child.single_id()) {
                (Some(slot), Some(id)) => Some(format!("{slot}.{id}")),
                _ => None,
            };
            match child.op {
                Op::Replace => {
                    if self.cache.is_none() {
                        return Err(MutationError::ReplaceWithoutPreQuery);
                    }
                    let id = child.single_id().map(str::to_string).ok_or_else(|| {
                        MutationError::malformed("replace targets must carry ids")
                    })?;
                    replace_desired
                        .get_or_insert_with(BTreeSet::new)
                        .insert(id.clone());
                    if diffing && current.contains(&id) {
                        continue;
                    }
                    let mut as_link = child.clone();
                    as_link.op = Op::Link;
                    self.walk_relation(
                        &as_link,
                        Some(ParentLink {
                            parent,
                            plays: link.plays.clone(),
                        }),
                        child_chain,
                    )?;
                }
                Op::Link => {
                    if let Some(id) = child.single_id() {
                        if diffing && current.contains(id) {
                            continue;
                        }
                    }
                    self.walk_relation(
                        child,
                        Some(ParentLink {
                            parent,
                            plays: link.plays.clone(),
                        }),
                        child_chain,
                    )?;
                }
                _ => {
                    self.walk_relation(
                        child,
                        Some(ParentLink {
                            parent,
                            plays: link.plays.clone(),
                        }),
                        child_chain,
                    )?;
                }
            }
        }

        if let Some(desired) = &replace_desired {
            let relation_def = self.thing_def(&link.relation)?;
            let id_storage = relation_id_storage(relation_def).ok_or_else(|| {
                MutationError::malformed("replace over relations without id fields is unsupported")
            })?;
            for id in current.difference(desired) {
                let edge_handle = self.alloc.edge();
                self.push_edge(EdgeWrite {
                    handle: edge_handle,
                    relation: link.relation.clone(),
                    op: EdgeOp::Unlink,
                    anchor: EdgeAnchor::ById {
                        id: id.clone(),
                        id_storage: id_storage.clone(),
                    },
                    roles: IndexMap::from([(link.plays.clone(), vec![parent])]),
                    data: Vec::new(),
                    temp_id: None,
                })?;
            }
        }
        Ok(())
    }

    /// An explicit relation instance: its own write plus role bindings.
    fn walk_relation(
        &mut self,
        node: &MutNode,
        parent_link: Option<ParentLink>,
        chain: Option<String>,
    ) -> MutationResult<NodeHandle> {
        let thing = self.thing_def(&node.thing)?;
        let id_storage = relation_id_storage(thing);
        let id = self.instance_id(node, thing);

        // Role players first; a created relation needs them inline.
        let mut roles: IndexMap<String, Vec<NodeHandle>> = IndexMap::new();
        let mut unbind: IndexMap<String, Vec<NodeHandle>> = IndexMap::new();
        for (key, children) in &node.children {
            if let Some(link) = thing.link_field(key) {
                // Relations can carry link fields of their own.
                let link = link.clone();
                self.walk_slot(node.handle, chain.as_deref(), key, &link, children)?;
                continue;
            }
            let role = thing
                .role(key)
                .ok_or_else(|| MutationError::unknown_field(&thing.name, key))?
                .clone();
            for child in children {
                let handle = self.walk_thing(child, None, None)?;
                if child.op == Op::Unlink {
                    unbind.entry(role.name.clone()).or_default().push(handle);
                } else {
                    roles.entry(role.name.clone()).or_default().push(handle);
                }
            }
        }
        if let Some(parent) = &parent_link {
            roles
                .entry(parent.plays.clone())
                .or_default()
                .push(parent.parent);
        }

        match node.op {
            Op::Create => {
                if roles.is_empty() {
                    return Err(MutationError::RelationWithoutEdges {
                        relation: thing.name.clone(),
                    });
                }
                if let Some(id) = &id {
                    self.record_create_id(id)?;
                }
                let edge_handle = self.alloc.edge();
                self.push_edge(EdgeWrite {
                    handle: edge_handle,
                    relation: thing.name.clone(),
                    op: EdgeOp::Create,
                    anchor: EdgeAnchor::New,
                    roles,
                    data: self.resolved_data(node, thing)?,
                    temp_id: node.temp_id.clone(),
                })?;
            }
            Op::Update | Op::Delete | Op::Match => {
                self.emit_node(node, thing)?;
                let anchor = edge_anchor(&id, &id_storage);
                if !roles.is_empty() {
                    let edge_handle = self.alloc.edge();
                    self.push_edge(EdgeWrite {
                        handle: edge_handle,
                        relation: thing.name.clone(),
                        op: EdgeOp::Link,
                        anchor: anchor.clone(),
                        roles,
                        data: Vec::new(),
                        temp_id: None,
                    })?;
                }
                if !unbind.is_empty() {
                    let edge_handle = self.alloc.edge();
                    self.push_edge(EdgeWrite {
                        handle: edge_handle,
                        relation: thing.name.clone(),
                        op: EdgeOp::Unlink,
                        anchor,
                        roles: unbind,
                        data: Vec::new(),
                        temp_id: None,
                    })?;
                }
            }
            Op::Link | Op::Unlink => {
                let anchor = edge_anchor(&id, &id_storage);
                let mut bound = roles;
                bound.extend(unbind);
                if bound.is_empty() {
                    return Err(MutationError::RelationWithoutEdges {
                        relation: thing.name.clone(),
                    });
                }
                let edge_handle = self.alloc.edge();
                self.push_edge(EdgeWrite {
                    handle: edge_handle,
                    relation: thing.name.clone(),
                    op: if node.op == Op::Link {
                        EdgeOp::Link
                    } else {
                        EdgeOp::Unlink
                    },
                    anchor,
                    roles: bound,
                    data: Vec::new(),
                    temp_id: node.temp_id.clone(),
                })?;
            }
            Op::Replace => {
                return Err(MutationError::malformed(
                    "replace applies to link fields, not relation instances",
                ));
            }
        }
        Ok(node.handle)
    }

    /// Emit (or merge into) the node write for one instance.
    fn emit_node(&mut self, node: &MutNode, thing: &ThingDef) -> MutationResult<NodeHandle> {
        // A bare temp-id reference resolves to its creator's handle.
        if let Some(temp) = &node.temp_id {
            if node.op != Op::Create {
                self.temp_refs.push(temp.clone());
                if let Some(handle) = self.temp_creators.get(temp) {
                    return Ok(*handle);
                }
                // No creator anywhere; finish() reports the orphan.
                return Ok(node.handle);
            }
        }

        let op = match node.op {
            Op::Create => NodeOp::Create,
            Op::Update => NodeOp::Update,
            Op::Delete => NodeOp::Delete,
            Op::Link | Op::Unlink | Op::Replace | Op::Match => NodeOp::Match,
        };
        let id = self.instance_id(node, thing);
        if op == NodeOp::Create {
            if let Some(id) = &id {
                self.record_create_id(id)?;
            }
        }
        if let (Some(cache), Some(id)) = (self.cache, &id) {
            let needs_existing = matches!(op, NodeOp::Update | NodeOp::Delete);
            if needs_existing
                && node.path.is_root()
                && !cache.exists(id)
                && !self.config.ignore_nonexisting_things
            {
                return Err(MutationError::MissingTarget {
                    field: thing.name.clone(),
                    id: id.clone(),
                });
            }
        }

        let write = NodeWrite {
            handle: node.handle,
            thing: thing.name.clone(),
            op,
            id: id.clone(),
            id_storage: thing
                .single_id_field()
                .and_then(|field| thing.data_field(field))
                .map(|field| field.storage_path.clone()),
            temp_id: node.temp_id.clone(),
            data: self.resolved_data(node, thing)?,
        };

        if let Some(id) = id {
            let key = (thing.name.clone(), id);
            if let Some(&index) = self.node_by_id.get(&key) {
                return self.merge_node(index, write);
            }
            self.node_by_id.insert(key, self.nodes.len());
        }
        self.nodes.push(write);
        Ok(node.handle)
    }

    /// An instance reached two ways keeps one write; matches yield to
    /// stronger operations and double creates are duplicate ids.
    fn merge_node(&mut self, index: usize, incoming: NodeWrite) -> MutationResult<NodeHandle> {
        let existing = &mut self.nodes[index];
        match (existing.op, incoming.op) {
            (NodeOp::Create, NodeOp::Create) => {
                return Err(MutationError::DuplicateId(incoming.id.unwrap_or_default()));
            }
            (NodeOp::Match, op) => {
                existing.op = op;
                for entry in incoming.data {
                    if !existing.data.iter().any(|(path, _)| path == &entry.0) {
                        existing.data.push(entry);
                    }
                }
            }
            (_, NodeOp::Match) => {}
            (a, b) if a == b => {
                for entry in incoming.data {
                    if !existing.data.iter().any(|(path, _)| path == &entry.0) {
                        existing.data.push(entry);
                    }
                }
            }
            (a, b) => {
                return Err(MutationError::malformed(format!(
                    "conflicting operations {} and {} on {}",
                    a.as_str(),
                    b.as_str(),
                    existing.id.clone().unwrap_or_default()
                )));
            }
        }
        Ok(self.nodes[index].handle)
    }

    /// A match-only node for an instance the request never mentioned
    /// (implicit unlink targets).
    fn phantom_match(&mut self, thing_name: &str, id: &str) -> MutationResult<NodeHandle> {
        let thing = self.thing_def(thing_name)?;
        let key = (thing.name.clone(), id.to_string());
        if let Some(&index) = self.node_by_id.get(&key) {
            return Ok(self.nodes[index].handle);
        }
        let handle = self.alloc.node();
        self.node_by_id.insert(key, self.nodes.len());
        self.nodes.push(NodeWrite {
            handle,
            thing: thing.name.clone(),
            op: NodeOp::Match,
            id: Some(id.to_string()),
            id_storage: thing
                .single_id_field()
                .and_then(|field| thing.data_field(field))
                .map(|field| field.storage_path.clone()),
            temp_id: None,
            data: Vec::new(),
        });
        Ok(handle)
    }

    fn push_edge(&mut self, edge: EdgeWrite) -> MutationResult<()> {
        // Merge edges addressing the same explicit relation instance.
        if let EdgeAnchor::ById { id, .. } = &edge.anchor {
            let same: Option<usize> = self.edges.iter().position(|other| {
                other.relation == edge.relation
                    && matches!(&other.anchor, EdgeAnchor::ById { id: other_id, .. } if other_id == id)
            });
            if let Some(index) = same {
                let existing = &mut self.edges[index];
                let merged_op = match (existing.op, edge.op) {
                    (a, b) if a == b => a,
                    (EdgeOp::Match, b) => b,
                    (a, EdgeOp::Match) => a,
                    (EdgeOp::Create, EdgeOp::Link) | (EdgeOp::Link, EdgeOp::Create) => {
                        EdgeOp::Create
                    }
                    (a, b) => {
                        return Err(MutationError::EdgeOpConflict {
                            relation: edge.relation.clone(),
                            first: a.as_str().to_string(),
                            second: b.as_str().to_string(),
                        })
                    }
                };
                existing.op = merged_op;
                for (role, players) in edge.roles {
                    let slot = existing.roles.entry(role).or_default();
                    for player in players {
                        if !slot.contains(&player) {
                            slot.push(player);
                        }
                    }
                }
                return Ok(());
            }
        }
        self.edges.push(edge);
        Ok(())
    }

    fn record_create_id(&mut self, id: &str) -> MutationResult<()> {
        if self.create_ids.insert(id.to_string(), ()).is_some() {
            return Err(MutationError::DuplicateId(id.to_string()));
        }
        Ok(())
    }

    /// The real id of an instance: `$id` for addressed nodes, the id data
    /// field for creates.
    fn instance_id(&self, node: &MutNode, thing: &ThingDef) -> Option<String> {
        if let Some(id) = node.single_id() {
            return Some(id.to_string());
        }
        let field = thing.single_id_field()?;
        node.data
            .get(field)
            .and_then(|value| value.as_str())
            .map(str::to_string)
    }

    fn resolved_data(
        &self,
        node: &MutNode,
        thing: &ThingDef,
    ) -> MutationResult<Vec<(String, DataValue)>> {
        let mut data = Vec::with_capacity(node.data.len());
        for (path, value) in &node.data {
            let field = thing
                .data_field(path)
                .ok_or_else(|| MutationError::unknown_field(&thing.name, path))?;
            if field.is_virtual {
                continue;
            }
            data.push((field.storage_path.clone(), value.clone()));
        }
        Ok(data)
    }
}

fn relation_id_storage(thing: &ThingDef) -> Option<String> {
    thing
        .single_id_field()
        .and_then(|field| thing.data_field(field))
        .map(|field| field.storage_path.clone())
}

fn edge_anchor(id: &Option<String>, id_storage: &Option<String>) -> EdgeAnchor {
    match (id, id_storage) {
        (Some(id), Some(id_storage)) => EdgeAnchor::ById {
            id: id.clone(),
            id_storage: id_storage.clone(),
        },
        _ => EdgeAnchor::ByRoles,
    }
}

fn role_map(
    plays: &str,
    parent: NodeHandle,
    reach: Option<&str>,
    players: &[NodeHandle],
) -> IndexMap<String, Vec<NodeHandle>> {
    let mut roles = IndexMap::new();
    roles.insert(plays.to_string(), vec![parent]);
    if let Some(reach) = reach {
        roles.insert(reach.to_string(), players.to_vec());
    }
    roles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{add_intermediaries, build_path_cache, enrich_mutation, split_ids};
    use graft_schema::{
        enrich_schema, ContentKind, DataFieldDef, LinkFieldDef, RoleDef, SchemaBuilder,
    };
    use serde_json::json;

    fn schema() -> Schema {
        let mut builder = SchemaBuilder::new();
        builder
            .add_entity("User")
            .data_field(DataFieldDef::new("id", ContentKind::Id))
            .data_field(DataFieldDef::new("name", ContentKind::Text))
            .link_field(LinkFieldDef::new("spaces", "Space-User", "users"))
            .link_field(LinkFieldDef::new("home", "Home", "resident").one())
            .done()
            .unwrap();
        builder
            .add_entity("Space")
            .data_field(DataFieldDef::new("id", ContentKind::Id))
            .data_field(DataFieldDef::new("name", ContentKind::Text))
            .link_field(LinkFieldDef::new("users", "Space-User", "spaces"))
            .done()
            .unwrap();
        builder
            .add_entity("House")
            .data_field(DataFieldDef::new("id", ContentKind::Id))
            .link_field(LinkFieldDef::new("resident", "Home", "house").one())
            .done()
            .unwrap();
        builder
            .add_relation("Space-User")
            .role(RoleDef::new("users", Cardinality::Many))
            .role(RoleDef::new("spaces", Cardinality::Many))
            .done()
            .unwrap();
        builder
            .add_relation("Home")
            .role(RoleDef::new("resident", Cardinality::One))
            .role(RoleDef::new("house", Cardinality::One))
            .done()
            .unwrap();
        enrich_schema(builder.build().unwrap()).unwrap()
    }

    fn plan_with_cache(
        request: serde_json::Value,
        prequery_results: Option<Vec<serde_json::Value>>,
    ) -> MutationResult<ReconcilePlan> {
        let schema = schema();
        let config = MutationConfig::default();
        let mut alloc = HandleAllocator::new();
        let tree = enrich_mutation(&schema, &request, &mut alloc)?;
        let tree = split_ids(tree, &mut alloc);
        let tree = add_intermediaries(&schema, tree, &mut alloc)?;
        let cache = prequery_results.map(|results| build_path_cache(&results));
        reconcile(&schema, &tree, cache.as_ref(), &config, &mut alloc)
    }

    #[test]
    fn test_plain_create_emits_one_node_and_no_edges() {
        let plan =
            plan_with_cache(json!({"$entity": "User", "id": "p2", "name": "Bo"}), None).unwrap();

        assert_eq!(plan.nodes.len(), 1);
        assert!(plan.edges.is_empty());
        let node = &plan.nodes[0];
        assert_eq!(node.op, NodeOp::Create);
        assert_eq!(node.id.as_deref(), Some("p2"));
        assert!(node
            .data
            .iter()
            .any(|(path, value)| path == "name" && value.as_str() == Some("Bo")));
    }

    #[test]
    fn test_create_with_nested_link_emits_edge() {
        let plan = plan_with_cache(
            json!({"$entity": "User", "id": "u1", "name": "Ann", "spaces": ["s1"]}),
            None,
        )
        .unwrap();

        assert_eq!(plan.edges.len(), 1);
        let edge = &plan.edges[0];
        assert_eq!(edge.op, EdgeOp::Create);
        assert_eq!(edge.relation, "Space-User");
        assert_eq!(edge.roles["users"].len(), 1);
        assert_eq!(edge.roles["spaces"].len(), 1);
        // The matched space shows up as a match node.
        assert!(plan
            .nodes
            .iter()
            .any(|n| n.thing == "Space" && n.op == NodeOp::Match));
    }

    #[test]
    fn test_replace_diff_produces_minimal_operations() {
        // Currently linked to {a, b}; replace with {b, c}: link c, unlink a,
        // nothing for b.
        let results = vec![json!([{
            "$thing": "User", "$id": "u1",
            "spaces": [
                {"$thing": "Space", "$id": "a"},
                {"$thing": "Space", "$id": "b"},
            ]
        }])];
        let plan = plan_with_cache(
            json!({
                "$entity": "User", "$id": "u1",
                "spaces": [
                    {"$op": "replace", "$id": "b"},
                    {"$op": "replace", "$id": "c"},
                ]
            }),
            Some(results),
        )
        .unwrap();

        let links: Vec<_> = plan.edges.iter().filter(|e| e.op == EdgeOp::Create).collect();
        let unlinks: Vec<_> = plan.edges.iter().filter(|e| e.op == EdgeOp::Unlink).collect();
        assert_eq!(links.len(), 1);
        assert_eq!(unlinks.len(), 1);
        assert_eq!(links[0].roles["spaces"].len(), 1);
        assert_eq!(unlinks[0].roles["spaces"].len(), 1);
        // The unlink targets `a` through a synthesized match node.
        let unlink_player = unlinks[0].roles["spaces"][0];
        let phantom = plan.nodes.iter().find(|n| n.handle == unlink_player).unwrap();
        assert_eq!(phantom.id.as_deref(), Some("a"));
        assert_eq!(phantom.op, NodeOp::Match);
    }

    #[test]
    fn test_link_already_linked_is_zero_ops() {
        let results = vec![json!([{
            "$thing": "User", "$id": "u1",
            "spaces": [{"$thing": "Space", "$id": "s1"}]
        }])];
        let plan = plan_with_cache(
            json!({"$entity": "User", "$id": "u1", "spaces": [{"$op": "link", "$id": "s1"}]}),
            Some(results),
        )
        .unwrap();

        assert!(plan.edges.is_empty());
    }

    #[test]
    fn test_cardinality_one_occupied_slot_is_rejected() {
        let results = vec![json!([{
            "$thing": "User", "$id": "u1",
            "home": [{"$thing": "House", "$id": "h1"}]
        }])];
        let result = plan_with_cache(
            json!({"$entity": "User", "$id": "u1", "home": [{"$op": "link", "$id": "h2"}]}),
            Some(results),
        );

        assert!(matches!(
            result.unwrap_err(),
            MutationError::OccupiedSlot { current, .. } if current == "h1"
        ));
    }

    #[test]
    fn test_unlink_missing_target_is_rejected() {
        let results = vec![json!([{"$thing": "User", "$id": "u1", "spaces": []}])];
        let result = plan_with_cache(
            json!({"$entity": "User", "$id": "u1", "spaces": [{"$op": "unlink", "$id": "s9"}]}),
            Some(results),
        );

        assert!(matches!(
            result.unwrap_err(),
            MutationError::MissingTarget { id, .. } if id == "s9"
        ));
    }

    #[test]
    fn test_orphan_temp_id_is_rejected() {
        let result = plan_with_cache(
            json!({"$entity": "User", "$id": "u1", "spaces": [{"$tempId": "x"}]}),
            Some(vec![json!([{"$thing": "User", "$id": "u1", "spaces": []}])]),
        );

        assert!(matches!(
            result.unwrap_err(),
            MutationError::OrphanTempId(temp) if temp == "x"
        ));
    }

    #[test]
    fn test_temp_id_reference_resolves_to_creator_handle() {
        let plan = plan_with_cache(
            json!([
                {"$entity": "Space", "id": "s9", "$tempId": "room"},
                {"$entity": "User", "$id": "u1", "spaces": [{"$tempId": "room"}]}
            ]),
            Some(vec![json!([{"$thing": "User", "$id": "u1", "spaces": []}])]),
        )
        .unwrap();

        let creator = plan
            .nodes
            .iter()
            .find(|n| n.temp_id.as_deref() == Some("room"))
            .unwrap();
        assert_eq!(creator.op, NodeOp::Create);
        let link = plan.edges.iter().find(|e| e.op == EdgeOp::Create).unwrap();
        assert!(link.roles["spaces"].contains(&creator.handle));
    }

    #[test]
    fn test_duplicate_create_ids_are_rejected() {
        let result = plan_with_cache(
            json!([
                {"$entity": "User", "id": "u1", "name": "Ann"},
                {"$entity": "User", "id": "u1", "name": "Bo"}
            ]),
            None,
        );

        assert!(matches!(
            result.unwrap_err(),
            MutationError::DuplicateId(id) if id == "u1"
        ));
    }

    #[test]
    fn test_conflicting_edge_ops_on_one_relation_are_rejected() {
        // Space-User with an id of its own, addressable at the root.
        let mut builder = SchemaBuilder::new();
        builder
            .add_entity("User")
            .data_field(DataFieldDef::new("id", ContentKind::Id))
            .link_field(LinkFieldDef::new("spaces", "Space-User", "users"))
            .done()
            .unwrap();
        builder
            .add_entity("Space")
            .data_field(DataFieldDef::new("id", ContentKind::Id))
            .link_field(LinkFieldDef::new("users", "Space-User", "spaces"))
            .done()
            .unwrap();
        builder
            .add_relation("Space-User")
            .data_field(DataFieldDef::new("id", ContentKind::Id))
            .role(RoleDef::new("users", Cardinality::Many))
            .role(RoleDef::new("spaces", Cardinality::Many))
            .done()
            .unwrap();
        let schema = enrich_schema(builder.build().unwrap()).unwrap();

        let config = MutationConfig::default();
        let mut alloc = HandleAllocator::new();
        let tree = enrich_mutation(
            &schema,
            &json!([
                {"$relation": "Space-User", "$op": "link", "$id": "su1", "users": [{"$id": "u2"}]},
                {"$relation": "Space-User", "$op": "unlink", "$id": "su1", "users": [{"$id": "u3"}]}
            ]),
            &mut alloc,
        )
        .unwrap();
        let tree = split_ids(tree, &mut alloc);
        let tree = add_intermediaries(&schema, tree, &mut alloc).unwrap();
        let result = reconcile(&schema, &tree, None, &config, &mut alloc);

        assert!(matches!(
            result.unwrap_err(),
            MutationError::EdgeOpConflict { first, second, .. }
                if first == "link" && second == "unlink"
        ));
    }

    #[test]
    fn test_unlink_all_unlinks_every_cached_id() {
        let results = vec![json!([{
            "$thing": "User", "$id": "u1",
            "spaces": [
                {"$thing": "Space", "$id": "s1"},
                {"$thing": "Space", "$id": "s2"},
            ]
        }])];
        let plan = plan_with_cache(
            json!({"$entity": "User", "$id": "u1", "spaces": null}),
            Some(results),
        )
        .unwrap();

        let unlinks: Vec<_> = plan.edges.iter().filter(|e| e.op == EdgeOp::Unlink).collect();
        assert_eq!(unlinks.len(), 1);
        assert_eq!(unlinks[0].roles["spaces"].len(), 2);
    }

    #[test]
    fn test_update_missing_root_is_rejected_unless_configured() {
        let results = vec![json!([])];
        let result = plan_with_cache(
            json!({"$entity": "User", "$id": "ghost", "name": "Zed"}),
            Some(results),
        );
        assert!(matches!(
            result.unwrap_err(),
            MutationError::MissingTarget { id, .. } if id == "ghost"
        ));

        let schema = schema();
        let config = MutationConfig {
            ignore_nonexisting_things: true,
            ..Default::default()
        };
        let mut alloc = HandleAllocator::new();
        let tree = enrich_mutation(
            &schema,
            &json!({"$entity": "User", "$id": "ghost", "name": "Zed"}),
            &mut alloc,
        )
        .unwrap();
        let tree = split_ids(tree, &mut alloc);
        let tree = add_intermediaries(&schema, tree, &mut alloc).unwrap();
        let cache = build_path_cache(&[json!([])]);
        let plan = reconcile(&schema, &tree, Some(&cache), &config, &mut alloc).unwrap();
        assert_eq!(plan.nodes.len(), 1);
    }
}
