//! Intermediary relation synthesis.
//!
//! A link field whose target is the opposite role reaches its value through
//! a join relation the caller never names. This stage makes that relation
//! explicit: each nested child is wrapped in a synthesized relation node
//! wiring the two endpoint roles, so the reconciler only ever sees relation
//! instances. Link fields targeting the relation itself already carry
//! relation nodes and pass through untouched.

use crate::{MutNode, MutationError, MutationResult, MutationTree, Op, SynthVia};
use graft_core::HandleAllocator;
use graft_schema::{LinkTarget, Schema};
use indexmap::IndexMap;

/// Synthesize intermediary relation nodes throughout the tree.
pub fn add_intermediaries(
    schema: &Schema,
    tree: MutationTree,
    alloc: &mut HandleAllocator,
) -> MutationResult<MutationTree> {
    let mut roots = Vec::with_capacity(tree.roots.len());
    for root in tree.roots {
        roots.push(transform_node(schema, root, alloc)?);
    }
    Ok(MutationTree { roots })
}

fn transform_node(
    schema: &Schema,
    mut node: MutNode,
    alloc: &mut HandleAllocator,
) -> MutationResult<MutNode> {
    let thing = schema
        .thing(&node.thing)
        .ok_or_else(|| MutationError::UnknownThing(node.thing.clone()))?;

    let mut children: IndexMap<String, Vec<MutNode>> = IndexMap::new();
    for (key, nodes) in std::mem::take(&mut node.children) {
        let mut transformed = Vec::with_capacity(nodes.len());
        for child in nodes {
            transformed.push(transform_node(schema, child, alloc)?);
        }

        let link = thing.link_field(&key);
        let wrapped = match link {
            Some(link) if link.target == LinkTarget::Role => {
                let opposite = link
                    .opposite_players
                    .first()
                    .ok_or_else(|| MutationError::unknown_field(&thing.name, &key))?;
                transformed
                    .into_iter()
                    .map(|child| synthesize(link.relation.clone(), link.plays.clone(), opposite.plays.clone(), node.op, child, alloc))
                    .collect()
            }
            _ => transformed,
        };
        children.insert(key, wrapped);
    }
    node.children = children;
    Ok(node)
}

/// The synthesized relation's operation follows from the parent's: under a
/// create everything is a fresh relation instance; otherwise it tracks what
/// the child asked for.
fn synth_op(parent_op: Op, child_op: Op) -> Op {
    if parent_op == Op::Create {
        return Op::Create;
    }
    match child_op {
        Op::Create | Op::Link => Op::Create,
        Op::Unlink => Op::Unlink,
        Op::Delete => Op::Delete,
        Op::Replace => Op::Replace,
        Op::Update | Op::Match => Op::Match,
    }
}

fn synthesize(
    relation: String,
    plays: String,
    reach: String,
    parent_op: Op,
    child: MutNode,
    alloc: &mut HandleAllocator,
) -> MutNode {
    let op = synth_op(parent_op, child.op);
    let path = child.path.clone();
    let mut children = IndexMap::new();
    children.insert(reach.clone(), vec![child]);
    MutNode {
        handle: alloc.node(),
        thing: relation,
        kind: graft_schema::ThingKind::Relation,
        op,
        explicit_op: false,
        id: None,
        temp_id: None,
        filter: None,
        data: IndexMap::new(),
        children,
        path,
        synth: Some(SynthVia { plays, reach }),
    }
}
