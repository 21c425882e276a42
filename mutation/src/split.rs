//! `$id`-array splitting.
//!
//! A node addressing several ids expands into one sibling per id, so every
//! later stage can assume a single identity per node. Expanded nodes (and
//! their subtrees) get fresh handles from the compile's allocator.

use crate::{MutNode, MutationTree};
use graft_core::HandleAllocator;
use graft_query::IdSelector;
use indexmap::IndexMap;

/// Expand every `$id` array in the tree.
pub fn split_ids(tree: MutationTree, alloc: &mut HandleAllocator) -> MutationTree {
    MutationTree {
        roots: tree
            .roots
            .into_iter()
            .flat_map(|root| split_node(root, alloc))
            .collect(),
    }
}

fn split_node(mut node: MutNode, alloc: &mut HandleAllocator) -> Vec<MutNode> {
    let mut children: IndexMap<String, Vec<MutNode>> = IndexMap::new();
    for (key, nodes) in std::mem::take(&mut node.children) {
        children.insert(
            key,
            nodes
                .into_iter()
                .flat_map(|child| split_node(child, alloc))
                .collect(),
        );
    }
    node.children = children;

    match node.id.take() {
        Some(IdSelector::Many(ids)) => ids
            .into_iter()
            .map(|id| {
                let mut sibling = node.clone();
                sibling.id = Some(IdSelector::One(id));
                sibling.handle = alloc.node();
                rehandle_children(&mut sibling, alloc);
                sibling
            })
            .collect(),
        id => {
            node.id = id;
            vec![node]
        }
    }
}

fn rehandle_children(node: &mut MutNode, alloc: &mut HandleAllocator) {
    for children in node.children.values_mut() {
        for child in children {
            child.handle = alloc.node();
            rehandle_children(child, alloc);
        }
    }
}
