//! Multiplex partitioning and variant enumeration
//!
//! [`PoolSet::partition`] slices a tree into ordered pools: a pool is
//! either a single leaf node or, at a multiplex-domain boundary, the list
//! of that domain's alternatives (each independently partitioned, so
//! domains nest). [`Variants`] then walks the Cartesian product across the
//! pools one combination at a time; the full cross-product is never
//! materialized, only the per-pool alternative lists are, so memory grows
//! with the sum of domain sizes while the variant count grows with their
//! product.

use std::collections::VecDeque;

use crate::tree::{Multiplex, NodeId, Tree};

/// One partitioned unit: a leaf outside any domain, or a multiplex domain
/// whose direct children are mutually exclusive alternatives.
#[derive(Debug)]
pub enum Pool {
    Leaf(NodeId),
    Domain(Vec<PoolSet>),
}

/// The ordered pools of one tree slice (root to leaves or to the next
/// multiplex boundary).
#[derive(Debug)]
pub struct PoolSet {
    pools: Vec<Pool>,
}

impl PoolSet {
    /// Partition the subtree rooted at `root`.
    ///
    /// Preorder traversal that does not descend past leaves or nodes with
    /// the multiplex flag enabled; each such node closes a pool. Pool
    /// order is discovery order, which makes enumeration deterministic.
    pub fn partition(tree: &Tree, root: NodeId) -> Self {
        let mut pools = Vec::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        let mut current = Some(root);
        while let Some(node) = current {
            if tree.is_leaf(node) {
                pools.push(Pool::Leaf(node));
            } else if tree.multiplex(node) == Multiplex::Enabled {
                let alternatives = tree
                    .children(node)
                    .iter()
                    .map(|&child| PoolSet::partition(tree, child))
                    .collect();
                pools.push(Pool::Domain(alternatives));
            } else {
                for &child in tree.children(node).iter().rev() {
                    queue.push_front(child);
                }
            }
            current = queue.pop_front();
        }
        Self { pools }
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    /// Lazily enumerate every variant of this pool set. Restartable: each
    /// call yields the same sequence from the first combination.
    pub fn variants(&self, tree: &Tree) -> Variants {
        Variants::new(self.alternative_table(tree))
    }

    /// Per-pool alternative lists. A leaf pool has exactly one alternative
    /// (itself); a domain pool's alternatives are the fully-resolved
    /// sub-variants of each of its children, in child order.
    fn alternative_table(&self, tree: &Tree) -> Vec<Vec<Vec<NodeId>>> {
        self.pools
            .iter()
            .map(|pool| match pool {
                Pool::Leaf(id) => vec![vec![*id]],
                Pool::Domain(subs) => subs.iter().flat_map(|sub| sub.variants(tree)).collect(),
            })
            .collect()
    }
}

/// Lazy Cartesian-product iterator over the per-pool alternative lists.
/// Each item is one variant: the ordered leaves drawn from every pool,
/// pool order first, domain-internal order second.
#[derive(Debug)]
pub struct Variants {
    alternatives: Vec<Vec<Vec<NodeId>>>,
    indices: Vec<usize>,
    done: bool,
}

impl Variants {
    fn new(alternatives: Vec<Vec<Vec<NodeId>>>) -> Self {
        // No pools, or any pool without alternatives, means nothing to
        // enumerate.
        let done = alternatives.is_empty() || alternatives.iter().any(|a| a.is_empty());
        let indices = vec![0; alternatives.len()];
        Self {
            alternatives,
            indices,
            done,
        }
    }
}

impl Iterator for Variants {
    type Item = Vec<NodeId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let variant: Vec<NodeId> = self
            .alternatives
            .iter()
            .zip(&self.indices)
            .flat_map(|(pool, &idx)| pool[idx].iter().copied())
            .collect();

        // Odometer advance, last pool fastest.
        let mut wrapped = true;
        for i in (0..self.indices.len()).rev() {
            self.indices[i] += 1;
            if self.indices[i] < self.alternatives[i].len() {
                wrapped = false;
                break;
            }
            self.indices[i] = 0;
        }
        if wrapped {
            self.done = true;
        }

        Some(variant)
    }
}
