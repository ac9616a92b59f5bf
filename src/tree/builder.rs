use std::cmp::Ordering;
use std::collections::HashMap;

use super::node::{TreeItem, TreeNode};

pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Reconcile a flat list into a forest.
///
/// An item hangs under the item whose pid equals its ppid. It becomes a root
/// when its ppid is 0, refers to itself, is missing from `items`, or closes a
/// ppid cycle (the cycle member with the lowest pid is re-rooted). An item
/// that would land deeper than `max_depth` is not attached either: it starts
/// a new root, and its own descendants follow it. Every input item appears
/// exactly once. Siblings and roots are ordered by weight descending, then
/// pid ascending.
pub fn build_tree<T: TreeItem + Clone>(items: &[T], max_depth: usize) -> Vec<TreeNode<T>> {
    let _build_span = tracing::debug_span!("tree.build", items = items.len(), max_depth).entered();

    let parents = resolve_parents(items);

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); items.len()];
    let mut roots = Vec::new();
    for (idx, parent) in parents.iter().enumerate() {
        match parent {
            Some(parent) => children[*parent].push(idx),
            None => roots.push(idx),
        }
    }

    let mut cut = Vec::new();
    let mut forest: Vec<TreeNode<T>> = roots
        .into_iter()
        .map(|idx| assemble(items, &children, idx, 0, max_depth, &mut cut))
        .collect();

    if !cut.is_empty() {
        tracing::debug!(rerooted = cut.len(), "depth limit re-rooted subtrees");
    }
    while let Some(idx) = cut.pop() {
        let node = assemble(items, &children, idx, 0, max_depth, &mut cut);
        forest.push(node);
    }

    forest.sort_by(|a, b| sibling_order(&a.item, &b.item));
    forest
}

fn assemble<T: TreeItem + Clone>(
    items: &[T],
    children: &[Vec<usize>],
    idx: usize,
    depth: usize,
    max_depth: usize,
    cut: &mut Vec<usize>,
) -> TreeNode<T> {
    let mut nodes = Vec::with_capacity(children[idx].len());
    for &child in &children[idx] {
        if depth >= max_depth {
            cut.push(child);
        } else {
            nodes.push(assemble(items, children, child, depth + 1, max_depth, cut));
        }
    }
    nodes.sort_by(|a, b| sibling_order(&a.item, &b.item));

    TreeNode {
        item: items[idx].clone(),
        children: nodes,
        depth,
    }
}

fn sibling_order<T: TreeItem>(a: &T, b: &T) -> Ordering {
    b.weight()
        .total_cmp(&a.weight())
        .then_with(|| a.pid().cmp(&b.pid()))
}

/// Index of each item's parent, with self-references and cycles removed.
fn resolve_parents<T: TreeItem>(items: &[T]) -> Vec<Option<usize>> {
    let mut by_pid = HashMap::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        by_pid.entry(item.pid()).or_insert(idx);
    }

    let mut parents: Vec<Option<usize>> = items
        .iter()
        .enumerate()
        .map(|(idx, item)| match item.ppid() {
            0 => None,
            ppid => by_pid.get(&ppid).copied().filter(|&parent| parent != idx),
        })
        .collect();

    break_cycles(items, &mut parents);
    parents
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    OnPath,
    Done,
}

fn break_cycles<T: TreeItem>(items: &[T], parents: &mut [Option<usize>]) {
    let mut state = vec![Visit::New; items.len()];
    let mut path: Vec<usize> = Vec::new();

    for start in 0..items.len() {
        let mut cursor = Some(start);
        while let Some(idx) = cursor {
            match state[idx] {
                Visit::Done => break,
                Visit::OnPath => {
                    let cycle_start = path.iter().position(|&p| p == idx).unwrap_or(0);
                    if let Some(&breaker) = path[cycle_start..]
                        .iter()
                        .min_by_key(|&&member| items[member].pid())
                    {
                        tracing::debug!(pid = items[breaker].pid(), "ppid cycle broken");
                        parents[breaker] = None;
                    }
                    break;
                }
                Visit::New => {
                    state[idx] = Visit::OnPath;
                    path.push(idx);
                    cursor = parents[idx];
                }
            }
        }
        for idx in path.drain(..) {
            state[idx] = Visit::Done;
        }
    }
}
