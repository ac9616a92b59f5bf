use serde::Serialize;

/// What the reconciler needs to know about a record.
pub trait TreeItem {
    fn pid(&self) -> u32;
    /// 0 when the item has no known parent.
    fn ppid(&self) -> u32;
    /// Sort key for siblings, larger first.
    fn weight(&self) -> f32;
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TreeNode<T> {
    pub item: T,
    pub children: Vec<TreeNode<T>>,
    pub depth: usize,
}

impl<T> TreeNode<T> {
    /// Number of nodes in this subtree, including this one.
    pub fn subtree_size(&self) -> usize {
        1 + self.children.iter().map(TreeNode::subtree_size).sum::<usize>()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// One row of a pre-order walk over a forest.
#[derive(Debug)]
pub struct FlatRow<'a, T> {
    pub item: &'a T,
    pub depth: usize,
    pub is_last: bool,
    /// For each ancestor level, whether that ancestor was the last sibling.
    pub ancestors_last: Vec<bool>,
}

pub fn flatten<T>(forest: &[TreeNode<T>]) -> Vec<FlatRow<'_, T>> {
    let mut rows = Vec::new();
    let count = forest.len();
    for (i, node) in forest.iter().enumerate() {
        flatten_node(node, i + 1 == count, Vec::new(), &mut rows);
    }
    rows
}

fn flatten_node<'a, T>(
    node: &'a TreeNode<T>,
    is_last: bool,
    ancestors_last: Vec<bool>,
    rows: &mut Vec<FlatRow<'a, T>>,
) {
    rows.push(FlatRow {
        item: &node.item,
        depth: node.depth,
        is_last,
        ancestors_last: ancestors_last.clone(),
    });

    let mut chain = ancestors_last;
    chain.push(is_last);
    let count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        flatten_node(child, i + 1 == count, chain.clone(), rows);
    }
}

/// Indentation prefix for a flattened row, htop style.
pub fn tree_prefix<T>(row: &FlatRow<'_, T>) -> String {
    let mut prefix = String::new();
    if row.depth == 0 {
        return prefix;
    }
    for &last in row.ancestors_last.iter().skip(1) {
        prefix.push_str(if last { "  " } else { "│ " });
    }
    prefix.push_str(if row.is_last { "└─" } else { "├─" });
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(item: u32, depth: usize) -> TreeNode<u32> {
        TreeNode {
            item,
            children: Vec::new(),
            depth,
        }
    }

    fn sample_forest() -> Vec<TreeNode<u32>> {
        vec![
            TreeNode {
                item: 1,
                children: vec![
                    TreeNode {
                        item: 2,
                        children: vec![leaf(4, 2)],
                        depth: 1,
                    },
                    leaf(3, 1),
                ],
                depth: 0,
            },
            leaf(9, 0),
        ]
    }

    #[test]
    fn subtree_size_counts_descendants() {
        let forest = sample_forest();
        assert_eq!(forest[0].subtree_size(), 4);
        assert!(forest[1].is_leaf());
    }

    #[test]
    fn flatten_is_preorder() {
        let forest = sample_forest();
        let rows = flatten(&forest);
        let order: Vec<u32> = rows.iter().map(|r| *r.item).collect();
        assert_eq!(order, vec![1, 2, 4, 3, 9]);
        assert!(rows[4].is_last);
        assert!(!rows[1].is_last);
    }

    #[test]
    fn prefixes_draw_branches() {
        let forest = sample_forest();
        let rows = flatten(&forest);
        let prefixes: Vec<String> = rows.iter().map(tree_prefix).collect();
        assert_eq!(prefixes, vec!["", "├─", "│ └─", "└─", ""]);
    }
}
