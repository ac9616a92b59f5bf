//! Parent/child reconciliation of flat process lists.
//!
//! Nothing in here knows where the records come from; anything that
//! implements [`TreeItem`] can be arranged into a forest.

mod builder;
mod node;

pub use builder::{DEFAULT_MAX_DEPTH, build_tree};
pub use node::{FlatRow, TreeItem, TreeNode, flatten, tree_prefix};
