//! Immutable values published by the monitor, one per sampling task.

use serde::Serialize;

use crate::tree::TreeNode;

use super::connections::ConnectionRecord;
use super::history::{GraphHistory, GraphPoint};
use super::io_counters::{InterfaceCounters, SpaceUsage};
use super::process::ProcessRecord;

#[derive(Clone, Debug, Default, Serialize)]
pub struct ProcessList {
    /// Increments on every publish of this view.
    pub generation: u64,
    /// Lowercased filter the list was built with; empty when unfiltered.
    pub filter: String,
    pub records: Vec<ProcessRecord>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ProcessForest {
    pub generation: u64,
    pub filter: String,
    pub max_depth: usize,
    pub roots: Vec<TreeNode<ProcessRecord>>,
}

impl ProcessForest {
    pub fn node_count(&self) -> usize {
        self.roots.iter().map(TreeNode::subtree_size).sum()
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct GraphsSnapshot {
    pub generation: u64,
    pub latest: GraphPoint,
    pub history: GraphHistory,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub cpu_percent: f32,
    pub memory_used: u64,
    pub memory_total: u64,
    pub memory_percent: f64,
    pub disk: SpaceUsage,
    pub process_count: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct InterfaceStats {
    #[serde(flatten)]
    pub counters: InterfaceCounters,
    pub sent_per_sec: f64,
    pub recv_per_sec: f64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct NetworkSnapshot {
    pub generation: u64,
    pub interfaces: Vec<InterfaceStats>,
    pub connections: Vec<ConnectionRecord>,
}
