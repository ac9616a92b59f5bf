//! Process sampling and tree reconciliation for live system monitors.
//!
//! [`system::collector::Collector`] reads the OS process table into
//! [`system::process::ProcessRecord`]s, [`tree::build_tree`] arranges them
//! into a forest, and [`monitor::Monitor`] runs the periodic samplers and
//! publishes their results.

pub mod config;
pub mod format;
pub mod monitor;
pub mod scheduler;
pub mod system;
pub mod tree;
