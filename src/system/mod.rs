pub mod collector;
pub mod connections;
pub mod counters;
pub mod history;
pub mod io_counters;
pub mod platform;
pub mod process;
pub mod signal;
pub mod snapshot;
pub mod source;
