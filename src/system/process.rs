use std::fmt;

use serde::Serialize;

use crate::tree::TreeItem;

/// Text placeholder for string fields the OS refused to reveal.
pub const UNAVAILABLE: &str = "N/A";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessState {
    Running,
    Sleeping,
    Stopped,
    Zombie,
    Dead,
    DiskSleep,
    Idle,
    #[default]
    Unknown,
}

impl ProcessState {
    pub fn label(self) -> &'static str {
        match self {
            ProcessState::Running => "running",
            ProcessState::Sleeping => "sleeping",
            ProcessState::Stopped => "stopped",
            ProcessState::Zombie => "zombie",
            ProcessState::Dead => "dead",
            ProcessState::DiskSleep => "disk-sleep",
            ProcessState::Idle => "idle",
            ProcessState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<sysinfo::ProcessStatus> for ProcessState {
    fn from(status: sysinfo::ProcessStatus) -> Self {
        use sysinfo::ProcessStatus;

        match status {
            ProcessStatus::Run | ProcessStatus::Waking => ProcessState::Running,
            ProcessStatus::Sleep | ProcessStatus::Parked | ProcessStatus::LockBlocked => {
                ProcessState::Sleeping
            }
            ProcessStatus::Stop | ProcessStatus::Tracing | ProcessStatus::Suspended => {
                ProcessState::Stopped
            }
            ProcessStatus::Zombie => ProcessState::Zombie,
            ProcessStatus::Dead | ProcessStatus::Wakekill => ProcessState::Dead,
            ProcessStatus::UninterruptibleDiskSleep => ProcessState::DiskSleep,
            ProcessStatus::Idle => ProcessState::Idle,
            _ => ProcessState::Unknown,
        }
    }
}

/// Cumulative CPU time split by mode, in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct CpuTimes {
    pub user: f64,
    pub system: f64,
}

/// One process at one sampling instant. Every field is resolved: values the
/// OS withheld carry their sentinel instead.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub ppid: u32,
    pub name: String,
    pub user: String,
    pub command: String,
    pub cwd: String,
    pub cpu_percent: f32,
    pub mem_percent: f32,
    pub vsz: u64,
    pub rss: u64,
    pub status: ProcessState,
    pub threads: u32,
    pub priority: i32,
    /// Unix seconds; `None` when the start time could not be read.
    pub created_at: Option<u64>,
    pub cpu_time_user: f64,
    pub cpu_time_sys: f64,
    pub open_files: u32,
    pub network_connections: u32,
}

impl ProcessRecord {
    /// Case-insensitive match against the pid and the command line.
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.pid.to_string().contains(needle) || self.command.to_lowercase().contains(needle)
    }

    pub fn is_kernel_thread(&self) -> bool {
        self.command.starts_with('[')
    }
}

impl TreeItem for ProcessRecord {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn ppid(&self) -> u32 {
        self.ppid
    }

    fn weight(&self) -> f32 {
        self.cpu_percent
    }
}
