use std::io;

use sysinfo::{
    Pid, ProcessRefreshKind, ProcessesToUpdate, System, ThreadKind, Uid, UpdateKind, Users,
};
use thiserror::Error;

use super::platform::{self, DescriptorCounts, SchedStats};
use super::process::{CpuTimes, ProcessState};

/// Why a single attribute of a single process could not be read.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("access denied")]
    AccessDenied,
    #[error("process no longer exists")]
    Vanished,
    #[error("not supported on this platform")]
    Unsupported,
    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for FieldError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FieldError::Vanished,
            io::ErrorKind::PermissionDenied => FieldError::AccessDenied,
            _ => FieldError::Other(err.to_string()),
        }
    }
}

pub type FieldResult<T> = Result<T, FieldError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    /// `None` when the process has no parent or the parent is unknown.
    pub ppid: Option<u32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    pub rss: u64,
    pub vsz: u64,
}

/// Per-process OS accounting. Every attribute is queried on its own and may
/// fail on its own; callers decide what a failure means for the record.
pub trait ProcessSource {
    /// Re-read the process table. Called once per snapshot.
    fn refresh(&mut self);
    fn pids(&self) -> Vec<u32>;
    fn total_memory(&self) -> u64;

    fn identity(&self, pid: u32) -> FieldResult<Identity>;
    fn command(&self, pid: u32) -> FieldResult<Vec<String>>;
    fn user(&self, pid: u32) -> FieldResult<String>;
    fn memory(&self, pid: u32) -> FieldResult<MemoryUsage>;
    /// CPU usage since the previous refresh, as normalized by the OS layer.
    fn cpu_percent(&self, pid: u32) -> FieldResult<f32>;
    fn status(&self, pid: u32) -> FieldResult<ProcessState>;
    /// Thread count, nice value and CPU times from one read.
    fn sched_stats(&self, pid: u32) -> FieldResult<SchedStats>;
    /// Start time in unix seconds.
    fn created_at(&self, pid: u32) -> FieldResult<u64>;
    /// Open files and sockets from one walk of the descriptor table.
    fn descriptors(&self, pid: u32) -> FieldResult<DescriptorCounts>;
    fn cwd(&self, pid: u32) -> FieldResult<String>;
}

/// `ProcessSource` backed by `sysinfo`, with the platform module filling in
/// what `sysinfo` does not expose.
pub struct SysinfoSource {
    sys: System,
    users: Users,
    primed: bool,
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSource {
    /// Empty until the first [`refresh`](ProcessSource::refresh), so
    /// construction never touches the OS.
    pub fn new() -> Self {
        SysinfoSource {
            sys: System::new(),
            users: Users::new(),
            primed: false,
        }
    }

    fn process(&self, pid: u32) -> FieldResult<&sysinfo::Process> {
        self.sys
            .process(Pid::from_u32(pid))
            .ok_or(FieldError::Vanished)
    }
}

impl ProcessSource for SysinfoSource {
    fn refresh(&mut self) {
        self.sys.refresh_memory();
        if !self.primed {
            self.users.refresh();
            self.sys.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::everything(),
            );
            self.primed = true;
            return;
        }
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_memory()
                .with_cpu()
                .with_cmd(UpdateKind::OnlyIfNotSet)
                .with_user(UpdateKind::OnlyIfNotSet)
                .with_cwd(UpdateKind::Always),
        );
    }

    fn pids(&self) -> Vec<u32> {
        // Userland threads show up as tasks of their process on Linux.
        self.sys
            .processes()
            .iter()
            .filter(|(_, process)| !matches!(process.thread_kind(), Some(ThreadKind::Userland)))
            .map(|(pid, _)| pid.as_u32())
            .collect()
    }

    fn total_memory(&self) -> u64 {
        self.sys.total_memory()
    }

    fn identity(&self, pid: u32) -> FieldResult<Identity> {
        let process = self.process(pid)?;
        Ok(Identity {
            name: process.name().to_string_lossy().to_string(),
            ppid: process.parent().map(|p| p.as_u32()),
        })
    }

    fn command(&self, pid: u32) -> FieldResult<Vec<String>> {
        let process = self.process(pid)?;
        Ok(process
            .cmd()
            .iter()
            .map(|s| s.to_string_lossy().to_string())
            .collect())
    }

    fn user(&self, pid: u32) -> FieldResult<String> {
        let uid = self.process(pid)?.user_id().ok_or(FieldError::AccessDenied)?;
        Ok(self
            .users
            .get_user_by_id(uid)
            .map(|user| user.name().to_string())
            .unwrap_or_else(|| uid_label(uid)))
    }

    fn memory(&self, pid: u32) -> FieldResult<MemoryUsage> {
        let process = self.process(pid)?;
        Ok(MemoryUsage {
            rss: process.memory(),
            vsz: process.virtual_memory(),
        })
    }

    fn cpu_percent(&self, pid: u32) -> FieldResult<f32> {
        Ok(self.process(pid)?.cpu_usage())
    }

    fn status(&self, pid: u32) -> FieldResult<ProcessState> {
        Ok(self.process(pid)?.status().into())
    }

    fn sched_stats(&self, pid: u32) -> FieldResult<SchedStats> {
        let process = self.process(pid)?;
        let mut stats = platform::sched_stats(pid)?;
        if stats.cpu_times == Err(FieldError::Unsupported) {
            // Only the total is known here; all of it is reported as user time.
            stats.cpu_times = Ok(CpuTimes {
                user: process.accumulated_cpu_time() as f64 / 1000.0,
                system: 0.0,
            });
        }
        Ok(stats)
    }

    fn created_at(&self, pid: u32) -> FieldResult<u64> {
        match self.process(pid)?.start_time() {
            0 => Err(FieldError::AccessDenied),
            secs => Ok(secs),
        }
    }

    fn descriptors(&self, pid: u32) -> FieldResult<DescriptorCounts> {
        self.process(pid)?;
        platform::descriptors(pid)
    }

    fn cwd(&self, pid: u32) -> FieldResult<String> {
        self.process(pid)?
            .cwd()
            .map(|path| path.display().to_string())
            .ok_or(FieldError::AccessDenied)
    }
}

/// Bare numeric id (or SID on Windows) for owners without a user entry.
fn uid_label(uid: &Uid) -> String {
    (**uid).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_field_errors() {
        let gone = io::Error::from(io::ErrorKind::NotFound);
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(FieldError::from(gone), FieldError::Vanished);
        assert_eq!(FieldError::from(denied), FieldError::AccessDenied);
    }

    #[test]
    fn current_process_resolves_identity() {
        let mut source = SysinfoSource::new();
        source.refresh();
        let pid = std::process::id();
        assert!(source.pids().contains(&pid));
        let identity = source.identity(pid).expect("own process must be readable");
        assert!(!identity.name.is_empty());
        assert!(source.memory(pid).expect("own memory").rss > 0);
    }

    #[test]
    fn construction_defers_the_process_scan() {
        let mut source = SysinfoSource::new();
        assert!(source.pids().is_empty());
        source.refresh();
        assert!(source.pids().contains(&std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn unknown_owner_renders_as_bare_uid() {
        let uid: Uid = "4242".parse().expect("numeric uid");
        assert_eq!(uid_label(&uid), "4242");
    }

    #[test]
    fn sched_stats_and_descriptors_for_own_process() {
        let mut source = SysinfoSource::new();
        source.refresh();
        let pid = std::process::id();
        let stats = source.sched_stats(pid).expect("own sched stats");
        assert!(stats.cpu_times.is_ok());
        assert_eq!(source.sched_stats(u32::MAX), Err(FieldError::Vanished));
        assert_eq!(source.descriptors(u32::MAX), Err(FieldError::Vanished));
    }

    #[test]
    fn missing_pid_reports_vanished() {
        let source = SysinfoSource::new();
        assert_eq!(source.identity(u32::MAX), Err(FieldError::Vanished));
        assert_eq!(source.cwd(u32::MAX), Err(FieldError::Vanished));
    }
}
