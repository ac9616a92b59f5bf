use crate::system::process::CpuTimes;
use crate::system::source::{FieldError, FieldResult};

/// Descriptor breakdown for one process: regular files vs. sockets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DescriptorCounts {
    pub files: u32,
    pub sockets: u32,
}

/// Scheduling figures that come out of a single OS read per process. Each
/// one can still be missing on its own.
#[derive(Clone, Debug, PartialEq)]
pub struct SchedStats {
    pub threads: FieldResult<u32>,
    pub nice: FieldResult<i32>,
    pub cpu_times: FieldResult<CpuTimes>,
}

impl SchedStats {
    /// Every figure failed with the same error.
    pub fn failed(err: FieldError) -> Self {
        SchedStats {
            threads: Err(err.clone()),
            nice: Err(err.clone()),
            cpu_times: Err(err),
        }
    }
}

pub trait PlatformExtensions {
    fn sched_stats(pid: u32) -> FieldResult<SchedStats>;
    fn descriptors(pid: u32) -> FieldResult<DescriptorCounts>;
}

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod windows;

#[cfg(target_os = "linux")]
use linux as platform_impl;
#[cfg(target_os = "macos")]
use macos as platform_impl;
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
use windows as platform_impl;

pub fn sched_stats(pid: u32) -> FieldResult<SchedStats> {
    platform_impl::Platform::sched_stats(pid)
}

pub fn descriptors(pid: u32) -> FieldResult<DescriptorCounts> {
    platform_impl::Platform::descriptors(pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrappers_do_not_panic_for_current_pid() {
        let pid = std::process::id();
        let _ = sched_stats(pid);
        let _ = descriptors(pid);
    }

    #[test]
    fn failed_stats_carry_the_error_everywhere() {
        let stats = SchedStats::failed(FieldError::AccessDenied);
        assert_eq!(stats.threads, Err(FieldError::AccessDenied));
        assert_eq!(stats.nice, Err(FieldError::AccessDenied));
        assert_eq!(stats.cpu_times, Err(FieldError::AccessDenied));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_reads_own_process() {
        let pid = std::process::id();
        let stats = sched_stats(pid).expect("own stat");
        assert!(stats.threads.expect("own thread count") >= 1);
        assert!(stats.nice.is_ok());
        assert!(stats.cpu_times.expect("own cpu times").user >= 0.0);
        assert!(descriptors(pid).expect("own descriptors").files >= 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_missing_pid_is_vanished() {
        // Above the kernel's PID_MAX_LIMIT, so never allocated.
        let pid = 4_194_305 * 2;
        assert_eq!(sched_stats(pid), Err(FieldError::Vanished));
        assert_eq!(descriptors(pid), Err(FieldError::Vanished));
    }
}
