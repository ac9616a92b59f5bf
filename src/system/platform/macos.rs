use libproc::libproc::proc_pid::pidinfo;
use libproc::libproc::task_info::TaskInfo;

use super::{DescriptorCounts, PlatformExtensions, SchedStats};
use crate::system::source::{FieldError, FieldResult};

pub struct Platform;

fn priority(pid: u32) -> FieldResult<i32> {
    // Clear errno before call
    unsafe { *libc::__error() = 0 };
    let prio = unsafe { libc::getpriority(libc::PRIO_PROCESS, pid as libc::id_t) };
    // getpriority returns -1 on error, but -1 can also be a valid priority
    // Check errno to distinguish
    let errno = unsafe { *libc::__error() };
    match (prio, errno) {
        (-1, libc::ESRCH) => Err(FieldError::Vanished),
        (-1, libc::EPERM) => Err(FieldError::AccessDenied),
        (-1, e) if e != 0 => Err(FieldError::Other(format!("getpriority errno {e}"))),
        (p, _) => Ok(p),
    }
}

impl PlatformExtensions for Platform {
    fn sched_stats(pid: u32) -> FieldResult<SchedStats> {
        let nice = priority(pid);
        if nice == Err(FieldError::Vanished) {
            return Err(FieldError::Vanished);
        }
        let pid = i32::try_from(pid).map_err(|_| FieldError::Vanished)?;
        let threads = pidinfo::<TaskInfo>(pid, 0)
            .map_err(FieldError::Other)
            .and_then(|info| {
                u32::try_from(info.pti_threadnum)
                    .map_err(|_| FieldError::Other("negative thread count".into()))
            });
        // Task times are in mach ticks; the caller falls back to sysinfo.
        Ok(SchedStats {
            threads,
            nice,
            cpu_times: Err(FieldError::Unsupported),
        })
    }

    fn descriptors(_pid: u32) -> FieldResult<DescriptorCounts> {
        Err(FieldError::Unsupported)
    }
}
