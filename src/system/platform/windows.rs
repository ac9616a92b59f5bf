use super::{DescriptorCounts, PlatformExtensions, SchedStats};
use crate::system::source::{FieldError, FieldResult};

pub struct Platform;

#[cfg(target_os = "windows")]
use windows_sys::Win32::{
    Foundation::{CloseHandle, FILETIME},
    System::Threading::{
        GetPriorityClass, GetProcessTimes, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    },
};

#[cfg(target_os = "windows")]
use crate::system::process::CpuTimes;

/// FILETIME durations count 100ns intervals.
#[cfg(target_os = "windows")]
fn filetime_secs(time: &FILETIME) -> f64 {
    let ticks = (u64::from(time.dwHighDateTime) << 32) | u64::from(time.dwLowDateTime);
    ticks as f64 / 10_000_000.0
}

impl PlatformExtensions for Platform {
    /// Windows has no nice value; the priority class stands in for it.
    #[cfg(target_os = "windows")]
    fn sched_stats(pid: u32) -> FieldResult<SchedStats> {
        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle.is_null() {
                return Ok(SchedStats::failed(FieldError::AccessDenied));
            }
            let prio = GetPriorityClass(handle);
            let nice = if prio == 0 {
                Err(FieldError::AccessDenied)
            } else {
                Ok(prio as i32)
            };

            let empty = FILETIME {
                dwLowDateTime: 0,
                dwHighDateTime: 0,
            };
            let (mut created, mut exited, mut kernel, mut user) = (empty, empty, empty, empty);
            let cpu_times =
                if GetProcessTimes(handle, &mut created, &mut exited, &mut kernel, &mut user) == 0 {
                    Err(FieldError::AccessDenied)
                } else {
                    Ok(CpuTimes {
                        user: filetime_secs(&user),
                        system: filetime_secs(&kernel),
                    })
                };
            CloseHandle(handle);

            Ok(SchedStats {
                threads: Err(FieldError::Unsupported),
                nice,
                cpu_times,
            })
        }
    }

    #[cfg(not(target_os = "windows"))]
    fn sched_stats(_pid: u32) -> FieldResult<SchedStats> {
        Ok(SchedStats::failed(FieldError::Unsupported))
    }

    fn descriptors(_pid: u32) -> FieldResult<DescriptorCounts> {
        Err(FieldError::Unsupported)
    }
}
