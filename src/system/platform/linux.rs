use std::fs;
use std::io;

use super::{DescriptorCounts, PlatformExtensions, SchedStats};
use crate::system::process::CpuTimes;
use crate::system::source::{FieldError, FieldResult};

pub struct Platform;

/// The numeric fields of `/proc/{pid}/stat` that follow the `comm` field.
struct Stat {
    fields: Vec<String>,
}

impl Stat {
    fn read(pid: u32) -> FieldResult<Self> {
        let contents = fs::read_to_string(format!("/proc/{pid}/stat")).map_err(proc_error)?;
        // comm field may contain spaces and parens, so find the closing )
        let after_comm = contents
            .rfind(')')
            .ok_or_else(|| FieldError::Other("malformed stat".into()))?
            + 1;
        let fields = contents[after_comm..]
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Ok(Stat { fields })
    }

    // Fields after comm: state(0) ppid(1) pgrp(2) session(3) tty_nr(4)
    // tpgid(5) flags(6) minflt(7) cminflt(8) majflt(9) cmajflt(10)
    // utime(11) stime(12) cutime(13) cstime(14) priority(15) nice(16)
    // num_threads(17)
    fn field<T: std::str::FromStr>(&self, index: usize) -> FieldResult<T> {
        self.fields
            .get(index)
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| FieldError::Other(format!("stat field {index} unreadable")))
    }
}

/// ESRCH surfaces when the process exits while its /proc entry is being read.
fn proc_error(err: io::Error) -> FieldError {
    if err.raw_os_error() == Some(libc::ESRCH) {
        FieldError::Vanished
    } else {
        err.into()
    }
}

fn clock_ticks() -> f64 {
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 { ticks as f64 } else { 100.0 }
}

impl PlatformExtensions for Platform {
    fn sched_stats(pid: u32) -> FieldResult<SchedStats> {
        let stat = Stat::read(pid)?;
        let ticks = clock_ticks();
        let cpu_times = stat.field::<u64>(11).and_then(|utime| {
            let stime: u64 = stat.field(12)?;
            Ok(CpuTimes {
                user: utime as f64 / ticks,
                system: stime as f64 / ticks,
            })
        });
        Ok(SchedStats {
            threads: stat.field(17),
            nice: stat.field(16),
            cpu_times,
        })
    }

    fn descriptors(pid: u32) -> FieldResult<DescriptorCounts> {
        let entries = fs::read_dir(format!("/proc/{pid}/fd")).map_err(proc_error)?;
        let mut counts = DescriptorCounts::default();
        for entry in entries.flatten() {
            // A descriptor closed between listing and readlink is simply skipped.
            let Ok(target) = fs::read_link(entry.path()) else {
                continue;
            };
            let target = target.to_string_lossy();
            if target.starts_with("socket:") {
                counts.sockets += 1;
            } else if target.starts_with('/') {
                counts.files += 1;
            }
        }
        Ok(counts)
    }
}
