use crate::format::truncate_chars;

use super::platform::{DescriptorCounts, SchedStats};
use super::process::{CpuTimes, ProcessRecord, ProcessState, UNAVAILABLE};
use super::source::{FieldError, FieldResult, MemoryUsage, ProcessSource, SysinfoSource};

pub const DEFAULT_COMMAND_MAX_LEN: usize = 500;

/// Snapshot reader: turns the OS process table into fully resolved records.
pub struct Collector<S = SysinfoSource> {
    source: S,
    command_max_len: usize,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    pub fn new() -> Self {
        Collector::with_source(SysinfoSource::new())
    }
}

impl<S: ProcessSource> Collector<S> {
    pub fn with_source(source: S) -> Self {
        Collector {
            source,
            command_max_len: DEFAULT_COMMAND_MAX_LEN,
        }
    }

    pub fn command_max_len(mut self, max_chars: usize) -> Self {
        self.command_max_len = max_chars;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Take the baseline reading that per-process CPU usage is measured
    /// against, without resolving any records.
    pub fn prime(&mut self) {
        self.source.refresh();
    }

    /// Every visible process, ordered by pid. Processes that exit while
    /// being read are left out.
    pub fn take_snapshot(&mut self) -> Vec<ProcessRecord> {
        let _refresh_span = tracing::debug_span!("collector.refresh").entered();

        self.source.refresh();
        let total_memory = self.source.total_memory();

        let mut pids = self.source.pids();
        pids.sort_unstable();

        let mut records = Vec::with_capacity(pids.len());
        let mut dropped = 0usize;
        for pid in pids {
            match self.resolve(pid, total_memory) {
                Some(record) => records.push(record),
                None => dropped += 1,
            }
        }

        tracing::debug!(
            resolved = records.len(),
            dropped,
            "process snapshot taken"
        );
        records
    }

    /// Same defensive extraction as [`take_snapshot`](Self::take_snapshot),
    /// then keep records whose pid or command contains `query`
    /// (case-insensitive).
    pub fn take_snapshot_filtered(&mut self, query: &str) -> Vec<ProcessRecord> {
        let records = self.take_snapshot();
        filter_records(records, query)
    }

    fn resolve(&self, pid: u32, total_memory: u64) -> Option<ProcessRecord> {
        let source = &self.source;
        let identity = source.identity(pid).ok()?;

        let argv = settle(pid, "command", source.command(pid), Vec::new)?;
        let command = if argv.is_empty() {
            format!("[{}]", identity.name)
        } else {
            argv.join(" ")
        };
        let user = settle(pid, "user", source.user(pid), || UNAVAILABLE.to_string())?;
        let memory = settle(pid, "memory", source.memory(pid), MemoryUsage::default)?;
        let cpu_percent = settle(pid, "cpu_percent", source.cpu_percent(pid), || 0.0)?;
        let status = settle(pid, "status", source.status(pid), || ProcessState::Unknown)?;
        let sched = source.sched_stats(pid).unwrap_or_else(SchedStats::failed);
        let threads = settle(pid, "threads", sched.threads, || 0)?;
        let priority = settle(pid, "nice", sched.nice, || 0)?;
        let cpu_times = settle(pid, "cpu_times", sched.cpu_times, CpuTimes::default)?;
        let created_at = settle(pid, "created_at", source.created_at(pid).map(Some), || None)?;
        let descriptors = settle(
            pid,
            "descriptors",
            source.descriptors(pid),
            DescriptorCounts::default,
        )?;
        let cwd = settle(pid, "cwd", source.cwd(pid), || UNAVAILABLE.to_string())?;

        let mem_percent = if total_memory > 0 {
            (memory.rss as f64 / total_memory as f64 * 100.0) as f32
        } else {
            0.0
        };

        Some(ProcessRecord {
            pid,
            ppid: identity.ppid.unwrap_or(0),
            name: identity.name,
            user,
            command: truncate_chars(&command, self.command_max_len),
            cwd,
            cpu_percent,
            mem_percent,
            vsz: memory.vsz,
            rss: memory.rss,
            status,
            threads,
            priority,
            created_at,
            cpu_time_user: cpu_times.user,
            cpu_time_sys: cpu_times.system,
            open_files: descriptors.files,
            network_connections: descriptors.sockets,
        })
    }
}

/// Resolve one field read: the value, its sentinel, or `None` when the
/// process is gone and the whole record must be dropped.
fn settle<T>(
    pid: u32,
    field: &'static str,
    result: FieldResult<T>,
    sentinel: impl FnOnce() -> T,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(FieldError::Vanished) => {
            tracing::trace!(pid, field, "process vanished mid-read");
            None
        }
        Err(err) => {
            tracing::trace!(pid, field, %err, "field unavailable, using sentinel");
            Some(sentinel())
        }
    }
}

pub fn filter_records(records: Vec<ProcessRecord>, query: &str) -> Vec<ProcessRecord> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return records;
    }
    records.into_iter().filter(|r| r.matches(&needle)).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::Cell;
    use std::collections::{HashMap, HashSet};

    use super::*;
    use crate::system::source::Identity;

    #[derive(Clone)]
    pub(crate) struct MockProc {
        pub name: &'static str,
        pub ppid: Option<u32>,
        pub argv: Vec<&'static str>,
        pub cpu: f32,
    }

    /// In-memory process table with per-field failure injection.
    #[derive(Default)]
    pub(crate) struct MockSource {
        pub procs: HashMap<u32, MockProc>,
        pub denied: HashSet<(u32, &'static str)>,
        pub vanishing: HashSet<(u32, &'static str)>,
        pub owners: HashMap<u32, &'static str>,
        pub refreshes: usize,
        pub sched_reads: Cell<usize>,
        pub descriptor_reads: Cell<usize>,
    }

    impl MockSource {
        pub(crate) fn with(mut self, pid: u32, ppid: u32, name: &'static str) -> Self {
            self.procs.insert(
                pid,
                MockProc {
                    name,
                    ppid: (ppid != 0).then_some(ppid),
                    argv: vec![name, "--serve"],
                    cpu: 0.0,
                },
            );
            self
        }

        fn check<T>(&self, pid: u32, field: &'static str, value: T) -> FieldResult<T> {
            if !self.procs.contains_key(&pid) || self.vanishing.contains(&(pid, field)) {
                Err(FieldError::Vanished)
            } else if self.denied.contains(&(pid, field)) {
                Err(FieldError::AccessDenied)
            } else {
                Ok(value)
            }
        }

        fn get(&self, pid: u32) -> FieldResult<&MockProc> {
            self.procs.get(&pid).ok_or(FieldError::Vanished)
        }
    }

    impl ProcessSource for MockSource {
        fn refresh(&mut self) {
            self.refreshes += 1;
        }

        fn pids(&self) -> Vec<u32> {
            self.procs.keys().copied().collect()
        }

        fn total_memory(&self) -> u64 {
            1_000_000
        }

        fn identity(&self, pid: u32) -> FieldResult<Identity> {
            let p = self.get(pid)?;
            self.check(
                pid,
                "identity",
                Identity {
                    name: p.name.to_string(),
                    ppid: p.ppid,
                },
            )
        }

        fn command(&self, pid: u32) -> FieldResult<Vec<String>> {
            let p = self.get(pid)?;
            let argv = p.argv.iter().map(|s| s.to_string()).collect();
            self.check(pid, "command", argv)
        }

        fn user(&self, pid: u32) -> FieldResult<String> {
            let owner = self.owners.get(&pid).copied().unwrap_or("tester");
            self.check(pid, "user", owner.to_string())
        }

        fn memory(&self, pid: u32) -> FieldResult<MemoryUsage> {
            self.check(
                pid,
                "memory",
                MemoryUsage {
                    rss: 250_000,
                    vsz: 900_000,
                },
            )
        }

        fn cpu_percent(&self, pid: u32) -> FieldResult<f32> {
            let cpu = self.get(pid)?.cpu;
            self.check(pid, "cpu_percent", cpu)
        }

        fn status(&self, pid: u32) -> FieldResult<ProcessState> {
            self.check(pid, "status", ProcessState::Sleeping)
        }

        fn sched_stats(&self, pid: u32) -> FieldResult<SchedStats> {
            self.sched_reads.set(self.sched_reads.get() + 1);
            self.check(pid, "sched", ())?;
            Ok(SchedStats {
                threads: self.check(pid, "threads", 4),
                nice: self.check(pid, "nice", -5),
                cpu_times: self.check(
                    pid,
                    "cpu_times",
                    CpuTimes {
                        user: 1.5,
                        system: 0.5,
                    },
                ),
            })
        }

        fn created_at(&self, pid: u32) -> FieldResult<u64> {
            self.check(pid, "created_at", 1_700_000_000)
        }

        fn descriptors(&self, pid: u32) -> FieldResult<DescriptorCounts> {
            self.descriptor_reads.set(self.descriptor_reads.get() + 1);
            self.check(
                pid,
                "descriptors",
                DescriptorCounts {
                    files: 7,
                    sockets: 2,
                },
            )
        }

        fn cwd(&self, pid: u32) -> FieldResult<String> {
            self.check(pid, "cwd", format!("/srv/{pid}"))
        }
    }

    fn collector(source: MockSource) -> Collector<MockSource> {
        Collector::with_source(source)
    }

    #[test]
    fn snapshot_resolves_every_field() {
        let mut c = collector(MockSource::default().with(1, 0, "init").with(42, 1, "sshd"));
        let records = c.take_snapshot();
        assert_eq!(c.source().refreshes, 1);
        assert_eq!(records.len(), 2);

        let sshd = &records[1];
        assert_eq!(sshd.pid, 42);
        assert_eq!(sshd.ppid, 1);
        assert_eq!(sshd.command, "sshd --serve");
        assert_eq!(sshd.user, "tester");
        assert_eq!(sshd.cwd, "/srv/42");
        assert_eq!(sshd.rss, 250_000);
        assert_eq!(sshd.vsz, 900_000);
        assert!((sshd.mem_percent - 25.0).abs() < 1e-4);
        assert_eq!(sshd.threads, 4);
        assert_eq!(sshd.priority, -5);
        assert_eq!(sshd.created_at, Some(1_700_000_000));
        assert!((sshd.cpu_time_user - 1.5).abs() < f64::EPSILON);
        assert_eq!(sshd.open_files, 7);
        assert_eq!(sshd.network_connections, 2);
    }

    #[test]
    fn denied_cwd_falls_back_to_sentinel_only() {
        let mut source = MockSource::default().with(7, 1, "daemon");
        source.denied.insert((7, "cwd"));
        let records = collector(source).take_snapshot();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.cwd, UNAVAILABLE);
        assert_eq!(record.user, "tester");
        assert_eq!(record.command, "daemon --serve");
        assert_eq!(record.open_files, 7);
        assert_eq!(record.created_at, Some(1_700_000_000));
    }

    #[test]
    fn denied_attributes_use_documented_sentinels() {
        let mut source = MockSource::default().with(9, 1, "locked");
        for field in [
            "command",
            "user",
            "memory",
            "status",
            "threads",
            "nice",
            "created_at",
            "cpu_times",
            "descriptors",
        ] {
            source.denied.insert((9, field));
        }
        let records = collector(source).take_snapshot();
        let record = &records[0];

        assert_eq!(record.command, "[locked]");
        assert_eq!(record.user, UNAVAILABLE);
        assert_eq!((record.rss, record.vsz), (0, 0));
        assert_eq!(record.mem_percent, 0.0);
        assert_eq!(record.status, ProcessState::Unknown);
        assert_eq!(record.threads, 0);
        assert_eq!(record.priority, 0);
        assert_eq!(record.created_at, None);
        assert_eq!(record.cpu_time_sys, 0.0);
        assert_eq!(record.open_files, 0);
        assert_eq!(record.network_connections, 0);
    }

    #[test]
    fn scheduling_and_descriptors_are_read_once_per_process() {
        let mut c = collector(
            MockSource::default()
                .with(1, 0, "init")
                .with(2, 1, "worker")
                .with(3, 1, "worker"),
        );
        let records = c.take_snapshot();
        assert_eq!(records.len(), 3);
        assert_eq!(c.source().sched_reads.get(), 3);
        assert_eq!(c.source().descriptor_reads.get(), 3);
        assert!(records.iter().all(|r| r.open_files == 7 && r.network_connections == 2));
    }

    #[test]
    fn denied_sched_read_uses_sentinels_for_all_three() {
        let mut source = MockSource::default().with(4, 1, "guarded");
        source.denied.insert((4, "sched"));
        let records = collector(source).take_snapshot();

        let record = &records[0];
        assert_eq!(record.threads, 0);
        assert_eq!(record.priority, 0);
        assert_eq!(record.cpu_time_user, 0.0);
        assert_eq!(record.open_files, 7);
    }

    #[test]
    fn vanishing_during_sched_read_drops_the_record() {
        let mut source = MockSource::default().with(1, 0, "init").with(6, 1, "exiting");
        source.vanishing.insert((6, "sched"));
        let records = collector(source).take_snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pid, 1);
    }

    #[test]
    fn process_vanishing_mid_read_is_dropped() {
        let mut source = MockSource::default()
            .with(1, 0, "init")
            .with(50, 1, "short_lived")
            .with(51, 1, "also_gone");
        source.vanishing.insert((50, "memory"));
        source.vanishing.insert((51, "identity"));
        let records = collector(source).take_snapshot();

        let pids: Vec<u32> = records.iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![1]);
    }

    #[test]
    fn long_commands_are_truncated() {
        let mut source = MockSource::default();
        source.procs.insert(
            3,
            MockProc {
                name: "java",
                ppid: None,
                argv: vec!["java", "-classpath", "a:b:c:d:e:f:g:h:i:j"],
                cpu: 0.0,
            },
        );
        let records = collector(source).command_max_len(10).take_snapshot();
        assert_eq!(records[0].command.chars().count(), 10);
        assert!(records[0].command.starts_with("java -cla"));
    }

    #[test]
    fn filtered_snapshot_matches_pid_or_command() {
        let mut c = collector(
            MockSource::default()
                .with(1, 0, "init")
                .with(200, 1, "sshd")
                .with(310, 200, "bash")
                .with(411, 1, "SSH-agent"),
        );
        let records = c.take_snapshot_filtered("ssh");
        let pids: Vec<u32> = records.iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![200, 411]);

        let by_pid = c.take_snapshot_filtered("31");
        assert_eq!(by_pid.len(), 1);
        assert_eq!(by_pid[0].pid, 310);

        assert_eq!(c.take_snapshot_filtered("  ").len(), 4);
    }

    #[test]
    fn filtering_happens_after_extraction() {
        let mut source = MockSource::default().with(1, 0, "sshd").with(2, 1, "sshd");
        source.vanishing.insert((2, "status"));
        let records = collector(source).take_snapshot_filtered("sshd");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pid, 1);
    }

    #[test]
    fn real_snapshot_contains_current_process() {
        let mut c = Collector::new();
        let records = c.take_snapshot();
        let me = std::process::id();
        let own = records
            .iter()
            .find(|r| r.pid == me)
            .expect("own process missing from snapshot");
        assert!(!own.name.is_empty());
        assert!(!own.command.is_empty());
    }
}
