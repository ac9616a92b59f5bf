use std::collections::HashMap;
use std::sync::Arc;

use sysinfo::{Disks, Networks, System};
use tokio::sync::watch;

use crate::config::SnapshotConfig;
use crate::scheduler::Sampler;
use crate::system::collector::{Collector, filter_records};
use crate::system::connections::ConnectionTable;
use crate::system::counters::{CounterSample, RateTracker};
use crate::system::history::{GraphHistory, GraphPoint};
use crate::system::io_counters::{disk_totals, interface_counters, network_totals, root_space};
use crate::system::process::ProcessRecord;
use crate::system::snapshot::{
    GraphsSnapshot, InterfaceStats, NetworkSnapshot, ProcessForest, ProcessList, StatusSnapshot,
};
use crate::system::source::ProcessSource;
use crate::tree::build_tree;

/// Record-level options applied after filtering.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ViewOptions {
    pub root_only: bool,
    pub hide_kernel_threads: bool,
}

impl ViewOptions {
    pub fn from_config(config: &SnapshotConfig) -> Self {
        ViewOptions {
            root_only: config.root_only,
            hide_kernel_threads: config.hide_kernel_threads,
        }
    }

    fn apply(self, mut records: Vec<ProcessRecord>) -> Vec<ProcessRecord> {
        if self.root_only {
            records.retain(|r| r.user == "root");
        }
        if self.hide_kernel_threads {
            records.retain(|r| !r.is_kernel_thread());
        }
        records
    }
}

fn visible_records<S: ProcessSource>(
    collector: &mut Collector<S>,
    filter: &watch::Receiver<String>,
    options: ViewOptions,
) -> (String, Vec<ProcessRecord>) {
    let query = filter.borrow().clone();
    let records = options.apply(filter_records(collector.take_snapshot(), &query));
    (query, records)
}

pub(crate) struct ProcessListSampler<S> {
    pub collector: Collector<S>,
    pub filter: watch::Receiver<String>,
    pub options: ViewOptions,
    pub publish: watch::Sender<Arc<ProcessList>>,
    pub generation: u64,
}

impl<S: ProcessSource + Send + 'static> Sampler for ProcessListSampler<S> {
    fn sample(&mut self) {
        let (filter, records) = visible_records(&mut self.collector, &self.filter, self.options);
        self.generation += 1;
        self.publish.send_replace(Arc::new(ProcessList {
            generation: self.generation,
            filter,
            records,
        }));
    }
}

pub(crate) struct TreeSampler<S> {
    pub collector: Collector<S>,
    pub filter: watch::Receiver<String>,
    pub options: ViewOptions,
    pub max_depth: usize,
    pub publish: watch::Sender<Arc<ProcessForest>>,
    pub generation: u64,
}

impl<S: ProcessSource + Send + 'static> Sampler for TreeSampler<S> {
    fn sample(&mut self) {
        let (filter, records) = visible_records(&mut self.collector, &self.filter, self.options);
        let roots = build_tree(&records, self.max_depth);
        self.generation += 1;
        self.publish.send_replace(Arc::new(ProcessForest {
            generation: self.generation,
            filter,
            max_depth: self.max_depth,
            roots,
        }));
    }
}

pub(crate) struct GraphsSampler {
    sys: System,
    disks: Disks,
    networks: Networks,
    disk_read: RateTracker,
    disk_write: RateTracker,
    net_sent: RateTracker,
    net_recv: RateTracker,
    history: GraphHistory,
    publish: watch::Sender<Arc<GraphsSnapshot>>,
    generation: u64,
}

impl GraphsSampler {
    pub fn new(history_length: usize, publish: watch::Sender<Arc<GraphsSnapshot>>) -> Self {
        GraphsSampler {
            sys: System::new(),
            disks: Disks::new(),
            networks: Networks::new(),
            disk_read: RateTracker::new(),
            disk_write: RateTracker::new(),
            net_sent: RateTracker::new(),
            net_recv: RateTracker::new(),
            history: GraphHistory::new(history_length),
            publish,
            generation: 0,
        }
    }
}

impl Sampler for GraphsSampler {
    fn sample(&mut self) {
        self.sys.refresh_cpu_all();
        self.sys.refresh_memory();
        self.disks.refresh(true);
        self.networks.refresh(true);

        let disk = disk_totals(&self.disks);
        let net = network_totals(&self.networks);
        let point = GraphPoint {
            cpu_percent: f64::from(self.sys.global_cpu_usage()),
            memory_percent: percent(self.sys.used_memory(), self.sys.total_memory()),
            disk_read_per_sec: self.disk_read.update(CounterSample::now(disk.read_bytes)),
            disk_write_per_sec: self.disk_write.update(CounterSample::now(disk.written_bytes)),
            net_sent_per_sec: self.net_sent.update(CounterSample::now(net.transmitted_bytes)),
            net_recv_per_sec: self.net_recv.update(CounterSample::now(net.received_bytes)),
        };
        self.history.record(&point);

        self.generation += 1;
        self.publish.send_replace(Arc::new(GraphsSnapshot {
            generation: self.generation,
            latest: point,
            history: self.history.clone(),
        }));
    }
}

pub(crate) struct StatusSampler {
    sys: System,
    disks: Disks,
    list: watch::Receiver<Arc<ProcessList>>,
    publish: watch::Sender<Arc<StatusSnapshot>>,
}

impl StatusSampler {
    pub fn new(
        list: watch::Receiver<Arc<ProcessList>>,
        publish: watch::Sender<Arc<StatusSnapshot>>,
    ) -> Self {
        StatusSampler {
            sys: System::new(),
            disks: Disks::new(),
            list,
            publish,
        }
    }
}

impl Sampler for StatusSampler {
    fn sample(&mut self) {
        self.sys.refresh_cpu_all();
        self.sys.refresh_memory();
        self.disks.refresh(true);

        let memory_used = self.sys.used_memory();
        let memory_total = self.sys.total_memory();
        let process_count = self.list.borrow().records.len();
        self.publish.send_replace(Arc::new(StatusSnapshot {
            cpu_percent: self.sys.global_cpu_usage(),
            memory_used,
            memory_total,
            memory_percent: percent(memory_used, memory_total),
            disk: root_space(&self.disks),
            process_count,
        }));
    }
}

#[derive(Default)]
struct InterfaceRates {
    sent: RateTracker,
    recv: RateTracker,
}

pub(crate) struct NetworkSampler {
    networks: Networks,
    connections: ConnectionTable,
    rates: HashMap<String, InterfaceRates>,
    publish: watch::Sender<Arc<NetworkSnapshot>>,
    generation: u64,
}

impl NetworkSampler {
    pub fn new(publish: watch::Sender<Arc<NetworkSnapshot>>) -> Self {
        NetworkSampler {
            networks: Networks::new(),
            connections: ConnectionTable::new(),
            rates: HashMap::new(),
            publish,
            generation: 0,
        }
    }
}

impl Sampler for NetworkSampler {
    fn sample(&mut self) {
        self.networks.refresh(true);
        let counters = interface_counters(&self.networks);
        self.rates
            .retain(|name, _| counters.iter().any(|c| &c.name == name));

        let interfaces = counters
            .into_iter()
            .map(|counters| {
                let rates = self.rates.entry(counters.name.clone()).or_default();
                InterfaceStats {
                    sent_per_sec: rates.sent.update(CounterSample::now(counters.bytes_sent)),
                    recv_per_sec: rates.recv.update(CounterSample::now(counters.bytes_recv)),
                    counters,
                }
            })
            .collect();

        let connections = self.connections.sample();

        self.generation += 1;
        self.publish.send_replace(Arc::new(NetworkSnapshot {
            generation: self.generation,
            interfaces,
            connections,
        }));
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::collector::tests::MockSource;

    fn mock_table() -> MockSource {
        let mut source = MockSource::default()
            .with(1, 0, "init")
            .with(2, 0, "kthreadd")
            .with(200, 1, "sshd")
            .with(411, 200, "ssh-agent")
            .with(500, 1, "bash");
        if let Some(kthread) = source.procs.get_mut(&2) {
            kthread.argv.clear();
        }
        source.owners.insert(1, "root");
        source.owners.insert(200, "root");
        source
    }

    fn list_sampler(
        options: ViewOptions,
        filter: &str,
    ) -> (ProcessListSampler<MockSource>, watch::Receiver<Arc<ProcessList>>) {
        let (_filter_tx, filter_rx) = watch::channel(filter.to_string());
        let (publish, published) = watch::channel(Arc::new(ProcessList::default()));
        let sampler = ProcessListSampler {
            collector: Collector::with_source(mock_table()),
            filter: filter_rx,
            options,
            publish,
            generation: 0,
        };
        (sampler, published)
    }

    fn pids(records: &[ProcessRecord]) -> Vec<u32> {
        records.iter().map(|r| r.pid).collect()
    }

    #[test]
    fn list_sampler_publishes_new_generations() {
        let (mut sampler, published) = list_sampler(ViewOptions::default(), "");
        sampler.sample();
        sampler.sample();
        let list = published.borrow().clone();
        assert_eq!(list.generation, 2);
        assert_eq!(pids(&list.records), vec![1, 2, 200, 411, 500]);
    }

    #[test]
    fn view_options_drop_kernel_threads_and_non_root() {
        let options = ViewOptions {
            root_only: true,
            hide_kernel_threads: true,
        };
        let (mut sampler, published) = list_sampler(options, "");
        sampler.sample();
        assert_eq!(pids(&published.borrow().records), vec![1, 200]);

        let options = ViewOptions {
            root_only: false,
            hide_kernel_threads: true,
        };
        let (mut sampler, published) = list_sampler(options, "");
        sampler.sample();
        assert_eq!(pids(&published.borrow().records), vec![1, 200, 411, 500]);
    }

    #[test]
    fn tree_sampler_builds_from_filtered_records() {
        let (_filter_tx, filter_rx) = watch::channel("ssh".to_string());
        let (publish, published) = watch::channel(Arc::new(ProcessForest::default()));
        let mut sampler = TreeSampler {
            collector: Collector::with_source(mock_table()),
            filter: filter_rx,
            options: ViewOptions::default(),
            max_depth: 10,
            publish,
            generation: 0,
        };
        sampler.sample();

        let forest = published.borrow().clone();
        assert_eq!(forest.filter, "ssh");
        assert_eq!(forest.node_count(), 2);
        assert_eq!(forest.roots.len(), 1);
        assert_eq!(forest.roots[0].item.pid, 200);
        assert_eq!(forest.roots[0].children[0].item.pid, 411);
    }

    #[test]
    fn network_sampler_reports_sorted_interfaces() {
        let (publish, published) = watch::channel(Arc::new(NetworkSnapshot::default()));
        let mut sampler = NetworkSampler::new(publish);
        sampler.sample();
        let snapshot = published.borrow().clone();
        assert_eq!(snapshot.generation, 1);
        assert!(snapshot.interfaces.iter().all(|i| i.sent_per_sec == 0.0));
        assert!(
            snapshot
                .interfaces
                .windows(2)
                .all(|w| w[0].counters.name <= w[1].counters.name)
        );
        assert!(
            snapshot
                .connections
                .windows(2)
                .all(|w| w[0].pid <= w[1].pid)
        );
    }

    #[test]
    fn graphs_sampler_appends_history() {
        let (publish, published) = watch::channel(Arc::new(GraphsSnapshot::default()));
        let mut sampler = GraphsSampler::new(3, publish);
        for _ in 0..5 {
            sampler.sample();
        }
        let snapshot = published.borrow().clone();
        assert_eq!(snapshot.generation, 5);
        assert_eq!(snapshot.history.cpu.len(), 3);
        assert!(snapshot.latest.memory_percent >= 0.0);
    }

    #[test]
    fn status_sampler_counts_latest_list() {
        let list = ProcessList {
            generation: 1,
            filter: String::new(),
            records: Vec::new(),
        };
        let (_list_tx, list_rx) = watch::channel(Arc::new(list));
        let (publish, published) = watch::channel(Arc::new(StatusSnapshot::default()));
        let mut sampler = StatusSampler::new(list_rx, publish);
        sampler.sample();
        let status = **published.borrow();
        assert_eq!(status.process_count, 0);
        assert!(status.memory_total > 0);
        assert!(status.memory_used <= status.memory_total);
    }
}
