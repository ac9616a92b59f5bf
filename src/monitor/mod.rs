//! Wires the samplers to the scheduler and publishes their output.
//!
//! Every view is an `Arc` behind a `watch` channel. Consumers either read
//! the latest value or subscribe and await changes; nothing is pushed to
//! them, and a published value is never mutated afterwards.

mod samplers;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::scheduler::{Scheduler, SchedulerError, TaskKind, TaskTrigger};
use crate::system::collector::Collector;
use crate::system::signal::{OsSignals, SignalDispatcher, SignalKind, SignalOutcome};
use crate::system::snapshot::{
    GraphsSnapshot, NetworkSnapshot, ProcessForest, ProcessList, StatusSnapshot,
};

use samplers::{
    GraphsSampler, NetworkSampler, ProcessListSampler, StatusSampler, TreeSampler, ViewOptions,
};

pub struct Monitor {
    scheduler: Scheduler,
    filter: watch::Sender<String>,
    list: watch::Receiver<Arc<ProcessList>>,
    forest: watch::Receiver<Arc<ProcessForest>>,
    graphs: watch::Receiver<Arc<GraphsSnapshot>>,
    status: watch::Receiver<Arc<StatusSnapshot>>,
    network: watch::Receiver<Arc<NetworkSnapshot>>,
    dispatcher: Arc<SignalDispatcher>,
    config: Config,
}

impl Monitor {
    /// Start every sampling task. Must be called from within a tokio runtime.
    pub fn start(config: &Config) -> Result<Self, SchedulerError> {
        let general = &config.general;
        let options = ViewOptions::from_config(&config.snapshot);

        let (filter, filter_rx) = watch::channel(String::new());
        let (list_tx, list) = watch::channel(Arc::new(ProcessList::default()));
        let (forest_tx, forest) = watch::channel(Arc::new(ProcessForest::default()));
        let (graphs_tx, graphs) = watch::channel(Arc::new(GraphsSnapshot::default()));
        let (status_tx, status) = watch::channel(Arc::new(StatusSnapshot::default()));
        let (network_tx, network) = watch::channel(Arc::new(NetworkSnapshot::default()));

        let mut scheduler = Scheduler::new();
        scheduler.spawn(
            TaskKind::ProcessList,
            general.period(TaskKind::ProcessList),
            ProcessListSampler {
                collector: Collector::new().command_max_len(config.snapshot.command_max_len),
                filter: filter_rx.clone(),
                options,
                publish: list_tx,
                generation: 0,
            },
        )?;
        scheduler.spawn(
            TaskKind::ProcessTree,
            general.period(TaskKind::ProcessTree),
            TreeSampler {
                collector: Collector::new().command_max_len(config.snapshot.command_max_len),
                filter: filter_rx,
                options,
                max_depth: config.tree.max_depth,
                publish: forest_tx,
                generation: 0,
            },
        )?;
        scheduler.spawn(
            TaskKind::Graphs,
            general.period(TaskKind::Graphs),
            GraphsSampler::new(general.history_length, graphs_tx),
        )?;
        scheduler.spawn(
            TaskKind::StatusBar,
            general.period(TaskKind::StatusBar),
            StatusSampler::new(list.clone(), status_tx),
        )?;
        scheduler.spawn(
            TaskKind::Network,
            general.period(TaskKind::Network),
            NetworkSampler::new(network_tx),
        )?;

        if !general.auto_refresh {
            scheduler.set_paused(TaskKind::ProcessList, true);
        }
        tracing::info!(auto_refresh = general.auto_refresh, "monitor started");

        Ok(Monitor {
            scheduler,
            filter,
            list,
            forest,
            graphs,
            status,
            network,
            dispatcher: Arc::new(SignalDispatcher::new(OsSignals, config.signals.elevation())),
            config: config.clone(),
        })
    }

    pub fn latest_list(&self) -> Arc<ProcessList> {
        Arc::clone(&self.list.borrow())
    }

    pub fn latest_forest(&self) -> Arc<ProcessForest> {
        Arc::clone(&self.forest.borrow())
    }

    pub fn latest_graphs(&self) -> Arc<GraphsSnapshot> {
        Arc::clone(&self.graphs.borrow())
    }

    pub fn latest_status(&self) -> Arc<StatusSnapshot> {
        Arc::clone(&self.status.borrow())
    }

    pub fn latest_network(&self) -> Arc<NetworkSnapshot> {
        Arc::clone(&self.network.borrow())
    }

    pub fn subscribe_list(&self) -> watch::Receiver<Arc<ProcessList>> {
        self.list.clone()
    }

    pub fn subscribe_forest(&self) -> watch::Receiver<Arc<ProcessForest>> {
        self.forest.clone()
    }

    pub fn subscribe_graphs(&self) -> watch::Receiver<Arc<GraphsSnapshot>> {
        self.graphs.clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<Arc<StatusSnapshot>> {
        self.status.clone()
    }

    pub fn subscribe_network(&self) -> watch::Receiver<Arc<NetworkSnapshot>> {
        self.network.clone()
    }

    /// Restrict the list and tree views to records whose pid or command
    /// contains `query`. An empty query clears the filter.
    pub fn set_filter(&self, query: &str) {
        let needle = query.trim().to_lowercase();
        if self.filter.send_if_modified(|current| {
            if *current == needle {
                return false;
            }
            *current = needle.clone();
            true
        }) {
            tracing::debug!(filter = %needle, "filter changed");
            self.refresh_now();
        }
    }

    pub fn filter(&self) -> String {
        self.filter.borrow().clone()
    }

    /// Toggle periodic process-list sampling. The other views keep running.
    pub fn set_auto_refresh(&self, enabled: bool) {
        self.scheduler.set_paused(TaskKind::ProcessList, !enabled);
    }

    pub fn auto_refresh(&self) -> bool {
        !self.scheduler.is_paused(TaskKind::ProcessList)
    }

    /// Re-sample the process list and tree right away.
    pub fn refresh_now(&self) {
        self.scheduler.trigger_now(TaskKind::ProcessList);
        self.scheduler.trigger_now(TaskKind::ProcessTree);
    }

    /// Dispatch a signal on its own task. After a successful delivery the
    /// list and tree are re-sampled once the configured delay has passed.
    pub fn spawn_signal(&self, pid: u32, kind: SignalKind) -> JoinHandle<SignalOutcome> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let delay = self.config.signals.resample_delay();
        let triggers: Vec<TaskTrigger> = [TaskKind::ProcessList, TaskKind::ProcessTree]
            .into_iter()
            .filter_map(|task| self.scheduler.trigger_handle(task))
            .collect();

        tokio::spawn(async move {
            let outcome = dispatcher.send_signal(pid, kind).await;
            if outcome.succeeded {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    for trigger in &triggers {
                        trigger.fire();
                    }
                });
            }
            outcome
        })
    }

    pub async fn send_signal(&self, pid: u32, kind: SignalKind) -> SignalOutcome {
        match self.spawn_signal(pid, kind).await {
            Ok(outcome) => outcome,
            Err(err) => SignalOutcome::aborted(err.to_string()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn shutdown(mut self) {
        self.scheduler.shutdown().await;
        tracing::info!("monitor stopped");
    }
}
