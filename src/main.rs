use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use tracing_subscriber::EnvFilter;

use procwatch::config::{Config, load_config, load_config_from_path};
use procwatch::format::{format_bytes, format_rate, truncate_chars};
use procwatch::monitor::Monitor;
use procwatch::system::collector::Collector;
use procwatch::system::process::ProcessRecord;
use procwatch::system::signal::{OsSignals, SignalDispatcher, SignalKind};
use procwatch::tree::{build_tree, flatten, tree_prefix};

#[derive(Parser)]
#[command(
    name = "procwatch",
    about = "Process sampler with tree reconciliation and signal dispatch"
)]
struct Cli {
    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Process list refresh rate in milliseconds
    #[arg(long, global = true)]
    refresh_rate: Option<u64>,

    /// Maximum tree depth before subtrees are re-rooted
    #[arg(long, global = true)]
    max_depth: Option<usize>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print one snapshot of the process table
    Snapshot {
        /// Keep processes whose pid or command contains this text
        #[arg(long)]
        filter: Option<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the process forest
    Tree {
        #[arg(long)]
        filter: Option<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run every sampler and print a status line per published process list
    Watch {
        #[arg(long)]
        filter: Option<String>,
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Send a signal, retrying through the elevation helper if denied
    Signal {
        pid: u32,
        /// term, kill, stop or cont
        signal: SignalKind,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(&cli)?;
    let config = load_config_for_cli(&cli);

    match cli.command {
        Command::Snapshot { filter, json } => {
            let records = sample_once(&config, filter.as_deref()).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_table(&records);
            }
        }
        Command::Tree { filter, json } => {
            let records = sample_once(&config, filter.as_deref()).await;
            let forest = build_tree(&records, config.tree.max_depth);
            if json {
                println!("{}", serde_json::to_string_pretty(&forest)?);
            } else {
                for row in flatten(&forest) {
                    println!(
                        "{:>7} {:>5.1} {}{}",
                        row.item.pid,
                        row.item.cpu_percent,
                        tree_prefix(&row),
                        truncate_chars(&row.item.command, 100)
                    );
                }
            }
        }
        Command::Watch { filter, seconds } => {
            run_watch(&config, filter.as_deref(), seconds.map(Duration::from_secs)).await?;
        }
        Command::Signal { pid, signal } => {
            let dispatcher = SignalDispatcher::new(OsSignals, config.signals.elevation());
            let outcome = dispatcher.send_signal(pid, signal).await;
            if !outcome.succeeded {
                let reason = outcome
                    .detail
                    .or_else(|| outcome.error.map(|e| format!("{e:?}")))
                    .unwrap_or_default();
                return Err(eyre!("failed to send {signal} to PID {pid}: {reason}"));
            }
            let via = if outcome.required_elevation {
                " (elevated)"
            } else {
                ""
            };
            println!("Sent {signal} to PID {pid}{via}");
        }
    }

    Ok(())
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = if cli.log_json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| eyre!("failed to set tracing subscriber: {e}"))
}

fn load_config_for_cli(cli: &Cli) -> Config {
    let mut config = match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };

    if let Some(rate) = cli.refresh_rate {
        config.general.process_list_interval_ms = rate;
    }
    if let Some(depth) = cli.max_depth {
        config.tree.max_depth = depth;
    }

    config
}

/// One snapshot with meaningful CPU figures: usage is measured between two
/// refreshes, so wait the minimum interval after the priming read.
async fn sample_once(config: &Config, filter: Option<&str>) -> Vec<ProcessRecord> {
    let mut collector = Collector::new().command_max_len(config.snapshot.command_max_len);
    collector.prime();
    tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
    collector.take_snapshot_filtered(filter.unwrap_or_default())
}

fn print_table(records: &[ProcessRecord]) {
    println!("    PID    PPID USER          CPU%  MEM%       RSS STATE      COMMAND");
    for r in records {
        println!(
            "{:>7} {:>7} {:<12} {:>5.1} {:>5.1} {:>9} {:<10} {}",
            r.pid,
            r.ppid,
            truncate_chars(&r.user, 12),
            r.cpu_percent,
            r.mem_percent,
            format_bytes(r.rss),
            r.status,
            truncate_chars(&r.command, 100)
        );
    }
}

async fn run_watch(config: &Config, filter: Option<&str>, limit: Option<Duration>) -> Result<()> {
    let monitor = Monitor::start(config)?;
    if let Some(filter) = filter {
        monitor.set_filter(filter);
    }

    let deadline = async {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut lists = monitor.subscribe_list();
    loop {
        tokio::select! {
            changed = lists.changed() => {
                if changed.is_err() {
                    break;
                }
                let list = lists.borrow_and_update().clone();
                let status = monitor.latest_status();
                let graphs = monitor.latest_graphs();
                let top = list
                    .records
                    .iter()
                    .max_by(|a, b| a.cpu_percent.total_cmp(&b.cpu_percent))
                    .map(|r| format!("{} {:.1}%", r.name, r.cpu_percent))
                    .unwrap_or_default();
                println!(
                    "#{:<5} {:>5} procs | cpu {:>5.1}% | mem {} / {} ({:.1}%) | disk {:.1}% | io {} | net {} | {} conns | top {}",
                    list.generation,
                    list.records.len(),
                    status.cpu_percent,
                    format_bytes(status.memory_used),
                    format_bytes(status.memory_total),
                    status.memory_percent,
                    status.disk.percent(),
                    format_rate(graphs.latest.disk_per_sec()),
                    format_rate(graphs.latest.network_per_sec()),
                    monitor.latest_network().connections.len(),
                    top
                );
            }
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut deadline => break,
        }
    }

    monitor.shutdown().await;
    Ok(())
}
