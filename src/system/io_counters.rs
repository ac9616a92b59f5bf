//! Cumulative disk and network counters read from `sysinfo`.

use std::path::Path;

use serde::Serialize;
use sysinfo::{Disks, Networks};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiskTotals {
    pub read_bytes: u64,
    pub written_bytes: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetworkTotals {
    pub received_bytes: u64,
    pub transmitted_bytes: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceCounters {
    pub name: String,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SpaceUsage {
    pub used: u64,
    pub total: u64,
}

impl SpaceUsage {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.used as f64 / self.total as f64 * 100.0
        }
    }
}

pub fn disk_totals(disks: &Disks) -> DiskTotals {
    disks.iter().fold(DiskTotals::default(), |acc, disk| {
        let usage = disk.usage();
        DiskTotals {
            read_bytes: acc.read_bytes.saturating_add(usage.total_read_bytes),
            written_bytes: acc.written_bytes.saturating_add(usage.total_written_bytes),
        }
    })
}

pub fn network_totals(networks: &Networks) -> NetworkTotals {
    networks
        .values()
        .fold(NetworkTotals::default(), |acc, data| NetworkTotals {
            received_bytes: acc.received_bytes.saturating_add(data.total_received()),
            transmitted_bytes: acc
                .transmitted_bytes
                .saturating_add(data.total_transmitted()),
        })
}

/// Per-interface counters, ordered by interface name.
pub fn interface_counters(networks: &Networks) -> Vec<InterfaceCounters> {
    let mut interfaces: Vec<InterfaceCounters> = networks
        .iter()
        .map(|(name, data)| InterfaceCounters {
            name: name.to_string(),
            bytes_sent: data.total_transmitted(),
            bytes_recv: data.total_received(),
            packets_sent: data.total_packets_transmitted(),
            packets_recv: data.total_packets_received(),
        })
        .collect();
    interfaces.sort_by(|a, b| a.name.cmp(&b.name));
    interfaces
}

/// Space usage of the filesystem mounted at `/`, or of the first listed
/// disk when there is no such mount.
pub fn root_space(disks: &Disks) -> SpaceUsage {
    let root = disks
        .iter()
        .find(|disk| disk.mount_point() == Path::new("/"))
        .or_else(|| disks.iter().next());
    match root {
        Some(disk) => {
            let total = disk.total_space();
            SpaceUsage {
                used: total.saturating_sub(disk.available_space()),
                total,
            }
        }
        None => SpaceUsage::default(),
    }
}
