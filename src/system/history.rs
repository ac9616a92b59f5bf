use std::collections::VecDeque;

use serde::Serialize;

pub const DEFAULT_CAPACITY: usize = 60;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SeriesStats {
    pub avg: f64,
    pub max: f64,
    pub min: f64,
}

/// Fixed-capacity ring of the most recent values of one metric.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesHistory {
    values: VecDeque<f64>,
    #[serde(skip)]
    capacity: usize,
}

impl SeriesHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.capacity == 0 {
            return;
        }
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn values(&self) -> &VecDeque<f64> {
        &self.values
    }

    pub fn latest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn stats(&self) -> Option<SeriesStats> {
        if self.values.is_empty() {
            return None;
        }
        let sum: f64 = self.values.iter().sum();
        let max = self.values.iter().copied().fold(f64::MIN, f64::max);
        let min = self.values.iter().copied().fold(f64::MAX, f64::min);
        Some(SeriesStats {
            avg: sum / self.values.len() as f64,
            max,
            min,
        })
    }
}

impl Default for SeriesHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// One graphs tick worth of values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct GraphPoint {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_read_per_sec: f64,
    pub disk_write_per_sec: f64,
    pub net_sent_per_sec: f64,
    pub net_recv_per_sec: f64,
}

impl GraphPoint {
    pub fn disk_per_sec(&self) -> f64 {
        self.disk_read_per_sec + self.disk_write_per_sec
    }

    pub fn network_per_sec(&self) -> f64 {
        self.net_sent_per_sec + self.net_recv_per_sec
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphHistory {
    pub cpu: SeriesHistory,
    pub memory: SeriesHistory,
    pub disk: SeriesHistory,
    pub network: SeriesHistory,
}

impl GraphHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            cpu: SeriesHistory::new(capacity),
            memory: SeriesHistory::new(capacity),
            disk: SeriesHistory::new(capacity),
            network: SeriesHistory::new(capacity),
        }
    }

    pub fn record(&mut self, point: &GraphPoint) {
        self.cpu.push(point.cpu_percent);
        self.memory.push(point.memory_percent);
        self.disk.push(point.disk_per_sec());
        self.network.push(point.network_per_sec());
    }
}
