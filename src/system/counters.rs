use std::time::Instant;

/// One reading of a monotonically increasing OS counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CounterSample {
    pub value: u64,
    pub at: Instant,
}

impl CounterSample {
    pub fn new(value: u64, at: Instant) -> Self {
        Self { value, at }
    }

    pub fn now(value: u64) -> Self {
        Self::new(value, Instant::now())
    }
}

/// Per-second rate between two readings, plus the sample to keep for the
/// next call. Never negative: a first reading, a counter that went
/// backwards (device replaced, counter wrapped) or a zero interval all
/// yield 0.
pub fn compute_rate(previous: Option<CounterSample>, current: CounterSample) -> (f64, CounterSample) {
    let Some(previous) = previous else {
        return (0.0, current);
    };
    if current.value < previous.value {
        return (0.0, current);
    }
    let elapsed = current.at.saturating_duration_since(previous.at).as_secs_f64();
    if elapsed <= 0.0 {
        return (0.0, current);
    }
    ((current.value - previous.value) as f64 / elapsed, current)
}

/// Owns the previous reading of one counter.
#[derive(Clone, Debug, Default)]
pub struct RateTracker {
    previous: Option<CounterSample>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, current: CounterSample) -> f64 {
        let (rate, previous) = compute_rate(self.previous, current);
        self.previous = Some(previous);
        rate
    }

    pub fn previous(&self) -> Option<CounterSample> {
        self.previous
    }
}
