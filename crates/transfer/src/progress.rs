use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Sample {
    bytes: u64,
    at: Instant,
}

/// Transfer-speed accounting over a sliding window of acknowledged chunks.
///
/// Feeds the speed and ETA fields of progress events. With fewer than two
/// samples in the window there is nothing to divide by, so the rate is 0.
pub struct SpeedCalculator {
    inner: Mutex<Inner>,
}

struct Inner {
    samples: Vec<Sample>,
    window: Duration,
}

impl SpeedCalculator {
    /// Creates a calculator with the given sliding window (default 5 s).
    pub fn new(window: Option<Duration>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                samples: Vec::new(),
                window: window.unwrap_or(Duration::from_secs(5)),
            }),
        }
    }

    /// Records `bytes` acknowledged at the current instant.
    pub fn record(&self, bytes: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        inner.samples.push(Sample { bytes, at: now });
        let cutoff = now - inner.window;
        inner.samples.retain(|s| s.at >= cutoff);
    }

    /// Average rate in bytes/second within the window.
    pub fn bytes_per_second(&self) -> f64 {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.samples.len() < 2 {
            return 0.0;
        }
        let first = &inner.samples[0];
        let last = &inner.samples[inner.samples.len() - 1];
        let elapsed = last.at.duration_since(first.at);
        if elapsed.is_zero() {
            return 0.0;
        }
        let total: u64 = inner.samples.iter().map(|s| s.bytes).sum();
        total as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to transfer `remaining` bytes, `None` at rate 0.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let rate = self.bytes_per_second();
        if rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }
}
