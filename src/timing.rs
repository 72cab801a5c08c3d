//! Phase timing.

use std::time::{Duration, Instant};
use tracing::info;

/// Measures one phase of a command and logs its duration when finished.
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    /// Log the elapsed time and return it.
    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        let secs = elapsed.as_secs_f64();
        if secs >= 60.0 {
            info!(phase = %self.name, "[{:.1}m] {}", secs / 60.0, self.name);
        } else {
            info!(phase = %self.name, "[{:.1}s] {}", secs, self.name);
        }
        elapsed
    }
}
