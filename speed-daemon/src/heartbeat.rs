//! Per-connection heartbeat scheduling (§4.4's `WantHeartbeat`/`Heartbeat`).

use std::future;
use std::time::Duration;

use tokio::time::{self, Instant};

/// Deciseconds, as carried on the wire, are converted to a `Duration`
/// up front so the rest of the connection loop only deals with ticks.
pub fn deciseconds_to_duration(deciseconds: u32) -> Duration {
    Duration::from_millis(u64::from(deciseconds) * 100)
}

#[derive(Debug, Default)]
pub struct Heartbeat {
    interval: Option<time::Interval>,
    requested: bool,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the heartbeat at `period`, or disarms it if `period` is
    /// zero (the client declining heartbeats, the wire default).
    pub fn set_period(&mut self, period: Duration) {
        self.requested = true;
        self.interval = (period != Duration::ZERO).then(|| time::interval_at(Instant::now() + period, period));
    }

    /// Resolves on the next scheduled heartbeat, or never if none is
    /// armed, so it composes cleanly inside a `tokio::select!` arm.
    pub async fn tick(&mut self) {
        if let Some(interval) = self.interval.as_mut() {
            interval.tick().await;
        } else {
            future::pending::<()>().await;
        }
    }

    /// A `WantHeartbeat` may only be sent once per connection.
    pub fn already_requested(&self) -> bool {
        self.requested
    }
}
