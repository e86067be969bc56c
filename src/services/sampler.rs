//! Polling sampler
//!
//! Reads a provider on an interval, feeds each raw reading through a
//! stabilizer and hands the result to the caller.

use crate::stabilizer::{now_millis, StabilizerPhase, UsageStabilizer};
use crate::usage::UsageProvider;

use serde::Serialize;
use std::sync::mpsc::{channel, Receiver};
use std::thread;
use std::time::{Duration, Instant};

/// One poll result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageSample {
    /// Milliseconds since the Unix epoch, non-decreasing per sampler
    pub timestamp_ms: i64,
    /// Provider reading, `-1` on failure
    pub raw: i32,
    /// Stabilized value
    pub stable: i32,
    /// Stabilizer phase after this sample
    pub phase: StabilizerPhase,
}

/// Provider + stabilizer polling loop
pub struct Sampler<P: UsageProvider> {
    provider: P,
    stabilizer: UsageStabilizer,
    interval: Duration,
    epoch_ms: i64,
    started: Instant,
}

impl<P: UsageProvider> Sampler<P> {
    /// Create a sampler polling `provider` every `interval`
    pub fn new(provider: P, stabilizer: UsageStabilizer, interval: Duration) -> Self {
        Self {
            provider,
            stabilizer,
            interval,
            epoch_ms: now_millis(),
            started: Instant::now(),
        }
    }

    /// Wall-clock timestamp that never goes backwards
    fn timestamp_ms(&self) -> i64 {
        self.epoch_ms + self.started.elapsed().as_millis() as i64
    }

    /// Take one sample now
    pub fn tick(&self) -> UsageSample {
        self.tick_at(self.timestamp_ms())
    }

    /// Take one sample stamped with `now_ms`
    pub fn tick_at(&self, now_ms: i64) -> UsageSample {
        let raw = self.provider.read_usage_percent();
        let stable = self.stabilizer.update(raw, now_ms);

        UsageSample {
            timestamp_ms: now_ms,
            raw,
            stable,
            phase: self.stabilizer.phase(),
        }
    }

    /// Poll until `max_ticks` samples were taken (forever if `None`)
    ///
    /// Stops early with the callback's error the first time it fails.
    /// Returns the number of samples taken.
    pub fn run<F, E>(&self, max_ticks: Option<u64>, mut on_sample: F) -> Result<u64, E>
    where
        F: FnMut(&UsageSample) -> Result<(), E>,
    {
        let limit_reached = |ticks: u64| max_ticks.is_some_and(|max| ticks >= max);
        let mut ticks = 0;

        while !limit_reached(ticks) {
            let sample = self.tick();
            ticks += 1;
            if let Err(e) = on_sample(&sample) {
                log::debug!("Sampler stopped by consumer after {} ticks", ticks);
                return Err(e);
            }

            if limit_reached(ticks) {
                break;
            }
            thread::sleep(self.interval);
        }

        log::debug!("Sampler finished after {} ticks", ticks);
        Ok(ticks)
    }

    /// Poll on a background thread
    ///
    /// The thread stops once the returned receiver is dropped.
    pub fn spawn(self) -> Receiver<UsageSample>
    where
        P: 'static,
    {
        let (tx, rx) = channel();
        log::info!("Starting GPU usage sampler ({:?} interval)", self.interval);

        thread::spawn(move || loop {
            if tx.send(self.tick()).is_err() {
                log::debug!("Sampler receiver dropped, stopping");
                self.provider.close();
                break;
            }
            thread::sleep(self.interval);
        });

        rx
    }

    /// The stabilizer fed by this sampler
    pub fn stabilizer(&self) -> &UsageStabilizer {
        &self.stabilizer
    }

    /// Poll interval
    pub fn interval(&self) -> Duration {
        self.interval
    }
}
