//! GPU usage stabilizer
//!
//! Turns a stream of raw readings (percentages or failure sentinels) into a
//! value fit for display:
//!
//! - failures within the grace window hold the last good value, after it the
//!   value degrades to the unsupported sentinel;
//! - zeros are only believed after `zero_confirm_count` in a row, unless the
//!   value is already zero;
//! - accepted readings are blended in with an exponential moving average.
//!
//! Samples must be fed in non-decreasing timestamp order.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Lowest accepted smoothing factor
pub const MIN_SMOOTHING_FACTOR: f64 = 0.05;
/// Highest accepted smoothing factor
pub const MAX_SMOOTHING_FACTOR: f64 = 0.95;

/// Stabilizer configuration
///
/// Out-of-range values are clamped when the stabilizer is built, never
/// rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilizerConfig {
    /// How long failures may hold the last good value (ms, >= 0)
    pub failure_grace_ms: i64,
    /// EMA weight of a new reading (0.05-0.95)
    pub smoothing_factor: f64,
    /// Consecutive zeros needed before zero is accepted (>= 1)
    pub zero_confirm_count: i32,
    /// Value reported before any valid sample or after the grace expires
    pub unsupported_value: i32,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            failure_grace_ms: 5000,
            smoothing_factor: 0.3,
            zero_confirm_count: 3,
            unsupported_value: -1,
        }
    }
}

impl StabilizerConfig {
    /// Create a configuration, clamping every field into range
    pub fn new(
        failure_grace_ms: i64,
        smoothing_factor: f64,
        zero_confirm_count: i32,
        unsupported_value: i32,
    ) -> Self {
        Self {
            failure_grace_ms,
            smoothing_factor,
            zero_confirm_count,
            unsupported_value,
        }
        .normalized()
    }

    /// Copy with every field clamped into its valid range
    pub fn normalized(self) -> Self {
        let smoothing_factor = if self.smoothing_factor.is_nan() {
            MIN_SMOOTHING_FACTOR
        } else {
            self.smoothing_factor
                .clamp(MIN_SMOOTHING_FACTOR, MAX_SMOOTHING_FACTOR)
        };

        Self {
            failure_grace_ms: self.failure_grace_ms.max(0),
            smoothing_factor,
            zero_confirm_count: self.zero_confirm_count.max(1),
            unsupported_value: self.unsupported_value,
        }
    }
}

/// Where the stabilizer currently sits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "value", rename_all = "snake_case")]
pub enum StabilizerPhase {
    /// No valid sample yet, or the grace window expired
    Uninitialized,
    /// Last sample failed; value held within the grace window
    Holding(u8),
    /// Zeros seen but not yet confirmed; carries the streak length
    ZeroPending(u32),
    /// Value follows accepted readings
    Stable(u8),
}

#[derive(Debug, Default)]
struct State {
    /// `None` reports as the unsupported value
    stable: Option<u8>,
    zero_streak: u32,
    last_good_ms: Option<i64>,
    holding: bool,
}

/// Thread-safe GPU usage stabilizer
#[derive(Debug)]
pub struct UsageStabilizer {
    config: StabilizerConfig,
    state: Mutex<State>,
}

impl Default for UsageStabilizer {
    fn default() -> Self {
        Self::new(StabilizerConfig::default())
    }
}

impl UsageStabilizer {
    /// Create a stabilizer; the configuration is clamped into range
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            config: config.normalized(),
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn report(&self, stable: Option<u8>) -> i32 {
        stable.map_or(self.config.unsupported_value, i32::from)
    }

    /// Feed a raw reading taken at `now_ms` and return the stabilized value
    ///
    /// Negative `raw` values are failures; values above 100 count as 100.
    pub fn update(&self, raw: i32, now_ms: i64) -> i32 {
        let mut state = self.lock();

        if raw < 0 {
            let stable = self.on_failure(&mut state, now_ms);
            return self.report(stable);
        }

        state.holding = false;
        let raw = raw.min(100) as u8;

        if raw == 0 {
            state.zero_streak = state.zero_streak.saturating_add(1);

            if state.stable == Some(0) {
                state.last_good_ms = Some(now_ms);
                return 0;
            }

            if state.zero_streak < self.config.zero_confirm_count as u32 {
                // Unconfirmed zeros must not extend the grace window.
                return self.report(state.stable);
            }

            state.last_good_ms = Some(now_ms);
            state.stable = Some(self.smooth(state.stable, 0));
            return self.report(state.stable);
        }

        state.zero_streak = 0;
        state.last_good_ms = Some(now_ms);
        state.stable = Some(self.smooth(state.stable, raw));
        self.report(state.stable)
    }

    /// Feed a raw reading stamped with the wall clock
    pub fn update_now(&self, raw: i32) -> i32 {
        self.update(raw, now_millis())
    }

    fn on_failure(&self, state: &mut State, now_ms: i64) -> Option<u8> {
        // Failures never touch `zero_streak` or `last_good_ms`.
        let (Some(stable), Some(last_good)) = (state.stable, state.last_good_ms) else {
            return state.stable;
        };

        if now_ms.saturating_sub(last_good) <= self.config.failure_grace_ms {
            state.holding = true;
            Some(stable)
        } else {
            log::debug!(
                "GPU usage failures outlasted {} ms grace, dropping to unsupported",
                self.config.failure_grace_ms
            );
            state.holding = false;
            state.stable = None;
            None
        }
    }

    /// Exponential moving average toward `next`; first sample is taken as-is
    fn smooth(&self, prev: Option<u8>, next: u8) -> u8 {
        let Some(prev) = prev else {
            return next;
        };

        let prev = f64::from(prev);
        let value = prev + self.config.smoothing_factor * (f64::from(next) - prev);
        value.round().clamp(0.0, 100.0) as u8
    }

    /// Last stabilized value
    pub fn stable(&self) -> i32 {
        self.report(self.lock().stable)
    }

    /// Current phase of the filter
    pub fn phase(&self) -> StabilizerPhase {
        let state = self.lock();
        match state.stable {
            None => StabilizerPhase::Uninitialized,
            Some(value) if state.holding => StabilizerPhase::Holding(value),
            Some(value)
                if value != 0
                    && state.zero_streak > 0
                    && state.zero_streak < self.config.zero_confirm_count as u32 =>
            {
                StabilizerPhase::ZeroPending(state.zero_streak)
            }
            Some(value) => StabilizerPhase::Stable(value),
        }
    }

    /// Forget all history
    pub fn reset(&self) {
        *self.lock() = State::default();
    }

    /// Normalized configuration in use
    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
