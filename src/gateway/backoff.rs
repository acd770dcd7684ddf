//! Reconnect backoff

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shortest delay a backoff ever returns
pub const MIN_DELAY: Duration = Duration::from_millis(1);

/// Exponential backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// First delay after a lost connection
    #[serde(with = "millis")]
    pub initial: Duration,
    /// Upper bound on any delay
    #[serde(with = "millis")]
    pub max: Duration,
    /// Growth per consecutive failure
    pub factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(800),
            max: Duration::from_secs(15),
            factor: 1.7,
        }
    }
}

impl BackoffConfig {
    /// Clamp values that would stall or spin the reconnect loop.
    ///
    /// `initial` and `max` are raised to [`MIN_DELAY`], `max` to at least
    /// `initial`, and a factor below 1 (or NaN) becomes 1.
    pub fn normalized(self) -> Self {
        let initial = self.initial.max(MIN_DELAY);
        let factor = if self.factor.is_nan() || self.factor < 1.0 {
            1.0
        } else {
            self.factor
        };
        Self {
            initial,
            max: self.max.max(initial),
            factor,
        }
    }
}

/// Delay sequence for consecutive reconnect attempts.
///
/// Each call to [`Backoff::next_delay`] returns the current delay and grows
/// it by `factor`, capped at `max`. A successful handshake calls
/// [`Backoff::reset`].
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let config = config.normalized();
        Self {
            current: config.initial,
            config,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        // Overflow saturates at the cap
        let grown = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.config.factor)
            .unwrap_or(self.config.max);
        self.current = grown.min(self.config.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.config.initial;
    }

    /// Delay the next attempt would use
    pub fn current(&self) -> Duration {
        self.current
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
