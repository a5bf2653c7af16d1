// src/pipeline/actuator.rs
//
// Haptic output. A pulse is requested on every rising approach edge; the
// cooldown wrapper drops requests that arrive too soon after the last pulse,
// across all streams.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use tracing::{debug, info};

use crate::types::ActuatorConfig;

pub trait Actuator: Send + Sync {
    /// Request one pulse. Returns `false` when the request was suppressed.
    fn pulse(&self) -> Result<bool>;
}

pub type SharedActuator = Arc<dyn Actuator>;

// ============================================================================
// LOG ACTUATOR
// ============================================================================

/// Stand-in for a PWM motor driver: logs each pulse and counts them.
#[derive(Debug, Default)]
pub struct LogActuator {
    pulse_ms: u64,
    duty_percent: u8,
    pulses: AtomicU64,
}

impl LogActuator {
    pub fn new(config: &ActuatorConfig) -> Self {
        Self {
            pulse_ms: config.pulse_ms,
            duty_percent: config.duty_percent,
            pulses: AtomicU64::new(0),
        }
    }

    pub fn pulses(&self) -> u64 {
        self.pulses.load(Ordering::Relaxed)
    }
}

impl Actuator for LogActuator {
    fn pulse(&self) -> Result<bool> {
        let n = self.pulses.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "📳 Pulse #{} ({} ms @ {}% duty)",
            n, self.pulse_ms, self.duty_percent
        );
        Ok(true)
    }
}

// ============================================================================
// COOLDOWN
// ============================================================================

pub struct CooldownActuator<A: Actuator> {
    inner: A,
    cooldown: Duration,
    last_pulse: Mutex<Option<Instant>>,
}

impl<A: Actuator> CooldownActuator<A> {
    pub fn new(inner: A, cooldown_secs: f64) -> Self {
        Self {
            inner,
            cooldown: Duration::try_from_secs_f64(cooldown_secs.max(0.0))
                .unwrap_or(Duration::MAX),
            last_pulse: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Pulse unless the previous pulse was less than the cooldown before `now`.
    pub fn pulse_at(&self, now: Instant) -> Result<bool> {
        let mut last = self
            .last_pulse
            .lock()
            .map_err(|_| anyhow!("actuator cooldown lock poisoned"))?;

        if let Some(prev) = *last {
            let since = now.saturating_duration_since(prev);
            if since < self.cooldown {
                debug!("Pulse suppressed, {:?} since last", since);
                return Ok(false);
            }
        }

        let fired = self.inner.pulse()?;
        if fired {
            *last = Some(now);
        }
        Ok(fired)
    }
}

impl<A: Actuator> Actuator for CooldownActuator<A> {
    fn pulse(&self) -> Result<bool> {
        self.pulse_at(Instant::now())
    }
}
