use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::{
    clock::{Clock, MonotonicClock},
    error::Result,
    probe::{DeviceId, MemoryProbe},
};

/// Scoped resource measurement: `start`/`stop` bracket a region's wall-clock
/// time, `charge_on`/`charge_off` bracket its committed device memory.
///
/// Charges are additive, not last-write: `charge_on` subtracts a probe reading
/// from the accumulator and `charge_off` adds one, so repeated or nested
/// bracketed sub-regions compose into one net memory delta. Calling `start` on
/// an open sample restarts the window; `stop` on a closed sample is a no-op.
///
/// All mutating operations lock the same mutex, so one instance can be charged
/// from concurrent call sites.
pub struct ResourceSample<P, C = MonotonicClock> {
    probe: P,
    clock: C,
    device: DeviceId,
    state: Mutex<SampleState>,
}

#[derive(Debug, Default)]
struct SampleState {
    mem_delta: i64,
    started_at: Option<Instant>,
    elapsed: Duration,
}

impl<P: MemoryProbe> ResourceSample<P> {
    /// Returns a sample measuring `device` through `probe` on the monotonic
    /// clock.
    pub fn new(probe: P, device: DeviceId) -> Self {
        Self::with_clock(probe, device, MonotonicClock)
    }
}

impl<P: MemoryProbe, C: Clock> ResourceSample<P, C> {
    pub fn with_clock(probe: P, device: DeviceId, clock: C) -> Self {
        Self {
            probe,
            clock,
            device,
            state: Mutex::new(SampleState::default()),
        }
    }

    /// Opens the timing window.
    pub fn start(&self) {
        let now = self.clock.now();
        self.state.lock().started_at = Some(now);
    }

    /// Closes the timing window and records the elapsed time.
    pub fn stop(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if let Some(t0) = state.started_at.take() {
            state.elapsed = now.saturating_duration_since(t0);
        }
    }

    /// Subtracts the current committed-memory reading from the accumulator.
    ///
    /// # Errors
    /// Propagates `ProbeErr::DeviceUnavailable` from the probe.
    pub fn charge_on(&self) -> Result<()> {
        let committed = self.probe.committed_bytes(self.device)?;
        self.state.lock().mem_delta -= committed as i64;
        Ok(())
    }

    /// Adds the current committed-memory reading to the accumulator.
    ///
    /// # Errors
    /// Propagates `ProbeErr::DeviceUnavailable` from the probe.
    pub fn charge_off(&self) -> Result<()> {
        let committed = self.probe.committed_bytes(self.device)?;
        self.state.lock().mem_delta += committed as i64;
        Ok(())
    }

    /// Zeroes the accumulator and clears the timing window so the instance can
    /// be reused across epochs.
    pub fn reset(&self) {
        *self.state.lock() = SampleState::default();
    }

    /// The net committed-memory delta accumulated so far, in bytes.
    pub fn memory_delta(&self) -> i64 {
        self.state.lock().mem_delta
    }

    /// The duration recorded by the last completed `start`/`stop` bracket.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }
}
