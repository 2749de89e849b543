use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use diagnostics::{Clock, DeviceId, MemoryProbe, MonotonicClock, ProbeErr};
use log::{debug, info};
use parking_lot::Mutex;

/// Simulated accelerator allocator: per-device committed-byte accounting.
///
/// Scratch blocks leased during an epoch stay retained until a gc checkpoint
/// moves them onto a pending-free queue. Pending frees only leave `committed`
/// once `reclaim_latency` has elapsed, mirroring runtimes that release device
/// memory asynchronously. The settling delay after a checkpoint exists to
/// outwait exactly this latency.
pub struct DevicePool<C = MonotonicClock> {
    devices: Vec<Mutex<PoolState>>,
    reclaim_latency: Duration,
    clock: C,
}

#[derive(Default)]
struct PoolState {
    committed: u64,
    retained: Vec<Retained>,
    pending: VecDeque<PendingFree>,
}

struct Retained {
    tag: String,
    bytes: u64,
    leased_at: Instant,
}

struct PendingFree {
    bytes: u64,
    ready_at: Instant,
}

impl DevicePool {
    /// A pool of `ndevices` devices on the monotonic clock.
    pub fn new(ndevices: usize, reclaim_latency: Duration) -> Self {
        Self::with_clock(ndevices, reclaim_latency, MonotonicClock)
    }
}

impl<C: Clock> DevicePool<C> {
    pub fn with_clock(ndevices: usize, reclaim_latency: Duration, clock: C) -> Self {
        Self {
            devices: (0..ndevices).map(|_| Mutex::new(PoolState::default())).collect(),
            reclaim_latency,
            clock,
        }
    }

    fn state(&self, device: DeviceId) -> Result<&Mutex<PoolState>, ProbeErr> {
        self.devices
            .get(device.0)
            .ok_or(ProbeErr::DeviceUnavailable { device })
    }

    /// Commits `bytes` of scratch on `device`, retained until the next gc
    /// checkpoint.
    pub fn lease(&self, device: DeviceId, tag: &str, bytes: u64) -> Result<(), ProbeErr> {
        let mut state = self.state(device)?.lock();
        state.committed += bytes;
        state.retained.push(Retained {
            tag: tag.to_string(),
            bytes,
            leased_at: self.clock.now(),
        });
        debug!(device = device.0; "leased {bytes} B for {tag}");
        Ok(())
    }

    /// Moves every retained allocation onto the pending-free queue.
    ///
    /// # Returns
    /// The number of bytes queued for reclaim. They remain committed until
    /// the reclaim latency passes.
    pub fn release_all(&self, device: DeviceId) -> Result<u64, ProbeErr> {
        let ready_at = self.clock.now() + self.reclaim_latency;
        let mut state = self.state(device)?.lock();

        let mut freed = 0;
        for retained in state.retained.drain(..) {
            freed += retained.bytes;
        }
        if freed > 0 {
            state.pending.push_back(PendingFree {
                bytes: freed,
                ready_at,
            });
        }
        debug!(device = device.0; "queued {freed} B for reclaim");
        Ok(freed)
    }

    /// Writes a breakdown of still-committed allocations to the log stream.
    pub fn dump(&self, device: DeviceId) -> Result<(), ProbeErr> {
        let now = self.clock.now();
        let state = self.state(device)?.lock();

        info!(
            "memory diagnostics for {device}: committed={} B, {} retained allocations, {} pending frees",
            state.committed,
            state.retained.len(),
            state.pending.len()
        );
        for retained in &state.retained {
            info!(
                "  {}: {} B, age {:?}",
                retained.tag,
                retained.bytes,
                now.saturating_duration_since(retained.leased_at)
            );
        }
        Ok(())
    }
}

impl<C: Clock> MemoryProbe for DevicePool<C> {
    /// Reports committed bytes after draining expired pending frees (the
    /// probe's implicit synchronization point).
    fn committed_bytes(&self, device: DeviceId) -> diagnostics::Result<u64> {
        let now = self.clock.now();
        let mut state = self.state(device)?.lock();

        while let Some(pending) = state.pending.front() {
            if pending.ready_at > now {
                break;
            }
            state.committed -= pending.bytes;
            state.pending.pop_front();
        }

        Ok(state.committed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use diagnostics::ManualClock;

    use super::*;

    const GPU0: DeviceId = DeviceId(0);

    fn pool_with_clock(latency_ms: u64) -> (DevicePool<Arc<ManualClock>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let pool = DevicePool::with_clock(1, Duration::from_millis(latency_ms), Arc::clone(&clock));
        (pool, clock)
    }

    #[test]
    fn lease_grows_committed() {
        let (pool, _clock) = pool_with_clock(100);
        pool.lease(GPU0, "scratch", 1000).unwrap();
        pool.lease(GPU0, "scratch", 500).unwrap();
        assert_eq!(pool.committed_bytes(GPU0).unwrap(), 1500);
    }

    #[test]
    fn release_reclaims_only_after_latency() {
        let (pool, clock) = pool_with_clock(100);
        pool.lease(GPU0, "scratch", 1000).unwrap();

        assert_eq!(pool.release_all(GPU0).unwrap(), 1000);
        // Still committed: the asynchronous reclaim has not finished yet.
        assert_eq!(pool.committed_bytes(GPU0).unwrap(), 1000);

        clock.advance(Duration::from_millis(99));
        assert_eq!(pool.committed_bytes(GPU0).unwrap(), 1000);

        clock.advance(Duration::from_millis(1));
        assert_eq!(pool.committed_bytes(GPU0).unwrap(), 0);
    }

    #[test]
    fn zero_latency_reclaims_immediately() {
        let (pool, _clock) = pool_with_clock(0);
        pool.lease(GPU0, "scratch", 4096).unwrap();
        pool.release_all(GPU0).unwrap();
        assert_eq!(pool.committed_bytes(GPU0).unwrap(), 0);
    }

    #[test]
    fn unknown_device_is_unavailable() {
        let (pool, _clock) = pool_with_clock(0);
        assert_eq!(
            pool.committed_bytes(DeviceId(3)),
            Err(ProbeErr::DeviceUnavailable { device: DeviceId(3) })
        );
    }
}
