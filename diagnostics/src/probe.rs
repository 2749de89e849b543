use std::{fmt, sync::Arc, time::Instant};

use crate::error::Result;

/// Index of an accelerator device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gpu({})", self.0)
    }
}

/// A single committed-memory observation. Produced on demand, never persisted.
#[derive(Debug, Clone, Copy)]
pub struct DeviceMemoryReading {
    pub device: DeviceId,
    pub committed_bytes: u64,
    pub at: Instant,
}

/// Queries the accelerator runtime's currently committed memory.
///
/// Must be callable at arbitrary points, including while the engine is
/// mid-computation. An implementation that needs to synchronize the device to
/// produce a consistent reading does so internally before sampling.
pub trait MemoryProbe {
    /// Bytes currently reserved by the runtime for `device`.
    ///
    /// # Errors
    /// `ProbeErr::DeviceUnavailable` if no such device exists or it cannot be
    /// queried.
    fn committed_bytes(&self, device: DeviceId) -> Result<u64>;

    /// Takes a full timestamped observation of `device`.
    fn read(&self, device: DeviceId) -> Result<DeviceMemoryReading> {
        Ok(DeviceMemoryReading {
            device,
            committed_bytes: self.committed_bytes(device)?,
            at: Instant::now(),
        })
    }
}

impl<P: MemoryProbe + ?Sized> MemoryProbe for &P {
    fn committed_bytes(&self, device: DeviceId) -> Result<u64> {
        (**self).committed_bytes(device)
    }
}

impl<P: MemoryProbe + ?Sized> MemoryProbe for Arc<P> {
    fn committed_bytes(&self, device: DeviceId) -> Result<u64> {
        (**self).committed_bytes(device)
    }
}
