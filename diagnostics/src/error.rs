use std::{error::Error, fmt};

use crate::probe::DeviceId;

/// The diagnostics module's result type.
pub type Result<T> = std::result::Result<T, ProbeErr>;

/// Failures raised by memory probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeErr {
    /// No accelerator with that index exists, or the runtime cannot query it.
    DeviceUnavailable { device: DeviceId },
}

impl fmt::Display for ProbeErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeErr::DeviceUnavailable { device } => {
                write!(f, "device {device} is unavailable or cannot be queried")
            }
        }
    }
}

impl Error for ProbeErr {}
