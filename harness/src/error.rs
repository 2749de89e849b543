use std::{error::Error, fmt, io, path::PathBuf};

use diagnostics::ProbeErr;

use crate::engine::EngineErr;

/// The harness module's result type.
pub type Result<T> = std::result::Result<T, HarnessErr>;

/// Harness runtime failures.
#[derive(Debug)]
pub enum HarnessErr {
    /// The memory probe cannot reach the accelerator. Fatal.
    Device(ProbeErr),
    /// A failure inside train-one-epoch or evaluate. Fatal; the trend built
    /// so far is preserved on the loop as diagnostic evidence.
    TrainingStep {
        epoch: usize,
        phase: &'static str,
        source: EngineErr,
    },
    /// The holdout corpus directory is missing, empty or undecodable. Fatal
    /// at startup.
    CorpusLoad { path: PathBuf, reason: String },
    /// A failure during holdout inference. Aborts the current evaluation pass
    /// only.
    Prediction {
        label: String,
        index: usize,
        source: EngineErr,
    },
    /// Invalid configuration, caught before the run starts.
    InvalidConfig(String),
    /// An underlying I/O error not covered by the above variants.
    Io(io::Error),
}

impl fmt::Display for HarnessErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(e) => write!(f, "device probe failure: {e}"),
            Self::TrainingStep {
                epoch,
                phase,
                source,
            } => write!(f, "training step failed at epoch {epoch} ({phase}): {source}"),
            Self::CorpusLoad { path, reason } => {
                write!(
                    f,
                    "failed to load holdout corpus at {}: {reason}",
                    path.display()
                )
            }
            Self::Prediction {
                label,
                index,
                source,
            } => write!(
                f,
                "prediction failed for holdout image {index} of label {label}: {source}"
            ),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for HarnessErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Device(e) => Some(e),
            Self::TrainingStep { source, .. } => Some(source),
            Self::Prediction { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProbeErr> for HarnessErr {
    fn from(value: ProbeErr) -> Self {
        Self::Device(value)
    }
}

impl From<io::Error> for HarnessErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
