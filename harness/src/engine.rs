use std::{
    error::Error,
    fmt,
    num::NonZeroUsize,
    sync::Arc,
};

use diagnostics::{Clock, DeviceId, MemoryProbe, MonotonicClock, ProbeErr};
use log::debug;
use machine_learning::{
    MlErr,
    arch::{Model, Sequential, loss::{LossFn, SoftmaxCrossEntropy}},
    dataset::Dataset,
    optimization::GradientDescent,
};
use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;

use crate::device::DevicePool;

/// The engine module's result type.
pub type EngineResult<T> = std::result::Result<T, EngineErr>;

/// Failures raised at the training-engine boundary.
#[derive(Debug)]
pub enum EngineErr {
    Model(MlErr),
    Probe(ProbeErr),
    Failed(String),
}

impl fmt::Display for EngineErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineErr::Model(e) => write!(f, "model error: {e}"),
            EngineErr::Probe(e) => write!(f, "probe error: {e}"),
            EngineErr::Failed(msg) => write!(f, "engine failure: {msg}"),
        }
    }
}

impl Error for EngineErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EngineErr::Model(e) => Some(e),
            EngineErr::Probe(e) => Some(e),
            EngineErr::Failed(_) => None,
        }
    }
}

impl From<MlErr> for EngineErr {
    fn from(value: MlErr) -> Self {
        Self::Model(value)
    }
}

impl From<ProbeErr> for EngineErr {
    fn from(value: ProbeErr) -> Self {
        Self::Probe(value)
    }
}

/// Validation metrics for one epoch.
#[derive(Debug, Clone, Copy)]
pub struct Metrics {
    pub loss: f32,
    pub accuracy: f32,
}

/// Best class label plus its confidence.
#[derive(Debug, Clone)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
}

/// The training-engine boundary the leak-detection loop drives.
pub trait TrainingEngine {
    /// One full pass over the training dataset.
    ///
    /// # Returns
    /// The mean training loss of the epoch.
    fn train_one_epoch(&mut self, dataset: &mut Dataset) -> EngineResult<f32>;

    /// One pass over a validation dataset.
    fn evaluate(&mut self, dataset: &Dataset) -> EngineResult<Metrics>;

    /// Classifies a single input row.
    fn predict(&mut self, input: ArrayView2<f32>) -> EngineResult<Classification>;

    /// Bytes currently committed on `device`.
    fn committed_memory(&self, device: DeviceId) -> EngineResult<u64>;

    /// Forces release of cached device allocations.
    ///
    /// # Returns
    /// The number of bytes queued for reclaim.
    fn gc_checkpoint(&mut self, device: DeviceId) -> EngineResult<u64>;

    /// Writes a breakdown of still-committed allocations to the log stream.
    fn dump_diagnostics(&self, device: DeviceId) -> EngineResult<()>;
}

/// ndarray-backed training engine over a [`DevicePool`].
///
/// Per-epoch training leases scratch proportional to the work done; the
/// scratch stays retained on the pool until a gc checkpoint. That retention
/// is the allocation behavior this harness exists to observe.
pub struct NdEngine<C: Clock = MonotonicClock> {
    model: Sequential,
    params: Vec<f32>,
    grad: Vec<f32>,
    optimizer: GradientDescent,
    loss_fn: SoftmaxCrossEntropy,
    batch_size: NonZeroUsize,
    rng: StdRng,
    pool: Arc<DevicePool<C>>,
    device: DeviceId,
    epoch: usize,
}

impl<C: Clock> NdEngine<C> {
    pub fn new(
        model: Sequential,
        params: Vec<f32>,
        optimizer: GradientDescent,
        batch_size: NonZeroUsize,
        rng: StdRng,
        pool: Arc<DevicePool<C>>,
        device: DeviceId,
    ) -> Self {
        Self {
            grad: vec![0.0; params.len()],
            model,
            params,
            optimizer,
            loss_fn: SoftmaxCrossEntropy::new(),
            batch_size,
            rng,
            pool,
            device,
            epoch: 0,
        }
    }

    /// Device bytes one epoch's forward/backward scratch occupies: one
    /// parameter-sized activation block per batch.
    fn epoch_scratch_bytes(&self, dataset: &Dataset) -> u64 {
        let nbatches = dataset.len().div_ceil(self.batch_size.get()) as u64;
        nbatches * self.params.len() as u64 * size_of::<f32>() as u64
    }
}

impl<C: Clock> TrainingEngine for NdEngine<C> {
    fn train_one_epoch(&mut self, dataset: &mut Dataset) -> EngineResult<f32> {
        dataset.shuffle(&mut self.rng);

        let scratch = self.epoch_scratch_bytes(dataset);
        self.pool
            .lease(self.device, &format!("epoch-{} activations", self.epoch), scratch)?;

        let loss = self.model.backprop(
            &mut self.params,
            &mut self.grad,
            &self.loss_fn,
            &mut self.optimizer,
            dataset.batches(self.batch_size),
        )?;

        debug!(epoch = self.epoch; "training pass done: loss={loss:.4}");
        self.epoch += 1;
        Ok(loss)
    }

    fn evaluate(&mut self, dataset: &Dataset) -> EngineResult<Metrics> {
        let mut total_loss = 0.0;
        let mut nbatches = 0;
        let mut correct = 0;
        let mut total = 0;

        for (x, y) in dataset.batches(self.batch_size) {
            let y_pred = self.model.forward(&self.params, x)?;
            total_loss += self.loss_fn.loss(y_pred.view(), y);
            nbatches += 1;

            for (pred_row, y_row) in y_pred.outer_iter().zip(y.outer_iter()) {
                if argmax(pred_row) == argmax(y_row) {
                    correct += 1;
                }
                total += 1;
            }
        }

        Ok(Metrics {
            loss: total_loss / nbatches.max(1) as f32,
            accuracy: correct as f32 / total.max(1) as f32,
        })
    }

    fn predict(&mut self, input: ArrayView2<f32>) -> EngineResult<Classification> {
        let out = self.model.forward(&self.params, input)?;
        if out.nrows() != 1 || out.ncols() == 0 {
            return Err(EngineErr::Failed(format!(
                "expected one row of class scores, got {}x{}",
                out.nrows(),
                out.ncols()
            )));
        }

        let logits = out.row(0);
        let max = logits.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        let exp_sum: f32 = logits.iter().map(|&v| (v - max).exp()).sum();

        let best = argmax(logits);
        Ok(Classification {
            label: best.to_string(),
            confidence: (logits[best] - max).exp() / exp_sum,
        })
    }

    fn committed_memory(&self, device: DeviceId) -> EngineResult<u64> {
        Ok(self.pool.committed_bytes(device)?)
    }

    fn gc_checkpoint(&mut self, device: DeviceId) -> EngineResult<u64> {
        Ok(self.pool.release_all(device)?)
    }

    fn dump_diagnostics(&self, device: DeviceId) -> EngineResult<()> {
        Ok(self.pool.dump(device)?)
    }
}

fn argmax(row: ArrayView1<f32>) -> usize {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;
    for (i, &value) in row.iter().enumerate() {
        if value > best_value {
            best = i;
            best_value = value;
        }
    }
    best
}
