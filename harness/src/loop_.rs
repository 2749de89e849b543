use std::{thread, time::Duration};

use diagnostics::{Clock, DeviceId, EpochRecord, MemoryProbe, MonotonicClock, ResourceSample, TrendTable};
use log::{debug, error, info, warn};
use machine_learning::dataset::Dataset;

use crate::{
    engine::{Metrics, TrainingEngine},
    error::{HarnessErr, Result},
    holdout::{self, HoldoutCorpus},
};

/// External collaborator hook invoked after each epoch's validation pass.
pub trait EpochListener {
    fn epoch_complete(&mut self, epoch: usize, metrics: &Metrics);
}

/// Logs each epoch's validation metrics.
pub struct LoggingListener;

impl EpochListener for LoggingListener {
    fn epoch_complete(&mut self, epoch: usize, metrics: &Metrics) {
        info!(
            epoch = epoch;
            "validation: loss={:.4} accuracy={:.3}",
            metrics.loss,
            metrics.accuracy
        );
    }
}

/// Orchestrates the leak-detection run.
///
/// Runs a configured number of epochs, brackets each with one reusable
/// [`ResourceSample`], and appends `(epoch, duration, memory delta)` to a
/// trend table that it reprints in full after every epoch. Between epochs it
/// can force a gc checkpoint, outwait the runtime's asynchronous reclaim and
/// dump engine-level memory diagnostics.
pub struct LeakDetectionLoop<E, P, C = MonotonicClock> {
    engine: E,
    sample: ResourceSample<P, C>,
    trend: TrendTable,
    device: DeviceId,
    epochs: usize,
    gc_between_epochs: bool,
    settle: Duration,
    listeners: Vec<Box<dyn EpochListener>>,
}

impl<E, P, C> LeakDetectionLoop<E, P, C>
where
    E: TrainingEngine,
    P: MemoryProbe,
    C: Clock,
{
    /// Returns a new loop over `engine`.
    ///
    /// # Arguments
    /// * `engine` - The training engine under diagnosis.
    /// * `sample` - The resource sample bracketing each epoch.
    /// * `device` - The device whose committed memory is tracked.
    /// * `epochs` - The number of epochs to run.
    /// * `gc_between_epochs` - Whether to force a gc checkpoint, settle and
    ///   dump diagnostics after each epoch.
    /// * `settle` - How long to wait for asynchronous deallocation after a
    ///   checkpoint.
    pub fn new(
        engine: E,
        sample: ResourceSample<P, C>,
        device: DeviceId,
        epochs: usize,
        gc_between_epochs: bool,
        settle: Duration,
    ) -> Self {
        Self {
            engine,
            sample,
            trend: TrendTable::new(),
            device,
            epochs,
            gc_between_epochs,
            settle,
            listeners: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn EpochListener>) {
        self.listeners.push(listener);
    }

    /// The trend built so far. Intact even after a failed run; the partial
    /// trend is diagnostic evidence.
    pub fn trend(&self) -> &TrendTable {
        &self.trend
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Runs the configured number of epochs.
    ///
    /// # Errors
    /// `HarnessErr::TrainingStep` if training or evaluation fails (fatal;
    /// the trend so far stays readable via `trend()`), `HarnessErr::Device`
    /// if the memory probe fails. Diagnostic dumps and holdout evaluation are
    /// best-effort: their failures are logged and absorbed.
    pub fn run(
        &mut self,
        train_set: &mut Dataset,
        validation_set: &Dataset,
        holdout: Option<&HoldoutCorpus>,
    ) -> Result<()> {
        for epoch in 0..self.epochs {
            info!(epoch = epoch; "training epoch started");

            self.sample.reset();
            self.sample.start();
            self.sample.charge_on()?;

            let train_loss = self
                .engine
                .train_one_epoch(train_set)
                .map_err(|source| fatal(epoch, "train", source))?;
            let metrics = self
                .engine
                .evaluate(validation_set)
                .map_err(|source| fatal(epoch, "evaluate", source))?;
            for listener in &mut self.listeners {
                listener.epoch_complete(epoch, &metrics);
            }

            self.sample.charge_off()?;
            self.sample.stop();

            self.trend.push(EpochRecord {
                epoch,
                duration: self.sample.elapsed(),
                mem_delta_bytes: self.sample.memory_delta(),
            });
            print!("{}", self.trend);

            debug!(epoch = epoch; "train loss={train_loss:.4}");

            if self.gc_between_epochs {
                self.gc_pass(epoch);
            }

            if let Some(corpus) = holdout {
                match holdout::evaluate(&mut self.engine, corpus) {
                    Ok(tally) => info!(
                        "{} wrong classified images in {} non trained testimages",
                        tally.wrong, tally.total
                    ),
                    Err(e) => warn!(epoch = epoch; "holdout evaluation failed: {e}"),
                }
            }
        }

        info!("leak detection loop completed: epochs={}", self.epochs);
        Ok(())
    }

    /// Forces a gc checkpoint, logs committed bytes before and after the
    /// settling delay, then requests a diagnostic dump. Best-effort.
    fn gc_pass(&mut self, epoch: usize) {
        match self.engine.gc_checkpoint(self.device) {
            Ok(freed) => debug!(epoch = epoch; "gc checkpoint queued {freed} B for reclaim"),
            Err(e) => {
                warn!(epoch = epoch; "gc checkpoint failed: {e}");
                return;
            }
        }

        self.log_committed("after 0s settling");
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        self.log_committed("after settling");

        if let Err(e) = self.engine.dump_diagnostics(self.device) {
            warn!(epoch = epoch; "diagnostic dump failed: {e}");
        }
    }

    fn log_committed(&self, when: &str) {
        match self.engine.committed_memory(self.device) {
            Ok(bytes) => info!("committed memory {when}: {bytes} B"),
            Err(e) => warn!("committed memory query failed {when}: {e}"),
        }
    }
}

fn fatal(epoch: usize, phase: &'static str, source: crate::engine::EngineErr) -> HarnessErr {
    error!(epoch = epoch; "training step failed during {phase}: {source}");
    HarnessErr::TrainingStep {
        epoch,
        phase,
        source,
    }
}
