use std::{
    fs,
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
};

use diagnostics::DeviceId;
use harness::{
    HarnessErr,
    engine::{Classification, EngineErr, EngineResult, Metrics, TrainingEngine},
    holdout::{self, HoldoutCorpus, Tally},
};
use image::{GrayImage, Luma};
use machine_learning::dataset::Dataset;
use ndarray::ArrayView2;

/// Predicts the same label for every image; can be scripted to fail.
struct FixedEngine {
    label: String,
    fail: bool,
}

impl FixedEngine {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            fail: false,
        }
    }
}

impl TrainingEngine for FixedEngine {
    fn train_one_epoch(&mut self, _dataset: &mut Dataset) -> EngineResult<f32> {
        Ok(0.0)
    }

    fn evaluate(&mut self, _dataset: &Dataset) -> EngineResult<Metrics> {
        Ok(Metrics {
            loss: 0.0,
            accuracy: 1.0,
        })
    }

    fn predict(&mut self, _input: ArrayView2<f32>) -> EngineResult<Classification> {
        if self.fail {
            return Err(EngineErr::Failed("injected prediction failure".into()));
        }
        Ok(Classification {
            label: self.label.clone(),
            confidence: 1.0,
        })
    }

    fn committed_memory(&self, _device: DeviceId) -> EngineResult<u64> {
        Ok(0)
    }

    fn gc_checkpoint(&mut self, _device: DeviceId) -> EngineResult<u64> {
        Ok(0)
    }

    fn dump_diagnostics(&self, _device: DeviceId) -> EngineResult<()> {
        Ok(())
    }
}

/// A scratch corpus directory that cleans up after itself.
struct ScratchCorpus {
    root: PathBuf,
}

static UNIQUE: AtomicUsize = AtomicUsize::new(0);

impl ScratchCorpus {
    fn new() -> Self {
        let root = std::env::temp_dir().join(format!(
            "holdout-corpus-{}-{}",
            std::process::id(),
            UNIQUE.fetch_add(1, Ordering::SeqCst)
        ));
        fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    fn add_label(&self, label: &str) -> PathBuf {
        let dir = self.root.join(label);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn add_image(&self, label: &str, name: &str, intensity: u8) {
        let dir = self.add_label(label);
        GrayImage::from_pixel(4, 4, Luma([intensity]))
            .save(dir.join(name))
            .unwrap();
    }
}

impl Drop for ScratchCorpus {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

#[test]
fn tallies_misclassifications_against_directory_labels() {
    let scratch = ScratchCorpus::new();
    scratch.add_image("A", "a0.png", 10);
    scratch.add_image("B", "b0.png", 200);

    let corpus = HoldoutCorpus::load(&scratch.root).unwrap();
    assert_eq!(corpus.total_images(), 2);

    // The engine always answers "A": only the "B" image is wrong.
    let mut engine = FixedEngine::new("A");
    let tally = holdout::evaluate(&mut engine, &corpus).unwrap();
    assert_eq!(tally, Tally { wrong: 1, total: 2 });
}

#[test]
fn empty_label_directory_is_retained_and_contributes_nothing() {
    let scratch = ScratchCorpus::new();
    scratch.add_image("A", "a0.png", 10);
    scratch.add_label("EMPTY");

    let corpus = HoldoutCorpus::load(&scratch.root).unwrap();
    let labels: Vec<&str> = corpus.labels().collect();
    assert_eq!(labels, vec!["A", "EMPTY"]);

    let mut engine = FixedEngine::new("A");
    let tally = holdout::evaluate(&mut engine, &corpus).unwrap();
    assert_eq!(tally, Tally { wrong: 0, total: 1 });
}

#[test]
fn corpus_with_only_empty_labels_contributes_zero_zero() {
    let scratch = ScratchCorpus::new();
    scratch.add_label("EMPTY");

    let corpus = HoldoutCorpus::load(&scratch.root).unwrap();
    let mut engine = FixedEngine::new("A");
    let tally = holdout::evaluate(&mut engine, &corpus).unwrap();
    assert_eq!(tally, Tally { wrong: 0, total: 0 });
}

#[test]
fn missing_root_fails_to_load() {
    let root = std::env::temp_dir().join("holdout-corpus-does-not-exist");
    assert!(matches!(
        HoldoutCorpus::load(&root),
        Err(HarnessErr::CorpusLoad { .. })
    ));
}

#[test]
fn root_without_label_subdirectories_fails_to_load() {
    let scratch = ScratchCorpus::new();
    // A stray file at the root is not a label.
    fs::write(scratch.root.join("README"), "not a label").unwrap();

    assert!(matches!(
        HoldoutCorpus::load(&scratch.root),
        Err(HarnessErr::CorpusLoad { .. })
    ));
}

#[test]
fn undecodable_image_fails_the_load() {
    let scratch = ScratchCorpus::new();
    let dir = scratch.add_label("A");
    fs::write(dir.join("broken.png"), b"definitely not a png").unwrap();

    assert!(matches!(
        HoldoutCorpus::load(&scratch.root),
        Err(HarnessErr::CorpusLoad { .. })
    ));
}

#[test]
fn prediction_failure_aborts_the_pass() {
    let scratch = ScratchCorpus::new();
    scratch.add_image("A", "a0.png", 10);

    let corpus = HoldoutCorpus::load(&scratch.root).unwrap();
    let mut engine = FixedEngine::new("A");
    engine.fail = true;

    let err = holdout::evaluate(&mut engine, &corpus).unwrap_err();
    match err {
        HarnessErr::Prediction { label, index, .. } => {
            assert_eq!(label, "A");
            assert_eq!(index, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn decoded_images_are_normalized_rows() {
    let scratch = ScratchCorpus::new();
    scratch.add_image("A", "a0.png", 255);

    let corpus = HoldoutCorpus::load(&scratch.root).unwrap();
    let (_, images) = corpus.iter().next().unwrap();
    assert_eq!(images[0].dim(), (1, 16));
    assert!(images[0].iter().all(|&v| v == 1.0));
}
