use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use ndarray::Array2;

use crate::{
    engine::TrainingEngine,
    error::{HarnessErr, Result},
};

/// Labeled holdout images, decoded once at startup.
///
/// One entry per label subdirectory; the sorted map keeps evaluation order
/// deterministic across runs.
pub struct HoldoutCorpus {
    classes: BTreeMap<String, Vec<Array2<f32>>>,
}

impl HoldoutCorpus {
    /// Loads a corpus from a directory tree whose immediate subdirectories
    /// are label names and whose files are individually decodable images.
    ///
    /// A label subdirectory with zero images is retained as an empty entry.
    ///
    /// # Errors
    /// `HarnessErr::CorpusLoad` if the root does not exist, contains no label
    /// subdirectories, or holds an undecodable image.
    pub fn load(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(corpus_err(root, "root directory does not exist"));
        }

        let mut classes = BTreeMap::new();
        for entry in fs::read_dir(root).map_err(|e| corpus_err(root, e))? {
            let entry = entry.map_err(|e| corpus_err(root, e))?;
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }

            let label = entry.file_name().to_string_lossy().into_owned();
            let mut images = Vec::new();
            for file in fs::read_dir(&dir).map_err(|e| corpus_err(&dir, e))? {
                let file = file.map_err(|e| corpus_err(&dir, e))?;
                let path = file.path();
                if path.is_dir() {
                    continue;
                }
                images.push(decode(&path)?);
            }

            debug!("loaded {} holdout images for label {label}", images.len());
            classes.insert(label, images);
        }

        if classes.is_empty() {
            return Err(corpus_err(root, "no label subdirectories under root"));
        }
        Ok(Self { classes })
    }

    /// Labels and their images, in sorted label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Array2<f32>])> {
        self.classes
            .iter()
            .map(|(label, images)| (label.as_str(), images.as_slice()))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn total_images(&self) -> usize {
        self.classes.values().map(Vec::len).sum()
    }
}

/// Misclassification tally of one evaluation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub wrong: usize,
    pub total: usize,
}

/// Runs predict-and-compare over every image of every label, in corpus order.
///
/// Fail-fast: the first prediction failure aborts the whole pass — a
/// corrupted holdout set invalidates the tally, so there is no partial
/// best-effort result.
///
/// # Errors
/// `HarnessErr::Prediction` carrying the failing label and image index.
pub fn evaluate<E: TrainingEngine>(engine: &mut E, corpus: &HoldoutCorpus) -> Result<Tally> {
    let mut tally = Tally::default();

    for (label, images) in corpus.iter() {
        for (index, image) in images.iter().enumerate() {
            let classification =
                engine
                    .predict(image.view())
                    .map_err(|source| HarnessErr::Prediction {
                        label: label.to_string(),
                        index,
                        source,
                    })?;

            if classification.label != label {
                tally.wrong += 1;
            }
            tally.total += 1;
        }
    }

    Ok(tally)
}

fn corpus_err(path: &Path, reason: impl ToString) -> HarnessErr {
    HarnessErr::CorpusLoad {
        path: PathBuf::from(path),
        reason: reason.to_string(),
    }
}

/// Decodes one image into a normalized grayscale row, the shape the
/// classifier's input layer expects.
fn decode(path: &Path) -> Result<Array2<f32>> {
    let img = image::open(path).map_err(|e| corpus_err(path, format!("image decode failed: {e}")))?;
    let gray = img.to_luma8();
    let (width, height) = gray.dimensions();

    let pixels: Vec<f32> = gray
        .into_raw()
        .into_iter()
        .map(|p| p as f32 / 255.0)
        .collect();
    Ok(Array2::from_shape_vec((1, (width * height) as usize), pixels).unwrap())
}
