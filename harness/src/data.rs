use machine_learning::dataset::Dataset;
use rand::Rng;

/// Builds a synthetic labeled classification dataset with one-hot targets.
///
/// Samples cycle through the classes; each class gets its own feature
/// profile with a little jitter so the task is learnable but not trivial.
/// Deterministic given the rng.
pub fn synthetic_classification<R: Rng>(
    samples: usize,
    input: usize,
    classes: usize,
    rng: &mut R,
) -> Dataset {
    assert!(samples > 0, "need at least one sample");
    assert!(classes > 0, "need at least one class");

    let mut data = Vec::with_capacity(samples * (input + classes));
    for i in 0..samples {
        let class = i % classes;
        for feature in 0..input {
            let center = if feature % classes == class { 0.8 } else { 0.2 };
            data.push(center + (rng.random::<f32>() - 0.5) * 0.2);
        }
        for c in 0..classes {
            data.push(if c == class { 1.0 } else { 0.0 });
        }
    }

    Dataset::new(data, input, classes)
}
