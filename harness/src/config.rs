use std::{num::NonZeroUsize, path::PathBuf, str::FromStr, time::Duration};

use diagnostics::DeviceId;
use machine_learning::arch::{Sequential, activations::ActFn, layers::Layer};
use ndarray::Array1;
use ndarray_rand::{RandomExt, rand_distr::Uniform};
use rand::Rng;

use crate::error::{HarnessErr, Result};

/// Model topology, consumed only through `build`.
#[derive(Debug, Clone)]
pub enum ModelConfig {
    /// Fully-connected stack: input → hidden layers (relu) → linear class
    /// scores.
    Mlp {
        input: usize,
        hidden: Vec<usize>,
        classes: usize,
    },
}

impl ModelConfig {
    pub fn input(&self) -> usize {
        match self {
            Self::Mlp { input, .. } => *input,
        }
    }

    pub fn classes(&self) -> usize {
        match self {
            Self::Mlp { classes, .. } => *classes,
        }
    }

    /// Builds the model together with its Xavier-uniform-initialized
    /// parameter slice.
    pub fn build<R: Rng>(&self, rng: &mut R) -> Result<(Sequential, Vec<f32>)> {
        match self {
            Self::Mlp {
                input,
                hidden,
                classes,
            } => {
                let mut layers = Vec::with_capacity(hidden.len() + 1);
                let mut params = Vec::new();

                let mut fan_in = *input;
                for &units in hidden {
                    layers.push(Layer::dense((fan_in, units), Some(ActFn::relu())));
                    push_xavier(&mut params, fan_in, units, rng)?;
                    fan_in = units;
                }
                layers.push(Layer::dense((fan_in, *classes), None));
                push_xavier(&mut params, fan_in, *classes, rng)?;

                Ok((Sequential::new(layers), params))
            }
        }
    }
}

/// Xavier-uniform weights followed by zero biases for one dense layer.
fn push_xavier<R: Rng>(
    params: &mut Vec<f32>,
    fan_in: usize,
    fan_out: usize,
    rng: &mut R,
) -> Result<()> {
    let bound = (6.0 / (fan_in + fan_out) as f32).sqrt();
    let dist = Uniform::new(-bound, bound)
        .map_err(|e| HarnessErr::InvalidConfig(format!("xavier bounds: {e}")))?;

    let weights = Array1::random_using(fan_in * fan_out, dist, rng);
    params.extend(weights.iter());
    params.resize(params.len() + fan_out, 0.0);
    Ok(())
}

/// Immutable execution bounds for one leak-detection run.
#[derive(Debug)]
pub struct HarnessConfig {
    pub epochs: usize,
    pub batch_size: NonZeroUsize,
    pub device: DeviceId,
    pub gc_between_epochs: bool,
    pub settle: Duration,
    pub holdout_dir: Option<PathBuf>,
    pub seed: Option<u64>,
    pub model: ModelConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: NonZeroUsize::new(10).unwrap(),
            device: DeviceId(0),
            gc_between_epochs: false,
            settle: Duration::from_secs(1),
            holdout_dir: None,
            seed: None,
            model: ModelConfig::Mlp {
                input: 28 * 28,
                hidden: vec![128, 64],
                classes: 10,
            },
        }
    }
}

/// Parses command-line arguments into a config.
///
/// The positional `gc` token toggles the per-epoch gc checkpoint; the rest
/// are flag/value pairs.
///
/// # Errors
/// `HarnessErr::InvalidConfig` on unknown flags, missing values or
/// unparsable numbers.
pub fn parse_args<I: Iterator<Item = String>>(mut args: I) -> Result<HarnessConfig> {
    let mut cfg = HarnessConfig::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "gc" => cfg.gc_between_epochs = true,
            "-e" | "--epochs" => cfg.epochs = parse_value(&mut args, &arg)?,
            "-b" | "--batch-size" => {
                let n: usize = parse_value(&mut args, &arg)?;
                cfg.batch_size = NonZeroUsize::new(n)
                    .ok_or_else(|| HarnessErr::InvalidConfig("batch size must be positive".into()))?;
            }
            "--data" => cfg.holdout_dir = Some(PathBuf::from(next_value(&mut args, &arg)?)),
            "--settle-ms" => cfg.settle = Duration::from_millis(parse_value(&mut args, &arg)?),
            "--device" => cfg.device = DeviceId(parse_value(&mut args, &arg)?),
            "--seed" => cfg.seed = Some(parse_value(&mut args, &arg)?),
            other => {
                return Err(HarnessErr::InvalidConfig(format!(
                    "unknown argument: {other}"
                )));
            }
        }
    }

    Ok(cfg)
}

fn next_value<I: Iterator<Item = String>>(args: &mut I, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| HarnessErr::InvalidConfig(format!("{flag} requires a value")))
}

fn parse_value<I, T>(args: &mut I, flag: &str) -> Result<T>
where
    I: Iterator<Item = String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    next_value(args, flag)?
        .parse()
        .map_err(|e| HarnessErr::InvalidConfig(format!("{flag}: {e}")))
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::Model;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn strings(args: &[&str]) -> impl Iterator<Item = String> {
        args.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn defaults_match_the_reference_run() {
        let cfg = parse_args(strings(&[])).unwrap();
        assert_eq!(cfg.epochs, 10);
        assert_eq!(cfg.batch_size.get(), 10);
        assert!(!cfg.gc_between_epochs);
        assert_eq!(cfg.settle, Duration::from_secs(1));
    }

    #[test]
    fn parses_gc_toggle_and_flags() {
        let cfg = parse_args(strings(&["gc", "-e", "3", "-b", "32", "--settle-ms", "50"])).unwrap();
        assert!(cfg.gc_between_epochs);
        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.batch_size.get(), 32);
        assert_eq!(cfg.settle, Duration::from_millis(50));
    }

    #[test]
    fn rejects_unknown_arguments() {
        assert!(parse_args(strings(&["--bogus"])).is_err());
    }

    #[test]
    fn rejects_zero_batch_size() {
        assert!(parse_args(strings(&["-b", "0"])).is_err());
    }

    #[test]
    fn mlp_build_produces_matching_parameter_count() {
        let config = ModelConfig::Mlp {
            input: 4,
            hidden: vec![8, 5],
            classes: 3,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let (model, params) = config.build(&mut rng).unwrap();

        let expected = (4 * 8 + 8) + (8 * 5 + 5) + (5 * 3 + 3);
        assert_eq!(model.size(), expected);
        assert_eq!(params.len(), expected);
    }
}
