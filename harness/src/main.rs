use std::{env, process, sync::Arc, time::Duration};

use diagnostics::ResourceSample;
use log::{error, info};
use machine_learning::optimization::GradientDescent;
use rand::{Rng, SeedableRng, rngs::StdRng};

use harness::{
    config,
    data::synthetic_classification,
    device::DevicePool,
    engine::NdEngine,
    holdout::HoldoutCorpus,
    loop_::{LeakDetectionLoop, LoggingListener},
};

/// How long the simulated runtime takes to finish an asynchronous reclaim.
/// The default settling delay of one second comfortably outwaits it.
const RECLAIM_LATENCY: Duration = Duration::from_millis(250);

const TRAIN_SAMPLES: usize = 2048;
const VALIDATION_SAMPLES: usize = 512;
const LEARNING_RATE: f32 = 0.05;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        error!("{e}");
        process::exit(1);
    }
}

fn run() -> harness::Result<()> {
    let cfg = config::parse_args(env::args().skip(1))?;
    info!(
        "starting leak-detection run: epochs={} batch_size={} gc={}",
        cfg.epochs,
        cfg.batch_size,
        cfg.gc_between_epochs
    );

    let corpus = match &cfg.holdout_dir {
        Some(dir) => {
            let corpus = HoldoutCorpus::load(dir)?;
            info!(
                "holdout corpus loaded: {} labels, {} images",
                corpus.labels().count(),
                corpus.total_images()
            );
            Some(corpus)
        }
        None => None,
    };

    let mut rng = match cfg.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let (model, params) = cfg.model.build(&mut rng)?;
    let classes = cfg.model.classes();

    let mut train_set =
        synthetic_classification(TRAIN_SAMPLES, cfg.model.input(), classes, &mut rng);
    let validation_set =
        synthetic_classification(VALIDATION_SAMPLES, cfg.model.input(), classes, &mut rng);

    let pool = Arc::new(DevicePool::new(cfg.device.0 + 1, RECLAIM_LATENCY));
    let engine = NdEngine::new(
        model,
        params,
        GradientDescent::new(LEARNING_RATE),
        cfg.batch_size,
        StdRng::seed_from_u64(rng.random()),
        Arc::clone(&pool),
        cfg.device,
    );

    let sample = ResourceSample::new(Arc::clone(&pool), cfg.device);
    let mut detection = LeakDetectionLoop::new(
        engine,
        sample,
        cfg.device,
        cfg.epochs,
        cfg.gc_between_epochs,
        cfg.settle,
    );
    detection.add_listener(Box::new(LoggingListener));

    let result = detection.run(&mut train_set, &validation_set, corpus.as_ref());
    if result.is_err() {
        // The trend so far is diagnostic evidence; surface it before failing.
        print!("{}", detection.trend());
    }
    result
}
