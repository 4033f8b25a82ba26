pub mod analytics;
pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod render;
pub mod scheduler;
pub mod state;
pub mod story;
pub mod trial;

use clap::Parser;

use audio::MemoryBackend;
use cli::Args;
use config::AppConfig;
use error::AppError;
use scheduler::{plan_trials, MusicCondition, PlannedTrial};
use state::ExperimentState;
use story::StoryLibrary;
use trial::run_experiment;

pub fn run() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run_with(args) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();
}

fn run_with(args: Args) -> Result<(), AppError> {
    // ── Configuration and stories ────────────────────────────────────────────
    let config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let library = StoryLibrary::load(&config)?;

    let plan = match &args.story {
        Some(id) => vec![PlannedTrial {
            story_id: id.clone(),
            condition: args.condition.unwrap_or(MusicCondition::Regular),
        }],
        None => {
            let mut rng = match args.seed {
                Some(seed) => fastrand::Rng::with_seed(seed),
                None => fastrand::Rng::new(),
            };
            plan_trials(&config.experiment, &mut rng)
        }
    };
    // Fail before the terminal is taken over.
    for trial in &plan {
        library.require(&trial.story_id)?;
    }

    let mut state = ExperimentState::new(config, library, args.participant(), plan);

    // ── Session ──────────────────────────────────────────────────────────────
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async {
        if args.mute {
            run_experiment(&mut state, MemoryBackend::muted()).await
        } else {
            run_with_device(&mut state).await
        }
    })?;

    // ── Results ──────────────────────────────────────────────────────────────
    if let Some(path) = &args.log_file {
        state.diagnostics.write_jsonl(path)?;
    }
    match &args.output {
        Some(path) => state.write_records(path)?,
        None => println!("{}", state.records_json()?),
    }
    Ok(())
}

#[cfg(feature = "device-audio")]
async fn run_with_device(state: &mut ExperimentState) -> Result<(), AppError> {
    match audio::DeviceBackend::open() {
        Ok(backend) => {
            log::info!("Audio output at {} Hz", backend.sample_rate());
            run_experiment(state, backend).await
        }
        Err(e) => {
            log::warn!("{e}; continuing without music");
            run_experiment(state, MemoryBackend::muted()).await
        }
    }
}

#[cfg(not(feature = "device-audio"))]
async fn run_with_device(state: &mut ExperimentState) -> Result<(), AppError> {
    log::warn!("Built without device audio; continuing without music");
    run_experiment(state, MemoryBackend::muted()).await
}
