//! Enrichment Runner - applies the configured stage chain to one session
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin enrich
//! ```
//!
//! ## Environment Variables
//!
//! - GAZEFLOW_CONTAINER_PATH - Session container database (required)
//! - GAZEFLOW_CHECKPOINT_DIR - Checkpoint directory (default: checkpoints)
//! - GAZEFLOW_CHAIN_BASE - Checkpoint base name (default: session)
//! - GAZEFLOW_SAVE_CHECKPOINTS - Save a checkpoint per stage (default: true)
//! - GAZEFLOW_SKIP_EXISTING - Skip stages with existing checkpoints (default: true)
//! - GAZEFLOW_STAGES - Comma-separated stage chain (default: SaccadeDetector,ClockAligner)
//! - GAZEFLOW_LIKELIHOOD_THRESHOLD - Gaze confidence cutoff (default: 0.95)
//! - GAZEFLOW_FRAME_RATE - Assumed video frame rate in Hz (default: 200)
//! - GAZEFLOW_VELOCITY_PERCENTILE - Velocity peak threshold percentile (default: 99)
//! - GAZEFLOW_ACQUISITION_SAMPLE_RATE - Acquisition device rate in Hz (default: 1000)
//! - RUST_LOG - Logging level (optional, default: info)

use gazeflow::config::PipelineConfig;
use gazeflow::session_core::{Chain, Session, StageRegistry};
use gazeflow::signal_core::{ClockAligner, SaccadeDetector};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let config = PipelineConfig::from_env()?;
    config.validate()?;

    log::info!("🚀 Starting GazeFlow enrichment");
    log::info!("   Container: {}", config.container_path);
    log::info!("   Checkpoints: {} (save: {}, skip existing: {})",
        config.checkpoint_dir,
        config.save_checkpoints,
        config.skip_existing
    );
    log::info!("   Stage chain: {}", config.stages.join(" -> "));
    log::info!("   Frame rate: {} Hz", config.frame_rate);
    log::info!("   Likelihood threshold: {}", config.likelihood_threshold);
    log::info!("   Velocity percentile: {}", config.velocity_percentile);

    // Explicit registry: everything runnable is registered here by hand.
    let mut registry = StageRegistry::new();
    {
        let saccade_config = config.saccade_config();
        registry.register("SaccadeDetector", move || {
            Box::new(SaccadeDetector::new(saccade_config.clone()))
        });
    }
    {
        let channels = config.clock_channels();
        let block_count_path = config.block_count_path.clone();
        let decoder_config = config.decoder_config();
        let sample_rate = config.acquisition_sample_rate;
        registry.register("ClockAligner", move || {
            Box::new(ClockAligner::new(
                channels.clone(),
                block_count_path.clone(),
                decoder_config.clone(),
                sample_rate,
            ))
        });
    }

    let stages = registry.build_chain(&config.stages)?;
    let session = Session::open(&config.container_path)?;

    let chain = Chain::new(
        &config.chain_base,
        &config.checkpoint_dir,
        config.save_checkpoints,
        config.skip_existing,
    );
    let session = chain.run(session, &stages)?;

    log::info!(
        "✅ Chain complete; applied stages: {}",
        session.applied_stages().join(", ")
    );
    Ok(())
}
