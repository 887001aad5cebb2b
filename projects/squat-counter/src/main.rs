mod cli;
mod pipeline;
mod run_artifacts;
mod run_context;
mod video;
mod web;

use anyhow::Result;
use cli::{AnalyzeArgs, Args, Command};
use pipeline::config::AnalysisConfig;
use pipeline::detection::UslsPoseEstimator;
use pipeline::finalize::write_artifacts;
use pipeline::orchestrator::{AnalysisRequest, Pipeline};
use pipeline::types::ProcessingState;
use video::transcode::{FfmpegTranscoder, TranscodeParams};
use web::server::run_server;

fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let config = AnalysisConfig::default()
        .with_sample_stride(args.stride)
        .with_transcode(TranscodeParams {
            preset: args.preset.clone(),
            crf: args.crf,
            ..TranscodeParams::default()
        });

    let mut estimator = UslsPoseEstimator::new(&args.model, config.min_confidence)?;
    let transcoder = FfmpegTranscoder::new();
    let state = ProcessingState::new("cli".to_string(), 0);

    let request = AnalysisRequest {
        input: args.input.clone(),
        output: args.output.clone(),
        backend: args.backend,
        config,
    };

    let outcome = Pipeline::new(&mut estimator, &transcoder, &state)
        .with_progress(true)
        .analyze_video(&request)?;

    write_artifacts(
        &outcome.summary,
        &outcome.events,
        args.summary.as_deref(),
        args.reps_csv.as_deref(),
    )?;

    let stats = &outcome.stats;
    tracing::info!(
        "Frames: {} written, {} sampled, {} detected, {} without a person, {} failed",
        stats.frames_written,
        stats.frames_sampled,
        stats.frames_detected,
        stats.frames_not_detected,
        stats.frames_failed
    );

    println!("{}", serde_json::to_string_pretty(&outcome.summary)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();

    match args.command {
        Command::Analyze(analyze) => {
            tokio::task::spawn_blocking(move || run_analyze(analyze)).await??;
        }
        Command::Serve(serve) => {
            run_server(serve).await?;
        }
    }

    Ok(())
}
