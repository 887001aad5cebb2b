// Finalize: turns the intermediate video into the deliverable and persists
// the per-run artifacts.

use crate::pipeline::error::AnalysisError;
use crate::pipeline::types::{ProcessingState, RepEvent};
use crate::run_artifacts::{write_reps_csv, write_summary_json, SummaryResult};
use crate::video::transcode::{TranscodeParams, Transcoder};
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// `<dir>/<stem>_raw.mp4` next to the final output.
pub fn raw_path_for(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!("{}_raw.mp4", stem))
}

/// Transcode `raw` into `output`. The intermediate file is removed only after
/// a successful transcode; on failure it stays for inspection.
pub fn transcode_and_cleanup(
    transcoder: &dyn Transcoder,
    raw: &Path,
    output: &Path,
    params: &TranscodeParams,
    state: &ProcessingState,
) -> Result<()> {
    let start = Instant::now();

    if let Err(source) = transcoder.transcode(raw, output, params) {
        tracing::error!("Transcode of {} failed: {}", raw.display(), source);
        return Err(AnalysisError::Transcode {
            raw_path: raw.to_path_buf(),
            source,
        }
        .into());
    }

    state.update_stage("transcode", 1, start.elapsed().as_secs_f64() * 1000.0);

    if let Err(e) = fs::remove_file(raw) {
        tracing::warn!(
            "Could not remove intermediate video {}: {}",
            raw.display(),
            e
        );
    }

    tracing::info!("Final video written to {}", output.display());
    Ok(())
}

/// Write the optional summary JSON and per-rep CSV.
pub fn write_artifacts(
    summary: &SummaryResult,
    events: &[RepEvent],
    summary_path: Option<&Path>,
    reps_csv_path: Option<&Path>,
) -> Result<()> {
    if let Some(path) = summary_path {
        write_summary_json(path, summary).map_err(|e| AnalysisError::Artifact {
            path: path.to_path_buf(),
            reason: format!("{:#}", e),
        })?;
        tracing::info!("Summary written to {}", path.display());
    }

    if let Some(path) = reps_csv_path {
        write_reps_csv(path, events).map_err(|e| AnalysisError::Artifact {
            path: path.to_path_buf(),
            reason: format!("{:#}", e),
        })?;
        tracing::info!("Rep log written to {} ({} reps)", path.display(), events.len());
    }

    Ok(())
}
