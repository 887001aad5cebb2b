// Job table for the HTTP surface. Lives in the server state; each entry owns
// the progress handle of exactly one analysis run.

use crate::pipeline::config::AnalysisConfig;
use crate::pipeline::detection::UslsPoseEstimator;
use crate::pipeline::finalize::write_artifacts;
use crate::pipeline::orchestrator::{AnalysisRequest, Pipeline};
use crate::pipeline::types::{ProcessingState, RepEvent};
use crate::run_artifacts::SummaryResult;
use crate::run_context::{list_jobs, JobContext};
use crate::video::transcode::FfmpegTranscoder;
use crate::video::Backend;
use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Server-wide inputs every job is run with.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub model_path: String,
    pub backend: Backend,
    pub upload_root: PathBuf,
    pub processed_root: PathBuf,
    /// Used for video links when a request carries no Host header
    pub public_url: String,
    pub analysis: AnalysisConfig,
}

/// One full analysis for an uploaded video. Blocking; run it off the async
/// runtime. Each call loads its own model and owns its own session.
pub fn run_job(
    settings: &JobSettings,
    context: &JobContext,
    progress: &ProcessingState,
) -> Result<SummaryResult> {
    let mut estimator =
        match UslsPoseEstimator::new(&settings.model_path, settings.analysis.min_confidence) {
            Ok(estimator) => estimator,
            Err(e) => {
                progress.fail(format!("{:#}", e));
                return Err(e);
            }
        };
    let transcoder = FfmpegTranscoder::new();

    let request = AnalysisRequest {
        input: context.input_path.clone(),
        output: context.output_path(&settings.processed_root),
        backend: settings.backend,
        config: settings.analysis.clone(),
    };

    let outcome = Pipeline::new(&mut estimator, &transcoder, progress).analyze_video(&request)?;
    save_artifacts(context, &outcome.summary, &outcome.events, progress)?;

    Ok(outcome.summary)
}

/// Persist the run's summary and rep log. The analysis has already marked
/// `progress` complete, so a write failure has to be reported there too.
fn save_artifacts(
    context: &JobContext,
    summary: &SummaryResult,
    events: &[RepEvent],
    progress: &ProcessingState,
) -> Result<()> {
    let result = write_artifacts(
        summary,
        events,
        Some(&context.summary_path()),
        Some(&context.reps_path()),
    );
    if let Err(e) = &result {
        progress.fail(format!("{:#}", e));
    }
    result
}

/// Summary as returned by `/result`, with a link to the processed video.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobResult {
    #[serde(flatten)]
    pub summary: SummaryResult,
    pub video_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Processing,
    Done(JobResult),
    Error(String),
}

pub struct JobEntry {
    pub progress: Arc<ProcessingState>,
    pub status: JobStatus,
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload finished jobs from disk. Jobs without a summary were cut short
    /// by a restart and come back as errors.
    pub fn restore(processed_root: &Path, base_url: &str) -> Self {
        let registry = Self::new();
        let contexts = match list_jobs(processed_root) {
            Ok(contexts) => contexts,
            Err(e) => {
                tracing::warn!("Could not list previous jobs: {}", e);
                return registry;
            }
        };

        for context in contexts {
            let progress = Arc::new(ProcessingState::new(context.job_id.clone(), 0));
            let status = match fs::read_to_string(context.summary_path())
                .ok()
                .and_then(|s| serde_json::from_str::<SummaryResult>(&s).ok())
            {
                Some(summary) => {
                    progress.complete();
                    JobStatus::Done(JobResult {
                        summary,
                        video_url: format!("{}/processed/{}", base_url, context.output_filename),
                    })
                }
                None => {
                    let message = "Processing was interrupted".to_string();
                    progress.fail(message.clone());
                    JobStatus::Error(message)
                }
            };
            registry.insert(&context.job_id, progress, status);
        }

        tracing::info!("Restored {} previous jobs", registry.count());
        registry
    }

    pub fn insert(&self, job_id: &str, progress: Arc<ProcessingState>, status: JobStatus) {
        if let Ok(mut jobs) = self.jobs.write() {
            jobs.insert(job_id.to_string(), JobEntry { progress, status });
        }
    }

    pub fn set_status(&self, job_id: &str, status: JobStatus) {
        if let Ok(mut jobs) = self.jobs.write() {
            if let Some(entry) = jobs.get_mut(job_id) {
                entry.status = status;
            }
        }
    }

    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs
            .read()
            .ok()
            .and_then(|jobs| jobs.get(job_id).map(|entry| entry.status.clone()))
    }

    pub fn progress(&self, job_id: &str) -> Option<Arc<ProcessingState>> {
        self.jobs
            .read()
            .ok()
            .and_then(|jobs| jobs.get(job_id).map(|entry| entry.progress.clone()))
    }

    pub fn count(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }
}
