use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const RUNS_DIR: &str = "runs";
const METADATA_FILE: &str = "metadata.json";
pub const SUMMARY_FILE: &str = "summary.json";
pub const REPS_FILE: &str = "reps.csv";

/// On-disk record of one uploaded video and where its outputs go.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JobContext {
    pub job_id: String,
    pub original_name: String,
    pub created_at: DateTime<Utc>,
    pub input_path: PathBuf,
    /// File name of the final video under the processed root
    pub output_filename: String,
    #[serde(skip)]
    pub run_dir: PathBuf,
}

impl JobContext {
    pub fn output_path(&self, processed_root: &Path) -> PathBuf {
        processed_root.join(&self.output_filename)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.run_dir.join(SUMMARY_FILE)
    }

    pub fn reps_path(&self) -> PathBuf {
        self.run_dir.join(REPS_FILE)
    }
}

/// Reduce an uploaded file name to `[A-Za-z0-9._-]`, with no leading dots.
pub fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();

    if cleaned.is_empty() {
        "upload.mp4".to_string()
    } else {
        cleaned
    }
}

/// Allocate paths for a new upload and persist its metadata. The caller
/// writes the uploaded bytes to `input_path`.
pub fn create_job(
    upload_root: &Path,
    processed_root: &Path,
    job_id: &str,
    original_name: &str,
) -> Result<JobContext> {
    let safe_name = sanitize_filename(original_name);
    let stem = Path::new(&safe_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("Invalid video name: {}", original_name))?;

    let run_dir = processed_root.join(RUNS_DIR).join(job_id);
    if run_dir.exists() {
        return Err(anyhow!("Run directory already exists for job {}", job_id));
    }

    fs::create_dir_all(upload_root)?;
    fs::create_dir_all(&run_dir)?;

    let context = JobContext {
        job_id: job_id.to_string(),
        original_name: original_name.to_string(),
        created_at: Utc::now(),
        input_path: upload_root.join(format!("{}_{}", job_id, safe_name)),
        output_filename: format!("processed_{}_{}.mp4", stem, job_id),
        run_dir: run_dir.clone(),
    };

    let content = serde_json::to_string_pretty(&context)?;
    fs::write(run_dir.join(METADATA_FILE), content)
        .with_context(|| format!("Failed to write metadata for job {}", job_id))?;

    Ok(context)
}

/// Every job with a readable metadata.json under the processed root.
pub fn list_jobs(processed_root: &Path) -> Result<Vec<JobContext>> {
    let runs_root = processed_root.join(RUNS_DIR);
    let mut jobs = Vec::new();

    if !runs_root.exists() {
        return Ok(jobs);
    }

    for entry in WalkDir::new(&runs_root)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == METADATA_FILE)
    {
        let content = fs::read_to_string(entry.path())?;
        let mut context: JobContext = match serde_json::from_str(&content) {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!("Skipping unreadable {}: {}", entry.path().display(), e);
                continue;
            }
        };
        if let Some(dir) = entry.path().parent() {
            context.run_dir = dir.to_path_buf();
        }
        jobs.push(context);
    }

    jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(jobs)
}
