use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

pub use crate::run_artifacts::Point;

/// Hip, knee and ankle of one body side, normalized to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointSample {
    pub hip: Point,
    pub knee: Point,
    pub ankle: Point,
}

/// What the pose collaborator produced for one sampled frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionResult {
    Detected(JointSample),
    NotDetected,
}

/// Finer-grained detection result kept for diagnostics. Both non-detected
/// variants fold into `DetectionResult::NotDetected` before counting.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
    Detected(JointSample),
    NoPerson,
    Failed(String),
}

impl From<DetectionOutcome> for DetectionResult {
    fn from(outcome: DetectionOutcome) -> Self {
        match outcome {
            DetectionOutcome::Detected(joints) => DetectionResult::Detected(joints),
            DetectionOutcome::NoPerson | DetectionOutcome::Failed(_) => {
                DetectionResult::NotDetected
            }
        }
    }
}

/// Per-frame output of the frame source.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSample {
    /// Frame fell between sampling strides; written through untouched.
    Skipped,
    Sampled(DetectionOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Unknown,
    Up,
    Down,
}

/// Form problems a single rep can be flagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FormIssue {
    #[serde(rename = "shallow_depth")]
    ShallowDepth,
    #[serde(rename = "knees_in")]
    KneesIn,
}

impl FormIssue {
    pub fn tag(&self) -> &'static str {
        match self {
            FormIssue::ShallowDepth => "shallow_depth",
            FormIssue::KneesIn => "knees_in",
        }
    }

    /// Human-readable cue rendered in the feedback text.
    pub fn description(&self) -> &'static str {
        match self {
            FormIssue::ShallowDepth => "go deeper",
            FormIssue::KneesIn => "knees in",
        }
    }
}

/// One completed repetition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepEvent {
    pub min_knee_angle: f64,
    pub knees_caved_in: bool,
    pub issues: Vec<FormIssue>,
    pub duration_seconds: Option<f64>,
    pub feedback_text: String,
}

impl RepEvent {
    pub fn has_issue(&self, issue: FormIssue) -> bool {
        self.issues.contains(&issue)
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct StageProgress {
    pub current: usize,
    pub total: usize,
    pub ms_per_frame: f64,
}

pub const STAGES: [&str; 4] = ["decode", "detect", "encode", "transcode"];

/// Progress of one analysis, shared with whoever is polling the job.
#[derive(Debug)]
pub struct ProcessingState {
    pub run_id: String,
    pub total_frames: AtomicUsize,
    pub is_active: AtomicBool,
    pub is_complete: AtomicBool,
    pub error: RwLock<Option<String>>,
    pub stages: RwLock<BTreeMap<String, StageProgress>>,
    pub reps_completed: AtomicUsize,
    pub start_time: std::time::Instant,
}

impl ProcessingState {
    pub fn new(run_id: String, total_frames: usize) -> Self {
        let stages = STAGES
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    StageProgress {
                        current: 0,
                        total: total_frames,
                        ms_per_frame: 0.0,
                    },
                )
            })
            .collect();

        Self {
            run_id,
            total_frames: AtomicUsize::new(total_frames),
            is_active: AtomicBool::new(true),
            is_complete: AtomicBool::new(false),
            error: RwLock::new(None),
            stages: RwLock::new(stages),
            reps_completed: AtomicUsize::new(0),
            start_time: std::time::Instant::now(),
        }
    }

    /// Frame totals are only known once the reader has opened the file.
    pub fn set_total_frames(&self, total: usize) {
        self.total_frames.store(total, Ordering::Relaxed);
        if let Ok(mut stages) = self.stages.write() {
            for (name, progress) in stages.iter_mut() {
                progress.total = if name == "transcode" { 1 } else { total };
            }
        }
    }

    pub fn update_stage(&self, stage: &str, current: usize, ms_per_frame: f64) {
        if let Ok(mut stages) = self.stages.write() {
            if let Some(progress) = stages.get_mut(stage) {
                progress.current = current;
                // Exponential moving average keeps the rate readable
                if progress.ms_per_frame == 0.0 {
                    progress.ms_per_frame = ms_per_frame;
                } else {
                    progress.ms_per_frame = progress.ms_per_frame * 0.9 + ms_per_frame * 0.1;
                }
            }
        }
    }

    /// Record a fatal error. Overrides an earlier `complete`, since work after
    /// the analysis (artifact writes) can still fail.
    pub fn fail(&self, message: String) {
        if let Ok(mut error) = self.error.write() {
            *error = Some(message);
        }
        self.is_complete.store(false, Ordering::Relaxed);
        self.is_active.store(false, Ordering::Relaxed);
    }

    pub fn complete(&self) {
        self.is_complete.store(true, Ordering::Relaxed);
        self.is_active.store(false, Ordering::Relaxed);
    }

    pub fn to_progress_json(&self) -> serde_json::Value {
        let stages = self
            .stages
            .read()
            .map(|s| s.clone())
            .unwrap_or_default();

        let encoded = stages.get("encode").map(|s| s.current).unwrap_or(0);
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let effective_fps = if elapsed > 0.0 {
            encoded as f64 / elapsed
        } else {
            0.0
        };

        let stages_json: BTreeMap<String, serde_json::Value> = stages
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    serde_json::json!({
                        "current": v.current,
                        "total": v.total,
                        "ms_per_frame": v.ms_per_frame,
                        "fps": if v.ms_per_frame > 0.0 { 1000.0 / v.ms_per_frame } else { 0.0 }
                    }),
                )
            })
            .collect();

        let error = self.error.read().ok().and_then(|e| e.clone());

        serde_json::json!({
            "run_id": self.run_id,
            "total_frames": self.total_frames.load(Ordering::Relaxed),
            "is_active": self.is_active.load(Ordering::Relaxed),
            "is_complete": self.is_complete.load(Ordering::Relaxed),
            "error": error,
            "stages": stages_json,
            "reps_completed": self.reps_completed.load(Ordering::Relaxed),
            "effective_fps": effective_fps,
        })
    }
}
