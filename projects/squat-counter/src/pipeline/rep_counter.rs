// Rep state machine: turns per-frame knee geometry into counted, graded reps.

use crate::pipeline::config::AnalysisConfig;
use crate::pipeline::geometry::{angle, knees_caving_in};
use crate::pipeline::types::{DetectionResult, FormIssue, JointSample, RepEvent, Stage};

#[derive(Debug, Clone, Copy)]
struct Thresholds {
    up_angle: f64,
    down_angle: f64,
    parallel_angle: f64,
    caving_margin: f32,
}

/// Per-video squat tracking state. Owned by exactly one analysis run.
#[derive(Debug)]
pub struct SquatSession {
    thresholds: Thresholds,
    stage: Stage,
    rep_start_time: Option<f64>,
    current_min_angle: Option<f64>,
    current_caving: bool,
    last_rep_completion_time: Option<f64>,
    latest_feedback: String,
    events: Vec<RepEvent>,
}

impl SquatSession {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            thresholds: Thresholds {
                up_angle: config.up_angle,
                down_angle: config.down_angle,
                parallel_angle: config.parallel_angle,
                caving_margin: config.caving_margin,
            },
            stage: Stage::Unknown,
            rep_start_time: None,
            current_min_angle: None,
            current_caving: false,
            last_rep_completion_time: None,
            latest_feedback: String::new(),
            events: Vec::new(),
        }
    }

    /// Feed one sampled frame. Frames without a detection leave every tracker
    /// untouched, including an open rep's minimum angle and caving flag.
    ///
    /// Returns the rep completed by this frame, if any.
    pub fn update(&mut self, detection: &DetectionResult, now: f64) -> Option<&RepEvent> {
        match detection {
            DetectionResult::Detected(joints) => self.observe(joints, now),
            DetectionResult::NotDetected => None,
        }
    }

    fn observe(&mut self, joints: &JointSample, now: f64) -> Option<&RepEvent> {
        let knee_angle = angle(joints.hip, joints.knee, joints.ankle);

        self.current_min_angle = Some(match self.current_min_angle {
            Some(min) => min.min(knee_angle),
            None => knee_angle,
        });

        if knees_caving_in(
            joints.hip,
            joints.knee,
            joints.ankle,
            self.thresholds.caving_margin,
        ) {
            self.current_caving = true;
        }

        if knee_angle > self.thresholds.up_angle {
            if self.stage == Stage::Down {
                self.complete_rep(now);
                return self.events.last();
            }
            self.stage = Stage::Up;
        } else if knee_angle < self.thresholds.down_angle && self.stage == Stage::Up {
            self.stage = Stage::Down;
            self.rep_start_time = Some(now);
        }

        None
    }

    fn complete_rep(&mut self, now: f64) {
        // The open rep always has at least the current frame's angle
        let min_knee_angle = self.current_min_angle.unwrap_or(f64::INFINITY);

        let mut issues = Vec::new();
        if min_knee_angle >= self.thresholds.parallel_angle {
            issues.push(FormIssue::ShallowDepth);
        }
        if self.current_caving {
            issues.push(FormIssue::KneesIn);
        }

        let feedback_text = if issues.is_empty() {
            "Good rep".to_string()
        } else {
            let reasons: Vec<&str> = issues.iter().map(|i| i.description()).collect();
            format!("Bad rep - {}", reasons.join(", "))
        };

        let duration_seconds = self.rep_start_time.take().map(|start| now - start);

        tracing::debug!(
            "Rep {} complete: min_angle={:.1}, caving={}, duration={:?}, feedback='{}'",
            self.events.len() + 1,
            min_knee_angle,
            self.current_caving,
            duration_seconds,
            feedback_text
        );

        self.latest_feedback = feedback_text.clone();
        self.events.push(RepEvent {
            min_knee_angle,
            knees_caved_in: self.current_caving,
            issues,
            duration_seconds,
            feedback_text,
        });

        self.stage = Stage::Up;
        self.last_rep_completion_time = Some(now);
        self.current_min_angle = None;
        self.current_caving = false;
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn rep_count(&self) -> usize {
        self.events.len()
    }

    pub fn last_rep_completion_time(&self) -> Option<f64> {
        self.last_rep_completion_time
    }

    pub fn latest_feedback(&self) -> &str {
        &self.latest_feedback
    }

    pub fn events(&self) -> &[RepEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<RepEvent> {
        self.events
    }
}
