// Run artifact struct definitions
//
// This module contains the struct definitions for artifacts that are persisted
// within a run's output directory, or handed back to the job layer.

use crate::pipeline::types::RepEvent;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A 2D point in normalized coordinates [0, 1]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Rep tempo in seconds, rounded to one decimal
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct RepTime {
    pub average: f64,
    pub fastest: f64,
    pub slowest: f64,
}

/// Summary of a whole video, as returned to the job layer
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SummaryResult {
    pub squat_count: usize,
    pub reps_below_parallel: usize,
    pub bad_reps: usize,
    pub form_issues: Vec<String>,
    pub rep_time: RepTime,
}

/// One line of reps.csv
#[derive(Serialize, Debug)]
struct RepRow<'a> {
    rep_index: usize,
    min_knee_angle: String,
    knees_caved_in: bool,
    duration_seconds: Option<String>,
    issues: String,
    feedback: &'a str,
}

pub fn write_summary_json(path: &Path, summary: &SummaryResult) -> Result<()> {
    let content = serde_json::to_string_pretty(summary)?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write summary to {}", path.display()))?;
    Ok(())
}

pub fn write_reps_csv(path: &Path, events: &[RepEvent]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    for (i, event) in events.iter().enumerate() {
        let issues: Vec<&str> = event.issues.iter().map(|issue| issue.tag()).collect();
        writer.serialize(RepRow {
            rep_index: i + 1,
            min_knee_angle: format!("{:.1}", event.min_knee_angle),
            knees_caved_in: event.knees_caved_in,
            duration_seconds: event.duration_seconds.map(|d| format!("{:.2}", d)),
            issues: issues.join(";"),
            feedback: &event.feedback_text,
        })?;
    }

    writer.flush()?;
    Ok(())
}
