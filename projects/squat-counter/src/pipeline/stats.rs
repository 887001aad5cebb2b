use crate::pipeline::types::{FormIssue, RepEvent};
use crate::run_artifacts::{RepTime, SummaryResult};
use std::collections::BTreeSet;

/// One decimal, rounded from the exact binary value with ties to even, so
/// 2.25 gives 2.2 and 0.15 (stored just below) gives 0.1.
fn round1(value: f64) -> f64 {
    format!("{:.1}", value).parse().unwrap_or(value)
}

/// Reduce the ordered rep list into the per-video summary.
pub fn summarize(events: &[RepEvent]) -> SummaryResult {
    let reps_below_parallel = events
        .iter()
        .filter(|e| !e.has_issue(FormIssue::ShallowDepth))
        .count();
    let bad_reps = events
        .iter()
        .filter(|e| e.has_issue(FormIssue::KneesIn))
        .count();

    let form_issues: BTreeSet<FormIssue> = events
        .iter()
        .flat_map(|e| e.issues.iter().copied())
        .collect();

    SummaryResult {
        squat_count: events.len(),
        reps_below_parallel,
        bad_reps,
        form_issues: form_issues
            .into_iter()
            .map(|issue| issue.tag().to_string())
            .collect(),
        rep_time: rep_time(events),
    }
}

fn rep_time(events: &[RepEvent]) -> RepTime {
    let durations: Vec<f64> = events.iter().filter_map(|e| e.duration_seconds).collect();
    if durations.is_empty() {
        return RepTime::default();
    }

    let average = durations.iter().sum::<f64>() / durations.len() as f64;
    let fastest = durations.iter().copied().fold(f64::INFINITY, f64::min);
    let slowest = durations.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    RepTime {
        average: round1(average),
        fastest: round1(fastest),
        slowest: round1(slowest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rep(issues: Vec<FormIssue>, duration: Option<f64>) -> RepEvent {
        RepEvent {
            min_knee_angle: 85.0,
            knees_caved_in: issues.contains(&FormIssue::KneesIn),
            issues,
            duration_seconds: duration,
            feedback_text: String::new(),
        }
    }

    #[test]
    fn test_empty_session() {
        let summary = summarize(&[]);
        assert_eq!(summary, SummaryResult::default());
        assert_eq!(summary.rep_time, RepTime { average: 0.0, fastest: 0.0, slowest: 0.0 });
    }

    #[test]
    fn test_rep_time_over_recorded_durations() {
        let events = vec![
            rep(vec![], Some(1.0)),
            rep(vec![], Some(2.0)),
            rep(vec![], Some(3.0)),
        ];
        let summary = summarize(&events);
        assert_eq!(
            summary.rep_time,
            RepTime {
                average: 2.0,
                fastest: 1.0,
                slowest: 3.0
            }
        );
    }

    #[test]
    fn test_reps_without_duration_are_skipped_for_tempo() {
        let events = vec![rep(vec![], None), rep(vec![], Some(1.26)), rep(vec![], None)];
        let summary = summarize(&events);
        assert_eq!(summary.squat_count, 3);
        assert_eq!(summary.rep_time.average, 1.3);
        assert_eq!(summary.rep_time.fastest, 1.3);
    }

    #[test]
    fn test_rep_time_rounds_halfway_durations_to_even() {
        let summary = summarize(&[rep(vec![], Some(2.25))]);
        assert_eq!(summary.rep_time.average, 2.2);

        let summary = summarize(&[rep(vec![], Some(0.15)), rep(vec![], Some(0.25))]);
        assert_eq!(summary.rep_time.fastest, 0.1);
        assert_eq!(summary.rep_time.slowest, 0.2);
        assert_eq!(summary.rep_time.average, 0.2);
    }

    #[test]
    fn test_no_durations_at_all() {
        let summary = summarize(&[rep(vec![], None)]);
        assert_eq!(summary.rep_time, RepTime::default());
    }

    #[test]
    fn test_counts_and_deduplicated_issues() {
        let events = vec![
            rep(vec![FormIssue::KneesIn], Some(1.0)),
            rep(vec![FormIssue::ShallowDepth, FormIssue::KneesIn], Some(1.0)),
            rep(vec![FormIssue::KneesIn], Some(1.0)),
            rep(vec![], Some(1.0)),
        ];
        let summary = summarize(&events);

        assert_eq!(summary.squat_count, 4);
        assert_eq!(summary.reps_below_parallel, 3);
        assert_eq!(summary.bad_reps, 3);
        assert_eq!(summary.form_issues, vec!["shallow_depth", "knees_in"]);
    }
}
