// Time-windowed rep feedback overlay.
//
// Purely cosmetic: reads the rep counter's latest feedback and completion
// time, never writes to it.

use crate::pipeline::config::AnalysisConfig;
use opencv::core::{Mat, Point, Scalar};
use opencv::imgproc::{put_text, FONT_HERSHEY_SIMPLEX, LINE_AA};

/// Source of media time. Durations and overlay windows are measured on this
/// clock, not on wall time, so results do not depend on processing speed.
pub trait Clock {
    /// Seconds from the start of the video to `frame_index`.
    fn time_at(&self, frame_index: usize) -> f64;
}

/// `frame_index / fps`
#[derive(Debug, Clone, Copy)]
pub struct MediaClock {
    fps: f64,
}

impl MediaClock {
    pub fn new(fps: f64) -> Self {
        Self { fps }
    }
}

impl Clock for MediaClock {
    fn time_at(&self, frame_index: usize) -> f64 {
        frame_index as f64 / self.fps
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayPhase {
    /// No rep completed yet
    Idle,
    Showing,
    /// Blink-off window right after showing
    Blank,
    /// Silent until the next rep completes
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackColor {
    Good,
    Bad,
}

impl FeedbackColor {
    fn for_text(text: &str) -> Self {
        if text.starts_with("Bad rep") {
            FeedbackColor::Bad
        } else {
            FeedbackColor::Good
        }
    }

    /// BGR
    pub fn scalar(&self) -> Scalar {
        match self {
            FeedbackColor::Good => Scalar::new(0.0, 200.0, 0.0, 0.0),
            FeedbackColor::Bad => Scalar::new(0.0, 0.0, 255.0, 0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayText<'a> {
    pub text: &'a str,
    pub color: FeedbackColor,
}

#[derive(Debug, Clone, Copy)]
pub struct AnnotationOverlay {
    show_duration: f64,
    blink_duration: f64,
}

impl AnnotationOverlay {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            show_duration: config.show_duration,
            blink_duration: config.blink_duration,
        }
    }

    pub fn phase(&self, last_rep_completion: Option<f64>, t: f64) -> OverlayPhase {
        let Some(last) = last_rep_completion else {
            return OverlayPhase::Idle;
        };

        let elapsed = t - last;
        if elapsed < self.show_duration {
            OverlayPhase::Showing
        } else if elapsed < self.show_duration + self.blink_duration {
            OverlayPhase::Blank
        } else {
            OverlayPhase::Hidden
        }
    }

    /// Text to draw at time `t`, if any.
    pub fn visible_text<'a>(
        &self,
        last_rep_completion: Option<f64>,
        feedback: &'a str,
        t: f64,
    ) -> Option<OverlayText<'a>> {
        if feedback.is_empty() {
            return None;
        }

        match self.phase(last_rep_completion, t) {
            OverlayPhase::Showing => Some(OverlayText {
                text: feedback,
                color: FeedbackColor::for_text(feedback),
            }),
            OverlayPhase::Idle | OverlayPhase::Blank | OverlayPhase::Hidden => None,
        }
    }

    pub fn render(&self, frame: &mut Mat, overlay: &OverlayText) -> opencv::Result<()> {
        put_text(
            frame,
            overlay.text,
            Point::new(15, 40),
            FONT_HERSHEY_SIMPLEX,
            1.0,
            overlay.color.scalar(),
            3,
            LINE_AA,
            false,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{sum_elems, CV_8UC3};
    use opencv::prelude::*;

    fn overlay() -> AnnotationOverlay {
        AnnotationOverlay::new(&AnalysisConfig::default())
    }

    #[test]
    fn test_media_clock() {
        let clock = MediaClock::new(20.0);
        assert_eq!(clock.time_at(0), 0.0);
        assert_eq!(clock.time_at(30), 1.5);
    }

    #[test]
    fn test_nothing_before_first_rep() {
        assert_eq!(overlay().phase(None, 12.0), OverlayPhase::Idle);
        assert!(overlay().visible_text(None, "Good rep", 12.0).is_none());
    }

    #[test]
    fn test_visible_only_inside_show_window() {
        let o = overlay();
        let last = Some(10.0);

        assert!(o.visible_text(last, "Good rep", 10.0).is_some());
        assert!(o.visible_text(last, "Good rep", 10.85).is_some());
        assert!(o.visible_text(last, "Good rep", 10.9).is_none());
        assert_eq!(o.phase(last, 11.2), OverlayPhase::Blank);
        assert!(o.visible_text(last, "Good rep", 11.2).is_none());
        assert_eq!(o.phase(last, 11.7), OverlayPhase::Hidden);
        assert!(o.visible_text(last, "Good rep", 25.0).is_none());
    }

    #[test]
    fn test_next_rep_restarts_window() {
        let o = overlay();
        assert!(o.visible_text(Some(10.0), "Good rep", 14.0).is_none());
        assert!(o.visible_text(Some(13.8), "Good rep", 14.0).is_some());
    }

    #[test]
    fn test_color_follows_feedback() {
        let o = overlay();
        let bad = o
            .visible_text(Some(1.0), "Bad rep - knees in", 1.1)
            .unwrap();
        assert_eq!(bad.color, FeedbackColor::Bad);
        let good = o.visible_text(Some(1.0), "Good rep", 1.1).unwrap();
        assert_eq!(good.color, FeedbackColor::Good);
    }

    #[test]
    fn test_empty_feedback_draws_nothing() {
        assert!(overlay().visible_text(Some(1.0), "", 1.1).is_none());
    }

    #[test]
    fn test_render_draws_in_feedback_color() {
        let mut frame =
            Mat::new_rows_cols_with_default(60, 400, CV_8UC3, Scalar::all(0.0)).unwrap();
        let text = OverlayText {
            text: "Bad rep - go deeper",
            color: FeedbackColor::Bad,
        };
        overlay().render(&mut frame, &text).unwrap();

        let sums = sum_elems(&frame).unwrap();
        assert_eq!(sums[0], 0.0);
        assert!(sums[2] > 0.0);
    }
}
