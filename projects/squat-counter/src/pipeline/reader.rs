// Frame source: decides which decoded frames go through pose detection.

use crate::pipeline::detection::PoseEstimator;
use crate::pipeline::error::AnalysisError;
use crate::pipeline::types::{DetectionOutcome, FrameSample};
use anyhow::Result;
use opencv::core::Mat;

/// Detection tallies over one pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SampleCounts {
    pub sampled: usize,
    pub detected: usize,
    pub not_detected: usize,
    pub failed: usize,
}

/// Runs the pose estimator on every `stride`-th frame (0, N, 2N, ...).
/// Other frames are never submitted.
pub struct PoseFrameSource<'a> {
    estimator: &'a mut dyn PoseEstimator,
    stride: usize,
    counts: SampleCounts,
}

impl<'a> PoseFrameSource<'a> {
    pub fn new(estimator: &'a mut dyn PoseEstimator, stride: usize) -> Result<Self> {
        if stride == 0 {
            return Err(AnalysisError::input("sample stride must be at least 1").into());
        }
        Ok(Self {
            estimator,
            stride,
            counts: SampleCounts::default(),
        })
    }

    pub fn is_sampled(&self, frame_index: usize) -> bool {
        frame_index % self.stride == 0
    }

    pub fn sample(&mut self, frame_index: usize, frame: &Mat) -> FrameSample {
        if !self.is_sampled(frame_index) {
            return FrameSample::Skipped;
        }

        self.counts.sampled += 1;
        let outcome = self.estimator.detect(frame);
        match &outcome {
            DetectionOutcome::Detected(_) => self.counts.detected += 1,
            DetectionOutcome::NoPerson => self.counts.not_detected += 1,
            DetectionOutcome::Failed(reason) => {
                self.counts.failed += 1;
                if self.counts.failed == 1 {
                    tracing::warn!(
                        "Pose estimation failed on frame {}: {} (treated as no detection)",
                        frame_index,
                        reason
                    );
                } else {
                    tracing::debug!("Pose estimation failed on frame {}: {}", frame_index, reason);
                }
            }
        }
        FrameSample::Sampled(outcome)
    }

    pub fn counts(&self) -> SampleCounts {
        self.counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::detection::testing::ScriptedEstimator;
    use crate::pipeline::rep_counter::tests::joints_at;
    use opencv::core::{Scalar, CV_8UC3};
    use opencv::prelude::*;

    fn blank() -> Mat {
        Mat::new_rows_cols_with_default(4, 4, CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    #[test]
    fn test_zero_stride_is_input_error() {
        let mut estimator = ScriptedEstimator::new(vec![]);
        let err = PoseFrameSource::new(&mut estimator, 0).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::Input(_))
        ));
    }

    #[test]
    fn test_only_every_nth_frame_is_submitted() {
        let mut estimator = ScriptedEstimator::new(vec![]);
        {
            let mut source = PoseFrameSource::new(&mut estimator, 3).unwrap();
            let frame = blank();
            let samples: Vec<FrameSample> = (0..10).map(|i| source.sample(i, &frame)).collect();

            for (i, sample) in samples.iter().enumerate() {
                assert_eq!(matches!(sample, FrameSample::Sampled(_)), i % 3 == 0, "frame {i}");
            }
            assert_eq!(source.counts().sampled, 4);
        }
        assert_eq!(estimator.calls, 4);
    }

    #[test]
    fn test_stride_one_samples_everything() {
        let mut estimator = ScriptedEstimator::new(vec![]);
        let mut source = PoseFrameSource::new(&mut estimator, 1).unwrap();
        let frame = blank();
        assert!((0..5).all(|i| matches!(source.sample(i, &frame), FrameSample::Sampled(_))));
    }

    #[test]
    fn test_outcomes_are_tallied() {
        let mut estimator = ScriptedEstimator::new(vec![
            DetectionOutcome::Detected(joints_at(170.0)),
            DetectionOutcome::Failed("model exploded".to_string()),
            DetectionOutcome::NoPerson,
            DetectionOutcome::Failed("again".to_string()),
        ]);
        let mut source = PoseFrameSource::new(&mut estimator, 2).unwrap();
        let frame = blank();
        for i in 0..8 {
            source.sample(i, &frame);
        }

        assert_eq!(
            source.counts(),
            SampleCounts {
                sampled: 4,
                detected: 1,
                not_detected: 1,
                failed: 2,
            }
        );
    }
}
