// Pipeline orchestrator: one analysis run from input video to summary
//
// Drives the decode loop, feeds sampled frames through the rep counter,
// draws the feedback overlay, writes every frame to the intermediate file,
// and hands off to finalize for the transcode.

use crate::pipeline::config::AnalysisConfig;
use crate::pipeline::detection::PoseEstimator;
use crate::pipeline::error::AnalysisError;
use crate::pipeline::finalize::{raw_path_for, transcode_and_cleanup};
use crate::pipeline::overlay::{AnnotationOverlay, Clock, MediaClock};
use crate::pipeline::reader::PoseFrameSource;
use crate::pipeline::rep_counter::SquatSession;
use crate::pipeline::stats::summarize;
use crate::pipeline::types::{DetectionResult, FrameSample, ProcessingState, RepEvent};
use crate::run_artifacts::SummaryResult;
use crate::video::processor::process_video;
use crate::video::transcode::Transcoder;
use crate::video::writer::{FrameSink, OpencvRawWriter};
use crate::video::{open_reader, Backend, VideoReader};
use anyhow::Result;
use opencv::core::Mat;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

/// Frame-level counters for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingStats {
    pub frames_written: usize,
    pub frames_sampled: usize,
    pub frames_detected: usize,
    pub frames_not_detected: usize,
    pub frames_failed: usize,
    pub duration: Duration,
}

/// Everything the frame loop produced, before transcoding.
#[derive(Debug)]
pub struct FramePass {
    pub events: Vec<RepEvent>,
    pub stats: ProcessingStats,
}

#[derive(Debug)]
pub struct AnalysisOutcome {
    pub summary: SummaryResult,
    pub events: Vec<RepEvent>,
    pub stats: ProcessingStats,
}

/// Input and output of one analysis.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub backend: Backend,
    pub config: AnalysisConfig,
}

/// Collaborators and shared progress for one invocation. Nothing here is
/// shared between runs.
pub struct Pipeline<'a> {
    pub estimator: &'a mut dyn PoseEstimator,
    pub transcoder: &'a dyn Transcoder,
    pub state: &'a ProcessingState,
    pub show_progress: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        estimator: &'a mut dyn PoseEstimator,
        transcoder: &'a dyn Transcoder,
        state: &'a ProcessingState,
    ) -> Self {
        Self {
            estimator,
            transcoder,
            state,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Analyze `request.input`, writing the annotated video to
    /// `request.output`. Marks `state` complete or failed before returning.
    pub fn analyze_video(&mut self, request: &AnalysisRequest) -> Result<AnalysisOutcome> {
        let result = self.analyze_inner(request);
        match &result {
            Ok(outcome) => {
                self.state.complete();
                tracing::info!(
                    "Analysis of {} finished: {} reps, {} bad",
                    request.input.display(),
                    outcome.summary.squat_count,
                    outcome.summary.bad_reps
                );
            }
            Err(e) => {
                tracing::error!("Analysis of {} failed: {:#}", request.input.display(), e);
                self.state.fail(format!("{:#}", e));
            }
        }
        result
    }

    fn analyze_inner(&mut self, request: &AnalysisRequest) -> Result<AnalysisOutcome> {
        let input = request
            .input
            .to_str()
            .ok_or_else(|| AnalysisError::input("input path is not valid UTF-8"))?;
        if !request.input.exists() {
            return Err(AnalysisError::input(format!("video not found: {}", input)).into());
        }

        let mut reader = open_reader(input, request.backend, request.config.default_fps)
            .map_err(|e| AnalysisError::input(format!("cannot open {}: {:#}", input, e)))?;

        let fps = reader.source_fps()?;
        let (width, height) = reader.frame_size()?;
        let raw_path = raw_path_for(&request.output);

        let mut sink = OpencvRawWriter::create(&raw_path, fps, width, height).map_err(|e| {
            AnalysisError::Encode {
                path: raw_path.clone(),
                reason: format!("{:#}", e),
            }
        })?;

        let clock = MediaClock::new(fps);
        let pass = match self.run_frames(
            reader.as_mut(),
            &mut sink,
            &clock,
            &request.config,
            &raw_path,
        ) {
            Ok(pass) => pass,
            Err(e) => {
                // No partial output on a failed pass
                drop(sink);
                if let Err(rm) = fs::remove_file(&raw_path) {
                    tracing::warn!("Could not remove {}: {}", raw_path.display(), rm);
                }
                return Err(e);
            }
        };

        self.finish(pass, &raw_path, &request.output, &request.config)
    }

    /// Single ordered pass over every decoded frame. Each frame is written
    /// exactly once; only sampled frames carry the overlay.
    pub fn run_frames(
        &mut self,
        reader: &mut dyn VideoReader,
        sink: &mut dyn FrameSink,
        clock: &dyn Clock,
        config: &AnalysisConfig,
        raw_path: &Path,
    ) -> Result<FramePass> {
        let state = self.state;
        state.set_total_frames(reader.frame_count()?);

        let mut source = PoseFrameSource::new(&mut *self.estimator, config.sample_stride)?;
        let mut session = SquatSession::new(config);
        let overlay = AnnotationOverlay::new(config);

        let encode_error = |e: anyhow::Error| -> anyhow::Error {
            AnalysisError::Encode {
                path: raw_path.to_path_buf(),
                reason: format!("{:#}", e),
            }
            .into()
        };

        let drive = process_video(
            reader,
            self.show_progress,
            |frame_index: usize, mut frame: Mat| -> Result<()> {
                let frame_start = Instant::now();
                let t = clock.time_at(frame_index);

                if let FrameSample::Sampled(outcome) = source.sample(frame_index, &frame) {
                    let detection = DetectionResult::from(outcome);
                    let before = session.stage();
                    if session.update(&detection, t).is_some() {
                        state.reps_completed.fetch_add(1, Ordering::Relaxed);
                    }
                    if session.stage() != before {
                        tracing::debug!(
                            "Frame {} ({:.2}s): {:?} -> {:?}",
                            frame_index,
                            t,
                            before,
                            session.stage()
                        );
                    }

                    let visible = overlay.visible_text(
                        session.last_rep_completion_time(),
                        session.latest_feedback(),
                        t,
                    );
                    if let Some(text) = visible {
                        overlay
                            .render(&mut frame, &text)
                            .map_err(|e| encode_error(e.into()))?;
                    }
                    state.update_stage(
                        "detect",
                        source.counts().sampled,
                        frame_start.elapsed().as_secs_f64() * 1000.0,
                    );
                }

                sink.write(&frame).map_err(encode_error)?;

                let ms = frame_start.elapsed().as_secs_f64() * 1000.0;
                state.update_stage("decode", frame_index + 1, ms);
                state.update_stage("encode", sink.frames_written(), ms);
                Ok(())
            },
        )
        .map_err(|e| {
            if e.is::<AnalysisError>() {
                e
            } else {
                AnalysisError::input(format!("decode failed: {:#}", e)).into()
            }
        })?;

        if drive.decoded_frames == 0 {
            return Err(AnalysisError::input("no frames could be decoded").into());
        }

        sink.finish().map_err(encode_error)?;

        let counts = source.counts();
        if counts.failed > 0 {
            tracing::warn!(
                "{} of {} sampled frames failed pose estimation",
                counts.failed,
                counts.sampled
            );
        }

        let stats = ProcessingStats {
            frames_written: sink.frames_written(),
            frames_sampled: counts.sampled,
            frames_detected: counts.detected,
            frames_not_detected: counts.not_detected,
            frames_failed: counts.failed,
            duration: drive.duration,
        };

        let flagged = session
            .events()
            .iter()
            .filter(|e| !e.issues.is_empty())
            .count();
        tracing::info!(
            "Processed {} frames in {:.2}s ({} sampled, {} detected, {} reps, {} flagged)",
            drive.decoded_frames,
            stats.duration.as_secs_f64(),
            stats.frames_sampled,
            stats.frames_detected,
            session.rep_count(),
            flagged
        );

        Ok(FramePass {
            events: session.into_events(),
            stats,
        })
    }

    /// Transcode the intermediate file and reduce the reps into a summary.
    pub fn finish(
        &self,
        pass: FramePass,
        raw_path: &Path,
        output: &Path,
        config: &AnalysisConfig,
    ) -> Result<AnalysisOutcome> {
        transcode_and_cleanup(
            self.transcoder,
            raw_path,
            output,
            &config.transcode,
            self.state,
        )?;

        Ok(AnalysisOutcome {
            summary: summarize(&pass.events),
            events: pass.events,
            stats: pass.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::detection::testing::ScriptedEstimator;
    use crate::pipeline::finalize::tests::{FailingTranscoder, RecordingTranscoder};
    use crate::pipeline::rep_counter::tests::joints_at;
    use crate::pipeline::types::DetectionOutcome;
    use crate::video::testing::MemoryReader;
    use opencv::core::sum_elems;

    /// Keeps a checksum of each written frame instead of encoding it.
    #[derive(Default)]
    struct CountingSink {
        frame_sums: Vec<f64>,
        finished: bool,
    }

    impl FrameSink for CountingSink {
        fn write(&mut self, frame: &Mat) -> Result<()> {
            let sum = sum_elems(frame)?;
            self.frame_sums.push(sum[0] + sum[1] + sum[2]);
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }

        fn frames_written(&self) -> usize {
            self.frame_sums.len()
        }
    }

    struct BrokenSink;

    impl FrameSink for BrokenSink {
        fn write(&mut self, _frame: &Mat) -> Result<()> {
            anyhow::bail!("disk full")
        }

        fn finish(&mut self) -> Result<()> {
            Ok(())
        }

        fn frames_written(&self) -> usize {
            0
        }
    }

    /// Knee angle for a 200-frame squat cycle: stand, descend to 80, hold,
    /// rise, stand.
    fn cycle_angle(frame_index: usize) -> f64 {
        let c = (frame_index % 200) as f64;
        if c < 40.0 {
            170.0
        } else if c < 90.0 {
            170.0 - (c - 40.0) * 1.8
        } else if c < 110.0 {
            80.0
        } else if c < 160.0 {
            80.0 + (c - 110.0) * 1.8
        } else {
            170.0
        }
    }

    fn scripted_squats(total_frames: usize, stride: usize) -> ScriptedEstimator {
        ScriptedEstimator::new(
            (0..total_frames)
                .step_by(stride)
                .map(|f| DetectionOutcome::Detected(joints_at(cycle_angle(f))))
                .collect(),
        )
    }

    fn run(
        frames: usize,
        estimator: &mut ScriptedEstimator,
        config: &AnalysisConfig,
        sink: &mut dyn FrameSink,
    ) -> Result<FramePass> {
        let state = ProcessingState::new("test".to_string(), 0);
        let transcoder = RecordingTranscoder::default();
        let mut reader = MemoryReader::new(frames, 20.0);
        let mut pipeline = Pipeline::new(estimator, &transcoder, &state);
        pipeline.run_frames(
            &mut reader,
            sink,
            &MediaClock::new(20.0),
            config,
            Path::new("unused_raw.mp4"),
        )
    }

    #[test]
    fn test_three_reps_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("out_raw.mp4");
        let output = dir.path().join("out.mp4");

        let config = AnalysisConfig::default();
        let mut estimator = scripted_squats(600, config.sample_stride);
        let state = ProcessingState::new("e2e".to_string(), 0);
        let transcoder = RecordingTranscoder::default();
        let mut reader = MemoryReader::new(600, 20.0);
        let mut sink = CountingSink::default();

        let mut pipeline = Pipeline::new(&mut estimator, &transcoder, &state);
        let pass = pipeline
            .run_frames(&mut reader, &mut sink, &MediaClock::new(20.0), &config, &raw)
            .unwrap();
        fs::write(&raw, b"raw").unwrap();
        let outcome = pipeline.finish(pass, &raw, &output, &config).unwrap();

        let summary = outcome.summary;
        assert_eq!(summary.squat_count, 3);
        assert_eq!(summary.reps_below_parallel, 3);
        assert_eq!(summary.bad_reps, 0);
        assert!(summary.form_issues.is_empty());
        assert!(summary.rep_time.average > 0.0);
        assert!(summary.rep_time.fastest > 0.0);
        assert!(summary.rep_time.slowest > 0.0);

        assert_eq!(outcome.stats.frames_written, 600);
        assert_eq!(outcome.stats.frames_sampled, 200);
        assert_eq!(outcome.stats.frames_detected, 200);
        assert!(sink.finished);
        assert!(!raw.exists());
        assert!(output.exists());
        assert_eq!(state.reps_completed.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_output_frame_count_independent_of_stride() {
        for stride in [1, 2, 3, 7] {
            let config = AnalysisConfig::default().with_sample_stride(stride);
            let mut estimator = scripted_squats(200, stride);
            let mut sink = CountingSink::default();
            let pass = run(200, &mut estimator, &config, &mut sink).unwrap();

            assert_eq!(sink.frames_written(), 200, "stride {stride}");
            assert_eq!(pass.stats.frames_written, 200);
            assert_eq!(estimator.calls, 200_usize.div_ceil(stride));
        }
    }

    #[test]
    fn test_overlay_only_on_sampled_frames_in_show_window() {
        let config = AnalysisConfig::default();
        let mut estimator = scripted_squats(200, config.sample_stride);
        let mut sink = CountingSink::default();
        let pass = run(200, &mut estimator, &config, &mut sink).unwrap();
        assert_eq!(pass.events.len(), 1);

        let drawn: Vec<usize> = sink
            .frame_sums
            .iter()
            .enumerate()
            .filter(|(_, sum)| **sum > 0.0)
            .map(|(i, _)| i)
            .collect();
        assert!(!drawn.is_empty());
        assert!(drawn.iter().all(|i| i % config.sample_stride == 0));

        // Show window is 0.9s = 18 frames at 20 fps from the completing frame
        let first = drawn[0];
        assert!(drawn.iter().all(|i| *i < first + 18));
    }

    #[test]
    fn test_no_detections_counts_nothing() {
        let config = AnalysisConfig::default();
        let mut estimator = ScriptedEstimator::new(vec![]);
        let mut sink = CountingSink::default();
        let pass = run(90, &mut estimator, &config, &mut sink).unwrap();

        assert!(pass.events.is_empty());
        assert_eq!(pass.stats.frames_not_detected, 30);
        assert_eq!(sink.frames_written(), 90);
    }

    #[test]
    fn test_failed_estimates_are_counted_and_skipped() {
        let config = AnalysisConfig::default().with_sample_stride(1);
        let mut outcomes: Vec<DetectionOutcome> = (0..10)
            .map(|_| DetectionOutcome::Detected(joints_at(170.0)))
            .collect();
        outcomes[4] = DetectionOutcome::Failed("inference error".to_string());
        let mut estimator = ScriptedEstimator::new(outcomes);
        let mut sink = CountingSink::default();
        let pass = run(10, &mut estimator, &config, &mut sink).unwrap();

        assert_eq!(pass.stats.frames_failed, 1);
        assert_eq!(pass.stats.frames_detected, 9);
    }

    #[test]
    fn test_empty_video_is_input_error() {
        let config = AnalysisConfig::default();
        let mut estimator = ScriptedEstimator::new(vec![]);
        let mut sink = CountingSink::default();
        let err = run(0, &mut estimator, &config, &mut sink).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::Input(_))
        ));
    }

    #[test]
    fn test_sink_failure_is_encode_error() {
        let config = AnalysisConfig::default();
        let mut estimator = ScriptedEstimator::new(vec![]);
        let err = run(5, &mut estimator, &config, &mut BrokenSink).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::Encode { .. })
        ));
    }

    #[test]
    fn test_transcode_failure_returns_no_summary() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("out_raw.mp4");
        fs::write(&raw, b"raw").unwrap();

        let config = AnalysisConfig::default();
        let mut estimator = ScriptedEstimator::new(vec![]);
        let state = ProcessingState::new("t".to_string(), 0);
        let pipeline = Pipeline::new(&mut estimator, &FailingTranscoder, &state);
        let pass = FramePass {
            events: vec![],
            stats: ProcessingStats::default(),
        };

        let err = pipeline
            .finish(pass, &raw, &dir.path().join("out.mp4"), &config)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::Transcode { .. })
        ));
        assert!(raw.exists());
    }

    #[test]
    fn test_missing_input_fails_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut estimator = ScriptedEstimator::new(vec![]);
        let state = ProcessingState::new("t".to_string(), 0);
        let transcoder = RecordingTranscoder::default();
        let mut pipeline = Pipeline::new(&mut estimator, &transcoder, &state);

        let request = AnalysisRequest {
            input: dir.path().join("nope.mp4"),
            output: dir.path().join("out.mp4"),
            backend: Backend::Opencv,
            config: AnalysisConfig::default(),
        };
        let err = pipeline.analyze_video(&request).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::Input(_))
        ));
        assert!(!state.is_active.load(Ordering::Relaxed));
        assert!(state.error.read().unwrap().is_some());
        assert!(!dir.path().join("out_raw.mp4").exists());
    }
}
