use super::{resolve_fps, VideoReader};
use anyhow::{anyhow, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{
        VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT,
        CAP_PROP_FRAME_WIDTH, CAP_PROP_HW_ACCELERATION, VIDEO_ACCELERATION_ANY,
    },
};

pub struct OpencvReader {
    capture: VideoCapture,
    source_fps: f64,
    width: i32,
    height: i32,
    total_frames: usize,
}

impl OpencvReader {
    pub fn new(path: &str, default_fps: f64) -> Result<Self> {
        let mut capture = VideoCapture::from_file(path, CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(anyhow!("Failed to open video file: {}", path));
        }

        // VideoToolbox on macOS, VA-API on Linux, if present
        if let Ok(enabled) = capture.set(CAP_PROP_HW_ACCELERATION, VIDEO_ACCELERATION_ANY as f64) {
            tracing::debug!("OpencvReader: hardware acceleration enabled={}", enabled);
        }

        let fps = resolve_fps(capture.get(CAP_PROP_FPS)?, default_fps);
        let width = capture.get(CAP_PROP_FRAME_WIDTH)? as i32;
        let height = capture.get(CAP_PROP_FRAME_HEIGHT)? as i32;
        let raw_count = capture.get(CAP_PROP_FRAME_COUNT)?.max(0.0) as usize;

        if width <= 0 || height <= 0 {
            return Err(anyhow!("Video has no decodable frames: {}", path));
        }

        tracing::info!(
            "OpencvReader: opened {}, {}x{}, fps={:.2}, stream_frames={}",
            path,
            width,
            height,
            fps,
            raw_count
        );

        Ok(Self {
            capture,
            source_fps: fps,
            width,
            height,
            total_frames: raw_count,
        })
    }
}

impl VideoReader for OpencvReader {
    fn frame_count(&self) -> Result<usize> {
        Ok(self.total_frames)
    }

    fn source_fps(&self) -> Result<f64> {
        Ok(self.source_fps)
    }

    fn frame_size(&self) -> Result<(i32, i32)> {
        Ok((self.width, self.height))
    }

    fn next_frame(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        let success = self.capture.read(&mut frame)?;
        if !success || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }
}
