use anyhow::{anyhow, Result};
use opencv::{
    core::{Mat, Size},
    prelude::*,
    videoio::VideoWriter,
};
use std::path::Path;

/// Destination for every decoded frame, in decode order.
pub trait FrameSink {
    fn write(&mut self, frame: &Mat) -> Result<()>;
    /// Flush and close the container. Called once after the last frame.
    fn finish(&mut self) -> Result<()>;
    fn frames_written(&self) -> usize;
}

/// Intermediate `mp4v` container at source resolution and frame rate.
pub struct OpencvRawWriter {
    writer: VideoWriter,
    frames_written: usize,
}

impl OpencvRawWriter {
    pub fn create(path: &Path, fps: f64, width: i32, height: i32) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("Non UTF-8 output path: {}", path.display()))?;

        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = VideoWriter::new(path_str, fourcc, fps, Size::new(width, height), true)?;
        if !writer.is_opened()? {
            return Err(anyhow!("Failed to open video writer at {}", path.display()));
        }

        tracing::info!(
            "Writing intermediate video {} ({}x{} @ {:.2} fps)",
            path.display(),
            width,
            height,
            fps
        );

        Ok(Self {
            writer,
            frames_written: 0,
        })
    }
}

impl FrameSink for OpencvRawWriter {
    fn write(&mut self, frame: &Mat) -> Result<()> {
        self.writer.write(frame)?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.release()?;
        Ok(())
    }

    fn frames_written(&self) -> usize {
        self.frames_written
    }
}
