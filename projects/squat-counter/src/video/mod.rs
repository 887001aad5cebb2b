pub mod ffmpeg_reader;
pub mod opencv_reader;
pub mod processor;
pub mod transcode;
pub mod writer;

use anyhow::Result;
use opencv::core::Mat;

/// Sequential frame decoder over one input file.
pub trait VideoReader: Send {
    /// Frame count reported by the container; may be an estimate.
    fn frame_count(&self) -> Result<usize>;
    fn source_fps(&self) -> Result<f64>;
    /// (width, height) in pixels
    fn frame_size(&self) -> Result<(i32, i32)>;
    /// Next frame in decode order, `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Mat>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Backend {
    #[default]
    Opencv,
    Ffmpeg,
}

/// Open `path` with the selected decoding backend. A reported frame rate of
/// zero is replaced by `default_fps`.
pub fn open_reader(path: &str, backend: Backend, default_fps: f64) -> Result<Box<dyn VideoReader>> {
    let reader: Box<dyn VideoReader> = match backend {
        Backend::Opencv => Box::new(opencv_reader::OpencvReader::new(path, default_fps)?),
        Backend::Ffmpeg => Box::new(ffmpeg_reader::FfmpegReader::new(path, default_fps)?),
    };
    Ok(reader)
}

/// Frame rate to time the video by. Containers without usable metadata
/// report 0 (or garbage); those fall back to `default_fps`.
pub fn resolve_fps(reported: f64, default_fps: f64) -> f64 {
    if reported.is_finite() && reported > 0.0 {
        reported
    } else {
        tracing::warn!(
            "Source reports fps={}, falling back to {:.1}",
            reported,
            default_fps
        );
        default_fps
    }
}


#[cfg(test)]
pub(crate) mod testing {
    use super::VideoReader;
    use anyhow::Result;
    use opencv::core::{Mat, Scalar, CV_8UC3};

    /// Produces `total` blank frames of a fixed size.
    pub(crate) struct MemoryReader {
        pub total: usize,
        pub fps: f64,
        pub width: i32,
        pub height: i32,
        pub emitted: usize,
    }

    impl MemoryReader {
        pub(crate) fn new(total: usize, fps: f64) -> Self {
            Self {
                total,
                fps,
                width: 64,
                height: 48,
                emitted: 0,
            }
        }
    }

    impl VideoReader for MemoryReader {
        fn frame_count(&self) -> Result<usize> {
            Ok(self.total)
        }

        fn source_fps(&self) -> Result<f64> {
            Ok(self.fps)
        }

        fn frame_size(&self) -> Result<(i32, i32)> {
            Ok((self.width, self.height))
        }

        fn next_frame(&mut self) -> Result<Option<Mat>> {
            if self.emitted >= self.total {
                return Ok(None);
            }
            self.emitted += 1;
            let mat =
                Mat::new_rows_cols_with_default(self.height, self.width, CV_8UC3, Scalar::all(0.0))?;
            Ok(Some(mat))
        }
    }
}
