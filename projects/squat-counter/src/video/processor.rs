use crate::video::VideoReader;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use opencv::core::Mat;
use std::time::{Duration, Instant};

pub struct DriveStats {
    pub decoded_frames: usize,
    pub duration: Duration,
}

/// A trait for handling video frames. This separates the "how to process"
/// from the "how to read and orchestrate" logic.
pub trait FrameProcessor {
    fn process(&mut self, frame_index: usize, frame: Mat) -> Result<()>;
}

/// Blanket implementation so any closure with the right signature
/// automatically implements FrameProcessor.
impl<F> FrameProcessor for F
where
    F: FnMut(usize, Mat) -> Result<()>,
{
    fn process(&mut self, frame_index: usize, frame: Mat) -> Result<()> {
        self(frame_index, frame)
    }
}

pub struct VideoSession<'a> {
    pub reader: &'a mut dyn VideoReader,
    pub pb: ProgressBar,
    pub start_time: Instant,
    pub decoded_frames: usize,
}

impl<'a> VideoSession<'a> {
    pub fn new(reader: &'a mut dyn VideoReader, show_progress: bool) -> Result<Self> {
        let pb = if show_progress {
            let pb = ProgressBar::new(reader.frame_count()? as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1.yellow} fps, {eta})")?
                    .progress_chars("#>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        Ok(Self {
            reader,
            pb,
            start_time: Instant::now(),
            decoded_frames: 0,
        })
    }
}

/// Decode every frame in order and hand it to `processor` with its index.
/// Stops at end of stream; any decode or processing error aborts the pass.
pub fn process_video<P>(
    reader: &mut dyn VideoReader,
    show_progress: bool,
    mut processor: P,
) -> Result<DriveStats>
where
    P: FrameProcessor,
{
    let mut session = VideoSession::new(reader, show_progress)?;

    while let Some(frame) = session.reader.next_frame()? {
        processor.process(session.decoded_frames, frame)?;
        session.decoded_frames += 1;
        session.pb.inc(1);
    }

    session.pb.finish_with_message("Done");

    Ok(DriveStats {
        decoded_frames: session.decoded_frames,
        duration: session.start_time.elapsed(),
    })
}
