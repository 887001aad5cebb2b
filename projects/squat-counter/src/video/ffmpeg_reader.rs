use super::{resolve_fps, VideoReader};
use anyhow::{anyhow, Context, Result};
use ffmpeg_next::ffi;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::Video as VideoFrame;
use opencv::{core, prelude::*};
use std::path::Path;

/// Software decoder backed by FFmpeg via ffmpeg-next. Frames come out as
/// BGR24 `Mat`s so they can be drawn on and written like OpenCV frames.
pub struct FfmpegReader {
    input_ctx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::codec::decoder::Video,
    video_stream_index: usize,
    /// Created on first frame, when the decoded pixel format is known.
    scaler: Option<scaling::Context>,
    width: u32,
    height: u32,
    source_fps: f64,
    total_frames: usize,
    packet: ffmpeg_next::codec::packet::Packet,
    eof_sent: bool,
}

// SAFETY: the reader is owned by a single analysis run and never shared;
// the raw pointers inside ffmpeg-next types do not escape it.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new(path: &str, default_fps: f64) -> Result<Self> {
        ffmpeg_next::init().context("Failed to initialize FFmpeg")?;

        let source = Path::new(path);
        if !source.exists() {
            return Err(anyhow!("Video file not found: {}", path));
        }

        let input_ctx = ffmpeg_next::format::input(&source).context("Failed to open video file")?;

        let video_stream = input_ctx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| anyhow!("No video stream found in {}", path))?;
        let video_stream_index = video_stream.index();

        let rational_fps = video_stream.avg_frame_rate();
        let reported_fps = if rational_fps.denominator() != 0 {
            rational_fps.numerator() as f64 / rational_fps.denominator() as f64
        } else {
            0.0
        };
        let source_fps = resolve_fps(reported_fps, default_fps);

        let stream_frames = video_stream.frames().max(0) as usize;
        let duration_secs = input_ctx.duration() as f64 / ffi::AV_TIME_BASE as f64;
        let total_frames = if stream_frames == 0 {
            (duration_secs.max(0.0) * source_fps).round() as usize
        } else {
            stream_frames
        };

        let decoder_ctx =
            ffmpeg_next::codec::context::Context::from_parameters(video_stream.parameters())
                .context("Failed to create decoder context")?;
        let decoder = decoder_ctx
            .decoder()
            .video()
            .context("Failed to open video decoder")?;

        let width = decoder.width();
        let height = decoder.height();

        tracing::info!(
            "FfmpegReader: opened {}, {}x{}, duration={:.2}s, fps={:.2}, frames={}",
            path,
            width,
            height,
            duration_secs,
            source_fps,
            total_frames
        );

        Ok(Self {
            input_ctx,
            decoder,
            video_stream_index,
            scaler: None,
            width,
            height,
            source_fps,
            total_frames,
            packet: ffmpeg_next::codec::packet::Packet::empty(),
            eof_sent: false,
        })
    }

    /// Pull the next decoded frame, feeding packets as needed.
    /// `Ok(false)` means the stream is exhausted.
    fn decode_next(&mut self, target: &mut VideoFrame) -> Result<bool> {
        loop {
            match self.decoder.receive_frame(target) {
                Ok(()) => return Ok(true),
                Err(ffmpeg_next::Error::Other { errno: ffi::EAGAIN }) => {
                    if self.eof_sent {
                        return Ok(false);
                    }
                }
                Err(ffmpeg_next::Error::Eof) => return Ok(false),
                Err(e) => return Err(anyhow!("Decoder error: {}", e)),
            }

            let mut found_packet = false;
            while self.packet.read(&mut self.input_ctx).is_ok() {
                if self.packet.stream() == self.video_stream_index {
                    self.decoder
                        .send_packet(&self.packet)
                        .context("Failed to send packet to decoder")?;
                    found_packet = true;
                    break;
                }
            }

            if !found_packet {
                // Input exhausted; drain whatever the decoder still holds
                self.decoder
                    .send_eof()
                    .context("Failed to send EOF to decoder")?;
                self.eof_sent = true;
            }
        }
    }

    fn to_bgr(&mut self, frame: &VideoFrame) -> Result<VideoFrame> {
        if self.scaler.is_none() {
            let scaler = scaling::Context::get(
                frame.format(),
                self.width,
                self.height,
                Pixel::BGR24,
                self.width,
                self.height,
                scaling::Flags::BILINEAR,
            )
            .context("Failed to create scaler")?;
            self.scaler = Some(scaler);
        }

        let mut bgr = VideoFrame::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler.run(frame, &mut bgr).context("Scaler failed")?;
        }
        Ok(bgr)
    }
}

/// Deep-copy a BGR24 frame into an owned `Mat`, honouring the row stride.
fn bgr_frame_to_mat(frame: &VideoFrame) -> Result<core::Mat> {
    let width = frame.width() as i32;
    let height = frame.height() as i32;
    let row_bytes = width as usize * 3;
    let data = frame.data(0);
    let stride = frame.stride(0);

    let mut mat =
        core::Mat::new_rows_cols_with_default(height, width, core::CV_8UC3, core::Scalar::all(0.0))?;

    for y in 0..height as usize {
        let src_row = &data[y * stride..y * stride + row_bytes];
        let dst_row = mat.at_row_mut::<core::Vec3b>(y as i32)?;
        for (dst, src) in dst_row.iter_mut().zip(src_row.chunks_exact(3)) {
            *dst = core::Vec3b::from([src[0], src[1], src[2]]);
        }
    }

    Ok(mat)
}

impl VideoReader for FfmpegReader {
    fn frame_count(&self) -> Result<usize> {
        Ok(self.total_frames)
    }

    fn source_fps(&self) -> Result<f64> {
        Ok(self.source_fps)
    }

    fn frame_size(&self) -> Result<(i32, i32)> {
        Ok((self.width as i32, self.height as i32))
    }

    fn next_frame(&mut self) -> Result<Option<core::Mat>> {
        let mut decoded = VideoFrame::empty();
        if !self.decode_next(&mut decoded)? {
            return Ok(None);
        }
        let bgr = self.to_bgr(&decoded)?;
        Ok(Some(bgr_frame_to_mat(&bgr)?))
    }
}
