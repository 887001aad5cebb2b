//! Final-codec conversion of the intermediate video through an external
//! `ffmpeg` process.

use std::path::Path;
use std::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Target codec settings for the final output.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeParams {
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
}

impl Default for TranscodeParams {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "fast".to_string(),
            crf: 23,
            audio_codec: "aac".to_string(),
        }
    }
}

impl TranscodeParams {
    /// Arguments for `ffmpeg`, overwriting `output` if it exists.
    pub fn ffmpeg_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vcodec".to_string(),
            self.video_codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-acodec".to_string(),
            self.audio_codec.clone(),
            output.to_string_lossy().to_string(),
        ]
    }
}

/// Converts a finished intermediate file into the final deliverable.
pub trait Transcoder {
    fn transcode(
        &self,
        input: &Path,
        output: &Path,
        params: &TranscodeParams,
    ) -> Result<(), TranscodeError>;
}

/// Runs the system `ffmpeg` binary and blocks until it exits.
pub struct FfmpegTranscoder {
    binary: String,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcoder for FfmpegTranscoder {
    fn transcode(
        &self,
        input: &Path,
        output: &Path,
        params: &TranscodeParams,
    ) -> Result<(), TranscodeError> {
        if !input.exists() {
            return Err(TranscodeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("intermediate video not found: {}", input.display()),
            )));
        }

        tracing::info!(
            "Transcoding {} -> {} ({}, preset={}, crf={})",
            input.display(),
            output.display(),
            params.video_codec,
            params.preset,
            params.crf
        );

        let result = Command::new(&self.binary)
            .args(params.ffmpeg_args(input, output))
            .output()
            .map_err(TranscodeError::NotFound)?;

        if !result.status.success() {
            return Err(TranscodeError::ExecutionFailed {
                exit_code: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).to_string(),
            });
        }

        Ok(())
    }
}
