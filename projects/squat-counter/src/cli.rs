use crate::video::Backend;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Count and grade squats in one video
    Analyze(AnalyzeArgs),
    /// Run the upload/result HTTP service
    Serve(ServeArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Input video
    #[arg(long)]
    pub input: PathBuf,

    /// Annotated output video (mp4)
    #[arg(long)]
    pub output: PathBuf,

    /// Run pose detection on every Nth frame
    #[arg(long, default_value_t = 3)]
    pub stride: usize,

    #[arg(long, value_enum, default_value_t = Backend::Opencv)]
    pub backend: Backend,

    /// YOLO pose model (onnx)
    #[arg(long, env = "SQUAT_COUNTER_MODEL")]
    pub model: String,

    /// x264 preset for the final encode
    #[arg(long, default_value = "fast")]
    pub preset: String,

    /// Constant rate factor for the final encode
    #[arg(long, default_value_t = 23)]
    pub crf: u8,

    /// Write the summary as JSON here
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// Write one CSV row per rep here
    #[arg(long)]
    pub reps_csv: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port to bind to
    #[arg(long, default_value_t = 5000)]
    pub port: u16,

    /// Directory for uploaded videos
    #[arg(long, env = "SQUAT_COUNTER_UPLOAD_ROOT", default_value = "uploads")]
    pub upload_root: PathBuf,

    /// Directory for processed videos and run artifacts
    #[arg(long, env = "SQUAT_COUNTER_PROCESSED_ROOT", default_value = "processed")]
    pub processed_root: PathBuf,

    /// YOLO pose model (onnx)
    #[arg(long, env = "SQUAT_COUNTER_MODEL")]
    pub model: String,

    #[arg(long, value_enum, default_value_t = Backend::Opencv)]
    pub backend: Backend,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_defaults() {
        let args = Args::try_parse_from([
            "squat-counter",
            "analyze",
            "--input",
            "in.mp4",
            "--output",
            "out.mp4",
            "--model",
            "yolo-pose.onnx",
        ])
        .unwrap();

        match args.command {
            Command::Analyze(a) => {
                assert_eq!(a.stride, 3);
                assert_eq!(a.backend, Backend::Opencv);
                assert_eq!(a.preset, "fast");
                assert_eq!(a.crf, 23);
                assert!(a.summary.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_serve_backend_flag() {
        let args = Args::try_parse_from([
            "squat-counter",
            "serve",
            "--model",
            "m.onnx",
            "--backend",
            "ffmpeg",
            "--port",
            "8080",
        ])
        .unwrap();

        match args.command {
            Command::Serve(s) => {
                assert_eq!(s.backend, Backend::Ffmpeg);
                assert_eq!(s.port, 8080);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
