use crate::video::transcode::TranscodeParams;

/// Tunables for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Pose detection runs on every Nth frame
    pub sample_stride: usize,
    /// Used when the container reports no frame rate
    pub default_fps: f64,
    /// Knee angle above which the lifter is standing
    pub up_angle: f64,
    /// Knee angle below which a standing lifter enters the bottom of the squat
    pub down_angle: f64,
    /// Minimum knee angle must be under this for the rep to count as below parallel
    pub parallel_angle: f64,
    /// Lateral margin (normalized x) for the knees-in check
    pub caving_margin: f32,
    /// Seconds the feedback text stays on screen after a rep
    pub show_duration: f64,
    /// Seconds of blank after the show window
    pub blink_duration: f64,
    pub min_confidence: f32,
    pub transcode: TranscodeParams,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_stride: 3,
            default_fps: 20.0,
            up_angle: 160.0,
            down_angle: 90.0,
            parallel_angle: 100.0,
            caving_margin: 0.03,
            show_duration: 0.9,
            blink_duration: 0.7,
            min_confidence: 0.5,
            transcode: TranscodeParams::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn with_sample_stride(mut self, stride: usize) -> Self {
        self.sample_stride = stride;
        self
    }

    pub fn with_transcode(mut self, transcode: TranscodeParams) -> Self {
        self.transcode = transcode;
        self
    }
}
