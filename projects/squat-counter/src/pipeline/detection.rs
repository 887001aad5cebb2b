use crate::pipeline::types::{DetectionOutcome, JointSample, Point};
use anyhow::{anyhow, Result};
use image::{DynamicImage, ImageBuffer, Rgb};
use opencv::core::Mat;
use opencv::prelude::*;
use usls::models::YOLO;
use usls::{Config, Image};

/// COCO-17 keypoint slots for the tracked (left) leg.
pub const LEFT_HIP: usize = 11;
pub const LEFT_KNEE: usize = 13;
pub const LEFT_ANKLE: usize = 15;

/// Capability the frame source needs from a pose model: one person's leg
/// joints in normalized coordinates, or a reason there are none.
///
/// Implementations must not fail; internal errors become
/// `DetectionOutcome::Failed`.
pub trait PoseEstimator {
    /// Detection with the reason for a miss kept.
    fn detect(&mut self, image: &Mat) -> DetectionOutcome;
}

/// Keypoint as returned by a model, in pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelKeypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

/// Pick hip/knee/ankle from a COCO-17 keypoint list and normalize them by
/// the frame size. Any joint under `min_confidence` means no usable pose.
pub fn extract_left_leg(
    keypoints: &[PixelKeypoint],
    width: f32,
    height: f32,
    min_confidence: f32,
) -> Option<JointSample> {
    if width <= 0.0 || height <= 0.0 {
        return None;
    }

    let joint = |index: usize| -> Option<Point> {
        let kp = keypoints.get(index)?;
        if kp.confidence < min_confidence {
            return None;
        }
        Some(Point::new(
            (kp.x / width).clamp(0.0, 1.0),
            (kp.y / height).clamp(0.0, 1.0),
        ))
    };

    Some(JointSample {
        hip: joint(LEFT_HIP)?,
        knee: joint(LEFT_KNEE)?,
        ankle: joint(LEFT_ANKLE)?,
    })
}

/// YOLO pose model run through usls. Only the most confident person in the
/// frame is considered.
pub struct UslsPoseEstimator {
    model: YOLO,
    min_confidence: f32,
}

impl UslsPoseEstimator {
    pub fn new(model_path: &str, min_confidence: f32) -> Result<Self> {
        let config = Config::yolo_pose().with_model_file(model_path);

        #[cfg(target_os = "macos")]
        let config = config.with_model_device(usls::Device::CoreMl);

        let config = config.commit()?;
        let model = YOLO::new(config)?;
        tracing::info!("Loaded pose model {}", model_path);
        Ok(Self {
            model,
            min_confidence,
        })
    }

    fn try_estimate(&mut self, image: &Mat) -> Result<Option<JointSample>> {
        let size = image.size()?;
        let dynamic_image = mat_to_dynamic_image(image)?;

        let ys = self.model.forward(&[Image::from(dynamic_image)])?;
        let Some(y) = ys.into_iter().next() else {
            return Ok(None);
        };

        let best = y
            .keypointss
            .iter()
            .zip(y.hbbs.iter())
            .max_by(|(_, a), (_, b)| {
                a.confidence()
                    .unwrap_or(0.0)
                    .total_cmp(&b.confidence().unwrap_or(0.0))
            })
            .map(|(kpts, _)| kpts);

        let Some(keypoints) = best else {
            return Ok(None);
        };

        let pixels: Vec<PixelKeypoint> = keypoints
            .iter()
            .map(|kp| PixelKeypoint {
                x: kp.x(),
                y: kp.y(),
                confidence: kp.confidence().unwrap_or(0.0),
            })
            .collect();

        Ok(extract_left_leg(
            &pixels,
            size.width as f32,
            size.height as f32,
            self.min_confidence,
        ))
    }
}

impl PoseEstimator for UslsPoseEstimator {
    fn detect(&mut self, image: &Mat) -> DetectionOutcome {
        match self.try_estimate(image) {
            Ok(Some(joints)) => DetectionOutcome::Detected(joints),
            Ok(None) => DetectionOutcome::NoPerson,
            Err(e) => DetectionOutcome::Failed(e.to_string()),
        }
    }
}

/// Convert an OpenCV Mat (BGR) to an image::DynamicImage (RGB)
fn mat_to_dynamic_image(mat: &Mat) -> Result<DynamicImage> {
    let mut rgb_mat = Mat::default();
    opencv::imgproc::cvt_color_def(mat, &mut rgb_mat, opencv::imgproc::COLOR_BGR2RGB)?;

    let size = rgb_mat.size()?;
    if !rgb_mat.is_continuous() {
        return Err(anyhow!("Mat is not continuous"));
    }

    let buffer = rgb_mat.data_bytes()?.to_vec();
    let img_buffer =
        ImageBuffer::<Rgb<u8>, _>::from_vec(size.width as u32, size.height as u32, buffer)
            .ok_or_else(|| anyhow!("Failed to create ImageBuffer from Mat data"))?;

    Ok(DynamicImage::ImageRgb8(img_buffer))
}


#[cfg(test)]
pub(crate) mod testing {
    use super::PoseEstimator;
    use crate::pipeline::types::DetectionOutcome;
    use opencv::core::Mat;
    use std::collections::VecDeque;

    /// Replays a fixed list of outcomes, one per call, then reports no person.
    pub(crate) struct ScriptedEstimator {
        outcomes: VecDeque<DetectionOutcome>,
        pub calls: usize,
    }

    impl ScriptedEstimator {
        pub(crate) fn new(outcomes: Vec<DetectionOutcome>) -> Self {
            Self {
                outcomes: outcomes.into(),
                calls: 0,
            }
        }
    }

    impl PoseEstimator for ScriptedEstimator {
        fn detect(&mut self, _image: &Mat) -> DetectionOutcome {
            self.calls += 1;
            self.outcomes
                .pop_front()
                .unwrap_or(DetectionOutcome::NoPerson)
        }
    }
}
