use anyhow::Result;
use image::RgbaImage;
use serde::Deserialize;

/// Person probability per pixel: 0.0 = background, 1.0 = person.
/// Row-major, same dimensions as the frame it was computed from.
pub type Matte = Vec<f32>;

/// Trait for segmentation models
/// Allows swapping between different backends (RVM, MODNet, MediaPipe, etc.)
pub trait SegmentationModel {
    /// Process a frame and return a person matte at the frame's resolution
    fn segment(&mut self, frame: &RgbaImage) -> Result<Matte>;

    /// Model input dimensions for a frame of the given size
    fn input_size(&self, frame_width: u32, frame_height: u32) -> (u32, u32);
}

/// How far the frame is scaled down before inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum InternalResolution {
    Low,
    Medium,
    #[default]
    High,
    Full,
}

/// Model inputs are rounded up to this so the recurrent states divide evenly.
const MODEL_ALIGN: u32 = 64;

impl InternalResolution {
    pub fn scale(self) -> f32 {
        match self {
            InternalResolution::Low => 0.25,
            InternalResolution::Medium => 0.5,
            InternalResolution::High => 0.75,
            InternalResolution::Full => 1.0,
        }
    }

    /// Model input size for a frame, scaled and aligned up to `MODEL_ALIGN`.
    pub fn model_input(self, frame_width: u32, frame_height: u32) -> (u32, u32) {
        let align = |v: u32| {
            let scaled = (v as f32 * self.scale()).round() as u32;
            scaled.div_ceil(MODEL_ALIGN).max(1) * MODEL_ALIGN
        };
        (align(frame_width), align(frame_height))
    }
}

/// Knobs applied when turning a model matte into a classification mask.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentationConfig {
    /// Probability above which a pixel counts as person
    #[serde(default = "default_segmentation_threshold")]
    pub segmentation_threshold: f32,
    /// Minimum mean confidence over the person pixels; below it the frame is
    /// treated as empty. The bounding-box demo ran with 0.2.
    #[serde(default)]
    pub score_threshold: Option<f32>,
    /// Mirror the mask to match a mirrored display
    #[serde(default)]
    pub flip_horizontal: bool,
    #[serde(default)]
    pub internal_resolution: InternalResolution,
}

fn default_segmentation_threshold() -> f32 { 0.9 }

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            segmentation_threshold: default_segmentation_threshold(),
            score_threshold: None,
            flip_horizontal: false,
            internal_resolution: InternalResolution::default(),
        }
    }
}
