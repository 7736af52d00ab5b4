use super::types::{SegmentationConfig, SegmentationModel};
use crate::frame::Mask;
use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// Mask for a submitted frame, delivered once classification finishes.
pub type PendingMask = oneshot::Receiver<Result<Mask>>;

/// Produces a classification mask for a frame, asynchronously.
///
/// `submit` must return without waiting for the result; the caller polls the
/// receiver. Dropping the sender without sending means the classification was
/// abandoned.
pub trait MaskSource {
    fn submit(&mut self, frame: &RgbaImage) -> PendingMask;

    /// Whether masks come from a segmentation model that must be loaded
    /// before the loop may start.
    fn needs_model(&self) -> bool {
        true
    }
}

/// Matte value above which a pixel counts toward the person score.
const SCORE_CANDIDATE: f32 = 0.5;

/// Mean matte over every pixel the model leans toward person, not only the
/// ones that pass the segmentation cutoff. A few confident pixels inside a
/// weak, diffuse blob still score low.
fn person_score(matte: &[f32]) -> Option<f32> {
    let (sum, count) = matte
        .iter()
        .filter(|&&p| p > SCORE_CANDIDATE)
        .fold((0.0f64, 0usize), |(s, n), &p| (s + p as f64, n + 1));
    (count > 0).then(|| (sum / count as f64) as f32)
}

/// Apply thresholds and flip to a model matte.
pub fn matte_to_mask(
    config: &SegmentationConfig,
    width: u32,
    height: u32,
    matte: &[f32],
) -> crate::error::Result<Mask> {
    let mut mask = Mask::from_matte(width, height, matte, config.segmentation_threshold)?;

    if let (Some(min_score), Some(score)) = (config.score_threshold, person_score(matte)) {
        if score < min_score && mask.person_pixels() > 0 {
            tracing::debug!(score, min_score, "person score below threshold, mask cleared");
            return Ok(Mask::clear(width, height));
        }
    }

    if config.flip_horizontal {
        mask.flip_horizontal();
    }
    Ok(mask)
}

/// Runs a segmentation model off the frame loop on tokio's blocking pool.
pub struct ModelMaskSource {
    model: Arc<Mutex<Box<dyn SegmentationModel + Send>>>,
    config: SegmentationConfig,
    runtime: Handle,
}

impl ModelMaskSource {
    /// Must be called from within a tokio runtime.
    pub fn new(model: Box<dyn SegmentationModel + Send>, config: SegmentationConfig) -> Result<Self> {
        let runtime = Handle::try_current().context("mask source needs a tokio runtime")?;
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            config,
            runtime,
        })
    }
}

impl MaskSource for ModelMaskSource {
    fn submit(&mut self, frame: &RgbaImage) -> PendingMask {
        let (tx, rx) = oneshot::channel();
        let frame = frame.clone();
        let model = Arc::clone(&self.model);
        let config = self.config.clone();

        self.runtime.spawn_blocking(move || {
            let result = classify(&model, &config, &frame);
            if tx.send(result).is_err() {
                tracing::debug!("classification finished after the frame loop stopped");
            }
        });
        rx
    }
}

fn classify(
    model: &Mutex<Box<dyn SegmentationModel + Send>>,
    config: &SegmentationConfig,
    frame: &RgbaImage,
) -> Result<Mask> {
    let matte = model
        .lock()
        .map_err(|_| anyhow!("segmentation model lock poisoned"))?
        .segment(frame)
        .context("Failed to segment frame")?;
    let (width, height) = frame.dimensions();
    Ok(matte_to_mask(config, width, height, &matte)?)
}

/// Reports every frame as background, so the output simply follows the
/// live feed. Used when no model is available.
#[derive(Debug, Default)]
pub struct ClearMaskSource;

impl MaskSource for ClearMaskSource {
    fn submit(&mut self, frame: &RgbaImage) -> PendingMask {
        let (tx, rx) = oneshot::channel();
        let (width, height) = frame.dimensions();
        let _ = tx.send(Ok(Mask::clear(width, height)));
        rx
    }

    fn needs_model(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matte_threshold_and_flip() {
        let config = SegmentationConfig {
            flip_horizontal: true,
            ..SegmentationConfig::default()
        };
        let matte = [0.95, 0.1, 0.2, 0.5, 0.99, 0.0];
        let mask = matte_to_mask(&config, 3, 2, &matte).unwrap();
        assert_eq!(mask.as_slice(), &[0, 0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_score_threshold_clears_weak_person() {
        let config = SegmentationConfig {
            segmentation_threshold: 0.5,
            score_threshold: Some(0.8),
            ..SegmentationConfig::default()
        };
        let weak = [0.6, 0.7, 0.0, 0.0];
        assert_eq!(matte_to_mask(&config, 2, 2, &weak).unwrap().person_pixels(), 0);

        let strong = [0.9, 0.95, 0.0, 0.0];
        assert_eq!(matte_to_mask(&config, 2, 2, &strong).unwrap().person_pixels(), 2);
    }

    #[test]
    fn test_score_rejects_stray_spike_at_default_cutoff() {
        let config = SegmentationConfig {
            score_threshold: Some(0.9),
            ..SegmentationConfig::default()
        };
        // One pixel clears the 0.9 cutoff, but the blob around it is weak.
        let stray = [0.95, 0.6, 0.6, 0.0];
        assert_eq!(Mask::from_matte(2, 2, &stray, 0.9).unwrap().person_pixels(), 1);
        assert_eq!(matte_to_mask(&config, 2, 2, &stray).unwrap().person_pixels(), 0);

        let solid = [0.99, 0.97, 0.95, 0.0];
        assert_eq!(matte_to_mask(&config, 2, 2, &solid).unwrap().person_pixels(), 3);
    }

    #[test]
    fn test_matte_length_mismatch_is_error() {
        let config = SegmentationConfig::default();
        assert!(matte_to_mask(&config, 2, 2, &[0.0; 3]).is_err());
    }

    #[test]
    fn test_clear_source_resolves_immediately() {
        let frame = RgbaImage::new(5, 3);
        let mut rx = ClearMaskSource.submit(&frame);
        let mask = rx.try_recv().unwrap().unwrap();
        assert_eq!(mask.dimensions(), (5, 3));
        assert_eq!(mask.person_pixels(), 0);
    }

    struct HalfPerson;

    impl SegmentationModel for HalfPerson {
        fn segment(&mut self, frame: &RgbaImage) -> Result<crate::segmentation::Matte> {
            let (w, h) = frame.dimensions();
            Ok((0..w * h).map(|i| if i % w < w / 2 { 1.0 } else { 0.0 }).collect())
        }

        fn input_size(&self, frame_width: u32, frame_height: u32) -> (u32, u32) {
            (frame_width, frame_height)
        }
    }

    #[tokio::test]
    async fn test_model_source_classifies_off_thread() {
        let mut source =
            ModelMaskSource::new(Box::new(HalfPerson), SegmentationConfig::default()).unwrap();
        let frame = RgbaImage::new(4, 2);
        let mask = source.submit(&frame).await.unwrap().unwrap();
        assert_eq!(mask.as_slice(), &[1, 1, 0, 0, 1, 1, 0, 0]);
    }
}
