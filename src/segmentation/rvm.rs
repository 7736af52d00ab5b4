use super::preprocess::Preprocessor;
use super::types::{InternalResolution, Matte, SegmentationModel};
use anyhow::{Context, Result};
use image::RgbaImage;
use ndarray::{Array4, Ix4};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

/// RobustVideoMatting segmentation model
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) are carried between frames for smooth results.
pub struct RobustVideoMatting {
    session: Session,
    resolution: InternalResolution,
    preprocessor: Option<Preprocessor>,

    // Recurrent hidden states, fed back in on the next frame
    r1: Option<Array4<f32>>,
    r2: Option<Array4<f32>>,
    r3: Option<Array4<f32>>,
    r4: Option<Array4<f32>>,

    // Hidden states are this fraction of the model input
    downsample_ratio: f32,
}

impl RobustVideoMatting {
    /// Create a new RVM model from an ONNX file
    ///
    /// The model input size is derived from the first frame and `resolution`;
    /// it is re-derived (and the hidden states dropped) if the frame size
    /// changes.
    pub fn new<P: AsRef<Path>>(model_path: P, resolution: InternalResolution) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!(?resolution, "RVM model loaded successfully");

        Ok(Self {
            session,
            resolution,
            preprocessor: None,
            r1: None,
            r2: None,
            r3: None,
            r4: None,
            downsample_ratio: 0.25,
        })
    }

    /// Initialize hidden states to zeros for the given model input size
    fn init_hidden_states(&mut self, width: u32, height: u32) {
        let h = (height as f32 * self.downsample_ratio) as usize;
        let w = (width as f32 * self.downsample_ratio) as usize;

        tracing::debug!("Initializing hidden states to {}x{}", w, h);

        self.r1 = Some(Array4::zeros((1, 16, h, w)));
        self.r2 = Some(Array4::zeros((1, 20, h / 2, w / 2)));
        self.r3 = Some(Array4::zeros((1, 24, h / 4, w / 4)));
        self.r4 = Some(Array4::zeros((1, 28, h / 8, w / 8)));
    }

    /// Make sure the preprocessor and hidden states fit this frame size
    fn prepare(&mut self, frame_width: u32, frame_height: u32) -> &Preprocessor {
        let target = self.input_size(frame_width, frame_height);
        let stale = self
            .preprocessor
            .as_ref()
            .map_or(true, |p| p.target_size() != target);
        if stale || self.r1.is_none() {
            tracing::debug!("RVM input set to {}x{}", target.0, target.1);
            self.init_hidden_states(target.0, target.1);
            self.preprocessor = Some(Preprocessor::new(target.0, target.1));
        }
        self.preprocessor.get_or_insert_with(|| Preprocessor::new(target.0, target.1))
    }
}

fn extract_state(value: &ort::value::DynValue) -> Result<Array4<f32>> {
    Ok(value
        .try_extract_array::<f32>()?
        .to_owned()
        .into_dimensionality::<Ix4>()?)
}

impl SegmentationModel for RobustVideoMatting {
    fn segment(&mut self, frame: &RgbaImage) -> Result<Matte> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        let (frame_width, frame_height) = frame.dimensions();
        let input_tensor = self.prepare(frame_width, frame_height).preprocess(frame)?;

        let (Some(r1), Some(r2), Some(r3), Some(r4)) = (&self.r1, &self.r2, &self.r3, &self.r4)
        else {
            anyhow::bail!("RVM hidden states missing after initialization");
        };

        // RVM expects: src (frame), r1, r2, r3, r4
        let infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![
                TensorRef::from_array_view(input_tensor.view())?,
                TensorRef::from_array_view(r1.view())?,
                TensorRef::from_array_view(r2.view())?,
                TensorRef::from_array_view(r3.view())?,
                TensorRef::from_array_view(r4.view())?
            ])
            .context("Failed to run inference")?;
        drop(infer_span);

        // Outputs: fgr, pha, r1..r4. Only the alpha matte and states matter here.
        let pha = outputs[1].try_extract_array::<f32>()?;
        let matte_shape = pha.shape().to_vec();
        anyhow::ensure!(
            matte_shape.len() == 4,
            "unexpected matte shape {:?}",
            matte_shape
        );
        let matte_height = matte_shape[2] as u32;
        let matte_width = matte_shape[3] as u32;
        let matte_flat: Vec<f32> = pha.iter().copied().collect();

        let r1 = extract_state(&outputs[2])?;
        let r2 = extract_state(&outputs[3])?;
        let r3 = extract_state(&outputs[4])?;
        let r4 = extract_state(&outputs[5])?;
        drop(outputs);
        self.r1 = Some(r1);
        self.r2 = Some(r2);
        self.r3 = Some(r3);
        self.r4 = Some(r4);

        Preprocessor::postprocess_matte(
            &matte_flat,
            matte_width,
            matte_height,
            frame_width,
            frame_height,
        )
    }

    fn input_size(&self, frame_width: u32, frame_height: u32) -> (u32, u32) {
        self.resolution.model_input(frame_width, frame_height)
    }
}
