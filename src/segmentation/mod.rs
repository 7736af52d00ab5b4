mod preprocess;
mod rvm;
mod source;
pub mod types;

pub use preprocess::Preprocessor;
pub use rvm::RobustVideoMatting;
pub use source::{matte_to_mask, ClearMaskSource, MaskSource, ModelMaskSource, PendingMask};
pub use types::{InternalResolution, Matte, SegmentationConfig, SegmentationModel};

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Create a default segmentation model (RVM)
pub fn create_default_model(
    model_path: &str,
    resolution: InternalResolution,
) -> Result<Box<dyn SegmentationModel + Send>> {
    let model = RobustVideoMatting::new(model_path, resolution)?;
    Ok(Box::new(model))
}

/// Load the default model on the blocking pool.
///
/// The returned future resolves once the model is usable; nothing that needs
/// masks should start before it does.
pub async fn load_default_model(
    model_path: impl Into<PathBuf>,
    resolution: InternalResolution,
) -> Result<Box<dyn SegmentationModel + Send>> {
    let path = model_path.into();
    tokio::task::spawn_blocking(move || {
        let path = path.to_string_lossy();
        create_default_model(&path, resolution)
    })
    .await
    .context("model loading task panicked")?
}
