//! Per-camera session state.
//!
//! Owns the two frame buffers and the readiness flag for one camera stream.
//! Created once the capture reports its native size and dropped when the
//! stream stops.

use crate::error::{Error, Result};
use crate::frame::copy_opaque;
use image::RgbaImage;

pub struct Session {
    width: u32,
    height: u32,
    /// Frame most recently captured for classification.
    live: RgbaImage,
    /// Rolling background estimate; the only thing ever displayed.
    output: RgbaImage,
    model_ready: bool,
    primed: bool,
}

impl Session {
    /// Both buffers start fully transparent.
    pub fn new(width: u32, height: u32, model_ready: bool) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::DimensionMismatch {
                what: "session",
                expected: (width.max(1), height.max(1)),
                actual: (width, height),
            });
        }
        tracing::debug!(width, height, model_ready, "session created");
        Ok(Self {
            width,
            height,
            live: RgbaImage::new(width, height),
            output: RgbaImage::new(width, height),
            model_ready,
            primed: false,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn model_ready(&self) -> bool {
        self.model_ready
    }

    pub fn live(&self) -> &RgbaImage {
        &self.live
    }

    pub fn output(&self) -> &RgbaImage {
        &self.output
    }

    /// Replace the live buffer with a freshly captured frame.
    pub fn store_live(&mut self, frame: RgbaImage) -> Result<()> {
        if frame.dimensions() != self.dimensions() {
            return Err(Error::DimensionMismatch {
                what: "captured frame",
                expected: self.dimensions(),
                actual: frame.dimensions(),
            });
        }
        self.live = frame;
        Ok(())
    }

    /// Seed `output` with the current live frame, once per session.
    pub fn prime_output(&mut self) -> Result<bool> {
        if self.primed {
            return Ok(false);
        }
        copy_opaque(&mut self.output, &self.live)?;
        self.primed = true;
        Ok(true)
    }

    /// Borrow `output` mutably alongside `live` for compositing.
    pub fn buffers_mut(&mut self) -> (&mut RgbaImage, &RgbaImage) {
        (&mut self.output, &self.live)
    }
}
