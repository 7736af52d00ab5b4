mod v4l_capture;

pub use v4l_capture::WebcamCapture;

use anyhow::Result;
use image::RgbaImage;

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Capture a single frame
    fn capture_frame(&mut self) -> Result<RgbaImage>;

    /// Native resolution of captured frames.
    ///
    /// Only meaningful once the stream is open; buffers sized from it before
    /// then would be 0x0.
    fn resolution(&self) -> (u32, u32);
}
