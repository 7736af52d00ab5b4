use super::CaptureSource;
use anyhow::{ensure, Context, Result};
use image::{DynamicImage, RgbaImage};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    /// Open the camera and start streaming.
    ///
    /// The resolution is read back from the driver after the stream is open,
    /// so it reflects what the camera actually delivers.
    pub fn new(device_index: u32) -> Result<Self> {
        tracing::info!("Initializing webcam {}", device_index);

        let index = CameraIndex::Index(device_index);
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);

        let mut camera = Camera::new(index, requested).context("Failed to open camera")?;

        camera
            .open_stream()
            .context("Failed to open camera stream")?;

        let resolution = camera.resolution();
        let (width, height) = (resolution.width(), resolution.height());
        ensure!(
            width > 0 && height > 0,
            "camera reported an empty resolution {}x{}",
            width,
            height
        );

        tracing::info!("Webcam streaming at {}x{}", width, height);

        Ok(Self {
            camera,
            width,
            height,
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<RgbaImage> {
        let frame = self.camera.frame().context("Failed to capture frame")?;

        let decoded = frame
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        let rgba = DynamicImage::ImageRgb8(decoded).into_rgba8();
        ensure!(
            rgba.dimensions() == (self.width, self.height),
            "camera delivered a {}x{} frame, stream was opened at {}x{}",
            rgba.width(),
            rgba.height(),
            self.width,
            self.height
        );
        Ok(rgba)
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
