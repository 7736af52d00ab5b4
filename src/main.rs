use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use vanish::capture::{CaptureSource, WebcamCapture};
use vanish::compositor::{Compositor, DebugOverlay};
use vanish::config::Config;
use vanish::frame_loop::FrameLoop;
use vanish::output::V4L2Output;
use vanish::region::{build_selector, RegionSelector, SelectorKind};
use vanish::segmentation::{
    self, ClearMaskSource, InternalResolution, MaskSource, ModelMaskSource, SegmentationModel,
};
use vanish::session::Session;

#[derive(Parser, Debug)]
#[command(author, version, about = "Erase people from a live webcam feed", long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Output resolution width (defaults to the camera's)
    #[arg(long)]
    output_width: Option<u32>,

    /// Output resolution height (defaults to the camera's)
    #[arg(long)]
    output_height: Option<u32>,

    /// Display refresh rate
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// TOML configuration file
    #[arg(short, long, default_value = "vanish.toml")]
    config: PathBuf,

    /// Path to segmentation model (ONNX file)
    /// If not provided, runs in passthrough mode without person removal
    #[arg(long)]
    model: Option<String>,

    /// Region selection strategy
    #[arg(long, value_enum)]
    selector: Option<SelectorKind>,

    /// Bounding-box growth factor
    #[arg(long)]
    scale: Option<f32>,

    /// Tiled: search window width around each tile center (even)
    #[arg(long)]
    search_radius: Option<u32>,

    /// Tiled: spacing between tile centers
    #[arg(long)]
    resolution_min: Option<u32>,

    /// Probability above which a pixel counts as person
    #[arg(long)]
    segmentation_threshold: Option<f32>,

    /// Minimum mean person confidence for a frame to count as occupied
    #[arg(long)]
    score_threshold: Option<f32>,

    /// Mirror the mask horizontally
    #[arg(long)]
    flip_horizontal: bool,

    /// Model input resolution relative to the camera frame
    #[arg(long, value_enum)]
    internal_resolution: Option<InternalResolution>,

    /// Diagnostic overlay drawn on the output
    #[arg(long, value_enum)]
    debug_overlay: Option<DebugOverlay>,

    /// Start from a transparent background instead of the first frame
    #[arg(long)]
    no_prime: bool,
}

impl Args {
    /// Command-line flags win over the config file.
    fn apply(&self, config: &mut Config) {
        if let Some(kind) = self.selector {
            config.selector.kind = kind;
        }
        if let Some(scale) = self.scale {
            config.selector.scale = scale;
        }
        if let Some(radius) = self.search_radius {
            config.selector.search_radius = radius;
        }
        if let Some(resolution) = self.resolution_min {
            config.selector.resolution_min = resolution;
        }
        if let Some(threshold) = self.segmentation_threshold {
            config.segmentation.segmentation_threshold = threshold;
        }
        if self.score_threshold.is_some() {
            config.segmentation.score_threshold = self.score_threshold;
        }
        if self.flip_horizontal {
            config.segmentation.flip_horizontal = true;
        }
        if let Some(resolution) = self.internal_resolution {
            config.segmentation.internal_resolution = resolution;
        }
        if let Some(overlay) = self.debug_overlay {
            config.display.debug_overlay = overlay;
        }
        if self.no_prime {
            config.display.prime_output = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Vanish starting");

    let mut config = Config::load_or_default(&args.config)?;
    args.apply(&mut config);
    tracing::debug!(?config, "effective configuration");

    let selector = build_selector(&config.selector).context("Invalid selector tuning")?;
    tracing::info!("Region selector: {}", selector.name());
    anyhow::ensure!(args.fps > 0, "fps must be positive");

    // The camera is only enabled once the model has finished loading.
    let model: Option<Box<dyn SegmentationModel + Send>> = match &args.model {
        Some(model_path) => {
            tracing::info!("Loading segmentation model from {}", model_path);
            match segmentation::load_default_model(
                model_path,
                config.segmentation.internal_resolution,
            )
            .await
            {
                Ok(model) => {
                    tracing::info!("Segmentation model loaded successfully");
                    Some(model)
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to load segmentation model: {e:#}; person removal disabled, passing video through"
                    );
                    None
                }
            }
        }
        None => {
            tracing::info!("Running in passthrough mode (no segmentation)");
            None
        }
    };

    let capture = match WebcamCapture::new(args.input_device) {
        Ok(capture) => capture,
        Err(e) => {
            tracing::warn!("Webcam unavailable: {e:#}; nothing to do");
            return Ok(());
        }
    };
    let (width, height) = capture.resolution();
    tracing::info!("Capture: {}x{}", width, height);

    let output_width = args.output_width.unwrap_or(width);
    let output_height = args.output_height.unwrap_or(height);
    tracing::info!("Output: {}x{}", output_width, output_height);
    let output = V4L2Output::new(&args.output_device, output_width, output_height)
        .context("Failed to initialize v4l2loopback output")?;

    let refresh = Duration::from_secs_f64(1.0 / args.fps as f64);
    tracing::info!("Target FPS: {}", args.fps);

    match model {
        Some(model) => {
            let session = Session::new(width, height, true)?;
            let source = ModelMaskSource::new(model, config.segmentation.clone())?;
            run_pipeline(capture, source, output, session, selector, &config, refresh).await
        }
        None => {
            let session = Session::new(width, height, false)?;
            run_pipeline(capture, ClearMaskSource, output, session, selector, &config, refresh)
                .await
        }
    }
}

async fn run_pipeline<M: MaskSource>(
    capture: WebcamCapture,
    source: M,
    output: V4L2Output,
    session: Session,
    selector: Box<dyn RegionSelector + Send>,
    config: &Config,
    refresh: Duration,
) -> Result<()> {
    let compositor = Compositor::new(config.display.debug_overlay);

    let mut frame_loop = FrameLoop::new(
        capture,
        source,
        output,
        session,
        selector,
        compositor,
        config.display.prime_output,
    )?;

    frame_loop.run(refresh).await
}
