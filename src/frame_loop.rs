//! Frame loop: capture, classify, composite, display.
//!
//! One classification slot is either idle or busy. A tick only captures and
//! submits a new frame while the slot is idle, so at most one classification
//! is ever in flight and frames arriving in the meantime are dropped rather
//! than queued. The display is refreshed on every tick regardless.

use crate::capture::CaptureSource;
use crate::compositor::{CompositeStats, Compositor};
use crate::error::Error;
use crate::frame::Mask;
use crate::output::OutputSink;
use crate::region::RegionSelector;
use crate::segmentation::{MaskSource, PendingMask};
use crate::session::Session;
use anyhow::{Context, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::oneshot::error::TryRecvError;
use tokio::time::MissedTickBehavior;

/// Composited frames between timing reports.
const STATS_INTERVAL: u64 = 30;

enum Slot {
    Idle,
    Busy(PendingMask),
}

/// Public view of the classification slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Busy,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// A mask arrived and the background estimate was updated.
    pub composited: Option<CompositeStats>,
    /// A new frame was captured and submitted for classification.
    pub submitted: bool,
}

#[derive(Debug, Default)]
struct LoopStats {
    frames: u64,
    submitted: u64,
    busy_ticks: u64,
    failed: u64,
    capture: Duration,
    composite: Duration,
    present: Duration,
}

impl LoopStats {
    fn report(&self) {
        let per_frame = |d: Duration| d.as_secs_f64() * 1000.0 / self.frames.max(1) as f64;
        tracing::info!(
            frames = self.frames,
            submitted = self.submitted,
            busy_ticks = self.busy_ticks,
            failed = self.failed,
            capture_ms = format!("{:.1}", per_frame(self.capture)),
            composite_ms = format!("{:.1}", per_frame(self.composite)),
            present_ms = format!("{:.1}", per_frame(self.present)),
            "frame loop timings"
        );
    }
}

pub struct FrameLoop<C, M, O> {
    capture: C,
    source: M,
    sink: O,
    session: Session,
    selector: Box<dyn RegionSelector + Send>,
    compositor: Compositor,
    prime_output: bool,
    slot: Slot,
    stats: LoopStats,
}

impl<C, M, O> FrameLoop<C, M, O>
where
    C: CaptureSource,
    M: MaskSource,
    O: OutputSink,
{
    /// Refuses to start a model-backed source until the session's model is
    /// ready, or a capture that does not match the session's buffers.
    pub fn new(
        capture: C,
        source: M,
        sink: O,
        session: Session,
        selector: Box<dyn RegionSelector + Send>,
        compositor: Compositor,
        prime_output: bool,
    ) -> crate::error::Result<Self> {
        if source.needs_model() && !session.model_ready() {
            return Err(Error::ModelNotReady);
        }
        if capture.resolution() != session.dimensions() {
            return Err(Error::DimensionMismatch {
                what: "capture",
                expected: session.dimensions(),
                actual: capture.resolution(),
            });
        }
        if sink.resolution() != session.dimensions() {
            tracing::info!(
                "Output {:?} differs from capture {:?}; frames are rescaled",
                sink.resolution(),
                session.dimensions()
            );
        }
        tracing::info!(
            selector = selector.name(),
            overlay = ?compositor.overlay(),
            person_removal = session.model_ready(),
            "frame loop ready"
        );
        Ok(Self {
            capture,
            source,
            sink,
            session,
            selector,
            compositor,
            prime_output,
            slot: Slot::Idle,
            stats: LoopStats::default(),
        })
    }

    pub fn state(&self) -> SlotState {
        match self.slot {
            Slot::Idle => SlotState::Idle,
            Slot::Busy(_) => SlotState::Busy,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn sink(&self) -> &O {
        &self.sink
    }

    /// One display refresh.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        let mut outcome = TickOutcome::default();

        let polled = match &mut self.slot {
            Slot::Busy(pending) => Some(pending.try_recv()),
            Slot::Idle => None,
        };
        match polled {
            None => {}
            Some(Err(TryRecvError::Empty)) => self.stats.busy_ticks += 1,
            Some(Ok(Ok(mask))) => {
                self.slot = Slot::Idle;
                outcome.composited = Some(self.apply(&mask)?);
            }
            Some(Ok(Err(e))) => {
                self.slot = Slot::Idle;
                self.stats.failed += 1;
                tracing::warn!("classification failed: {e:#}");
            }
            Some(Err(TryRecvError::Closed)) => {
                self.slot = Slot::Idle;
                self.stats.failed += 1;
                tracing::warn!("classification dropped without a result");
            }
        }

        if matches!(self.slot, Slot::Idle) {
            self.submit_next()?;
            outcome.submitted = true;
        }

        let present_start = Instant::now();
        self.sink
            .write_frame(self.session.output())
            .context("Failed to present output")?;
        self.stats.present += present_start.elapsed();

        Ok(outcome)
    }

    fn submit_next(&mut self) -> Result<()> {
        let capture_start = Instant::now();
        let frame = self
            .capture
            .capture_frame()
            .context("Failed to capture frame")?;
        self.session.store_live(frame)?;
        self.stats.capture += capture_start.elapsed();

        if self.prime_output && self.session.prime_output()? {
            tracing::debug!("output primed from first frame");
        }

        let pending = self.source.submit(self.session.live());
        self.slot = Slot::Busy(pending);
        self.stats.submitted += 1;
        Ok(())
    }

    fn apply(&mut self, mask: &Mask) -> Result<CompositeStats> {
        let (width, height) = self.session.dimensions();
        mask.ensure_dimensions(width, height)?;

        let composite_start = Instant::now();
        let region = self.selector.select(mask);
        let (output, live) = self.session.buffers_mut();
        let stats = self.compositor.composite(output, live, &region)?;
        self.stats.composite += composite_start.elapsed();

        self.stats.frames += 1;
        tracing::trace!(
            refreshed = stats.refreshed,
            held = stats.held,
            "frame composited"
        );
        if self.stats.frames % STATS_INTERVAL == 0 {
            self.stats.report();
        }
        Ok(stats)
    }

    /// Tick at `refresh` until `shutdown` resolves.
    ///
    /// Late ticks are skipped, not bunched up. A classification still in
    /// flight at shutdown runs to completion but its mask is discarded.
    ///
    /// Capture and presentation block on device I/O, so each tick runs under
    /// `block_in_place`; this needs the multi-threaded runtime.
    pub async fn run_until<F>(&mut self, refresh: Duration, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!("Starting frame loop at {:.1} Hz", 1.0 / refresh.as_secs_f64());
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    tokio::task::block_in_place(|| self.tick())?;
                }
            }
        }

        tracing::info!(frames = self.stats.frames, "frame loop stopped");
        Ok(())
    }

    /// Tick at `refresh` until Ctrl+C.
    pub async fn run(&mut self, refresh: Duration) -> Result<()> {
        tracing::info!("Press Ctrl+C to stop");
        self.run_until(refresh, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}
