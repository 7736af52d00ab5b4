//! Background-estimate compositor.
//!
//! `output` only ever advances where the background is visible, so whatever a
//! person is standing in front of keeps showing the last background seen there.

use crate::error::{Error, Result};
use crate::frame::OPAQUE;
use crate::region::{Coverage, OcclusionRegion};
use image::{Rgba, RgbaImage};
use serde::Deserialize;

/// Tint painted over held tiles when highlighting.
pub const HIGHLIGHT_FILL: Rgba<u8> = Rgba([255, 0, 0, OPAQUE]);

/// Stroke used to outline the held bounding box when highlighting.
pub const HIGHLIGHT_OUTLINE: Rgba<u8> = Rgba([0, 255, 0, OPAQUE]);

/// Diagnostic drawing on top of the composited output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DebugOverlay {
    #[default]
    Off,
    /// Fill held tiles red, outline the held box green.
    Highlight,
}

/// Pixel counts from one composite pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositeStats {
    pub refreshed: usize,
    pub held: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Compositor {
    overlay: DebugOverlay,
}

impl Compositor {
    pub fn new(overlay: DebugOverlay) -> Self {
        Self { overlay }
    }

    pub fn overlay(&self) -> DebugOverlay {
        self.overlay
    }

    /// Refresh `output` from `live` everywhere the region leaves visible.
    ///
    /// Refreshed pixels take the live RGB with alpha forced opaque. Held and
    /// untouched pixels keep their previous value unless the highlight
    /// overlay is on.
    pub fn composite(
        &self,
        output: &mut RgbaImage,
        live: &RgbaImage,
        region: &OcclusionRegion,
    ) -> Result<CompositeStats> {
        let _span = tracing::debug_span!("composite").entered();

        if output.dimensions() != live.dimensions() {
            return Err(Error::DimensionMismatch {
                what: "live frame",
                expected: output.dimensions(),
                actual: live.dimensions(),
            });
        }

        let (width, height) = output.dimensions();
        let coverage = region.coverage(width, height);
        if coverage.dimensions() != (width, height) {
            return Err(Error::DimensionMismatch {
                what: "occlusion region",
                expected: (width, height),
                actual: coverage.dimensions(),
            });
        }
        let paint_held = self.overlay == DebugOverlay::Highlight
            && matches!(region, OcclusionRegion::Tiles(_));

        let mut stats = CompositeStats::default();
        for ((dst, src), cell) in output
            .pixels_mut()
            .zip(live.pixels())
            .zip(coverage.cells())
        {
            match cell {
                Coverage::Refresh => {
                    *dst = Rgba([src[0], src[1], src[2], OPAQUE]);
                    stats.refreshed += 1;
                }
                Coverage::Hold => {
                    if paint_held {
                        *dst = HIGHLIGHT_FILL;
                    }
                    stats.held += 1;
                }
                Coverage::Untouched => {}
            }
        }

        if self.overlay == DebugOverlay::Highlight {
            if let OcclusionRegion::Box(expanded) = region {
                if let Some(rect) = expanded.pixel_rect(width, height) {
                    outline(output, rect.x0, rect.y0, rect.x1 - 1, rect.y1 - 1);
                }
            }
        }

        Ok(stats)
    }
}

/// One-pixel stroke along the inclusive rectangle `(x0, y0)..=(x1, y1)`.
fn outline(image: &mut RgbaImage, x0: u32, y0: u32, x1: u32, y1: u32) {
    for x in x0..=x1 {
        image.put_pixel(x, y0, HIGHLIGHT_OUTLINE);
        image.put_pixel(x, y1, HIGHLIGHT_OUTLINE);
    }
    for y in y0..=y1 {
        image.put_pixel(x0, y, HIGHLIGHT_OUTLINE);
        image.put_pixel(x1, y, HIGHLIGHT_OUTLINE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Mask;
    use crate::region::{BoundingBoxSelector, RegionSelector, TiledSelector};

    /// Live frame whose pixels encode their own coordinates, with a
    /// translucent alpha so forced opacity is visible.
    fn live_frame(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([x as u8 * 10, y as u8 * 10, 7, 40])
        })
    }

    fn stale_output(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([1, 2, 3, 4]))
    }

    fn mask_with(width: u32, height: u32, people: &[(u32, u32)]) -> Mask {
        let mut data = vec![0u8; (width * height) as usize];
        for &(x, y) in people {
            data[(y * width + x) as usize] = 1;
        }
        Mask::new(width, height, data).unwrap()
    }

    fn assert_matches_live(output: &RgbaImage, live: &RgbaImage) {
        for (x, y, p) in output.enumerate_pixels() {
            let l = live.get_pixel(x, y);
            assert_eq!(*p, Rgba([l[0], l[1], l[2], 255]), "pixel ({x}, {y})");
        }
    }

    #[test]
    fn test_clear_mask_copies_live_opaque() {
        let live = live_frame(6, 5);
        let mask = Mask::clear(6, 5);
        let compositor = Compositor::default();

        let selectors: Vec<Box<dyn RegionSelector>> = vec![
            Box::new(BoundingBoxSelector::default()),
            Box::new(TiledSelector::default()),
        ];
        for selector in selectors {
            let mut output = stale_output(6, 5);
            let stats = compositor
                .composite(&mut output, &live, &selector.select(&mask))
                .unwrap();
            assert_eq!(stats.refreshed, 30);
            assert_eq!(stats.held, 0);
            assert_matches_live(&output, &live);
        }
    }

    #[test]
    fn test_single_pixel_person_refreshes_whole_frame() {
        let live = live_frame(4, 4);
        let mask = mask_with(4, 4, &[(2, 2)]);
        let region = BoundingBoxSelector::new(1.3).unwrap().select(&mask);
        let mut output = stale_output(4, 4);

        let stats = Compositor::default()
            .composite(&mut output, &live, &region)
            .unwrap();

        assert_eq!(stats.refreshed, 16);
        assert_matches_live(&output, &live);
    }

    #[test]
    fn test_box_holds_prior_background() {
        let live = live_frame(10, 10);
        let mask = mask_with(10, 10, &[(3, 3), (6, 6)]);
        let region = BoundingBoxSelector::default().select(&mask);
        let before = stale_output(10, 10);
        let mut output = before.clone();

        let stats = Compositor::default()
            .composite(&mut output, &live, &region)
            .unwrap();

        let OcclusionRegion::Box(expanded) = &region else {
            panic!("expected a box");
        };
        for (x, y, p) in output.enumerate_pixels() {
            if expanded.contains(x, y) {
                assert_eq!(p, before.get_pixel(x, y), "held pixel ({x}, {y})");
            } else {
                let l = live.get_pixel(x, y);
                assert_eq!(*p, Rgba([l[0], l[1], l[2], 255]));
            }
        }
        assert_eq!(stats.held + stats.refreshed, 100);
        assert!(stats.held >= 16);
    }

    #[test]
    fn test_tiles_hold_every_occluded_window() {
        let live = live_frame(12, 12);
        let mask = mask_with(12, 12, &[(5, 7)]);
        let region = TiledSelector::new(4, 2).unwrap().select(&mask);
        let before = stale_output(12, 12);
        let mut output = before.clone();

        Compositor::default()
            .composite(&mut output, &live, &region)
            .unwrap();

        let OcclusionRegion::Tiles(tiles) = &region else {
            panic!("expected tiles");
        };
        for tile in tiles.tiles().iter().filter(|t| t.occluded) {
            for y in tile.window.y0..tile.window.y1 {
                for x in tile.window.x0..tile.window.x1 {
                    assert_eq!(output.get_pixel(x, y), before.get_pixel(x, y));
                }
            }
        }
        assert_eq!(output.get_pixel(0, 0)[3], 255);
    }

    #[test]
    fn test_rejects_mismatched_buffers() {
        let live = live_frame(4, 4);
        let mut output = stale_output(5, 4);
        let err = Compositor::default()
            .composite(&mut output, &live, &OcclusionRegion::Clear)
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn test_highlight_paints_held_tiles() {
        let live = live_frame(12, 12);
        let mask = mask_with(12, 12, &[(6, 6)]);
        let region = TiledSelector::new(4, 2).unwrap().select(&mask);
        let mut output = stale_output(12, 12);

        Compositor::new(DebugOverlay::Highlight)
            .composite(&mut output, &live, &region)
            .unwrap();

        assert_eq!(*output.get_pixel(6, 6), HIGHLIGHT_FILL);
        assert_ne!(*output.get_pixel(0, 0), HIGHLIGHT_FILL);
    }

    #[test]
    fn test_highlight_outlines_box() {
        let live = live_frame(10, 10);
        let mask = mask_with(10, 10, &[(3, 3), (6, 6)]);
        let region = BoundingBoxSelector::new(1.0).unwrap().select(&mask);
        let mut output = stale_output(10, 10);

        Compositor::new(DebugOverlay::Highlight)
            .composite(&mut output, &live, &region)
            .unwrap();

        assert_eq!(*output.get_pixel(3, 3), HIGHLIGHT_OUTLINE);
        assert_eq!(*output.get_pixel(6, 4), HIGHLIGHT_OUTLINE);
        assert_eq!(*output.get_pixel(4, 4), Rgba([1, 2, 3, 4]));
    }

    #[test]
    fn test_rejects_region_from_other_size_mask() {
        let region = TiledSelector::new(4, 2).unwrap().select(&Mask::clear(4, 4));
        let live = live_frame(8, 8);
        let mut output = stale_output(8, 8);

        let err = Compositor::default()
            .composite(&mut output, &live, &region)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: (8, 8),
                actual: (4, 4),
                ..
            }
        ));
        assert_eq!(output, stale_output(8, 8));
    }

    #[test]
    fn test_overlay_off_draws_nothing() {
        let live = live_frame(12, 12);
        let mask = mask_with(12, 12, &[(6, 6)]);
        let region = TiledSelector::new(4, 2).unwrap().select(&mask);
        let before = stale_output(12, 12);

        let coverage = region.coverage(12, 12);
        let mut expected = before.clone();
        for (x, y, p) in expected.enumerate_pixels_mut() {
            if coverage.get(x, y) == Coverage::Refresh {
                let l = live.get_pixel(x, y);
                *p = Rgba([l[0], l[1], l[2], 255]);
            }
        }

        let mut off = before.clone();
        Compositor::new(DebugOverlay::Off)
            .composite(&mut off, &live, &region)
            .unwrap();
        assert_eq!(off, expected);
        assert_eq!(*off.get_pixel(6, 6), Rgba([1, 2, 3, 4]));

        let mut highlighted = before;
        Compositor::new(DebugOverlay::Highlight)
            .composite(&mut highlighted, &live, &region)
            .unwrap();
        assert_ne!(highlighted, off);
    }
}
