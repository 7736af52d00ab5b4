use super::{OcclusionRegion, RegionSelector};
use crate::error::{Error, Result};
use crate::frame::{Mask, PixelRect};

/// Margin applied around the detected person to absorb false negatives at
/// the silhouette edge.
pub const DEFAULT_SCALE: f32 = 1.3;

/// Smallest box holding every person pixel.
///
/// Width and height are `max - min`, so a lone pixel has zero extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TightBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl TightBox {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y
    }

    fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }
}

/// The tight box grown by a scale factor about its own center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpandedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ExpandedBox {
    pub fn from_tight(tight: &TightBox, scale: f32) -> Self {
        let width = tight.width() as f32;
        let height = tight.height() as f32;
        let new_width = width * scale;
        let new_height = height * scale;
        let offset_x = (new_width - width) / 2.0;
        let offset_y = (new_height - height) / 2.0;
        Self {
            x: tight.min_x as f32 - offset_x,
            y: tight.min_y as f32 - offset_y,
            width: new_width,
            height: new_height,
        }
    }

    /// A box with zero width or height occludes nothing.
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Inclusive on all four edges.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        let (x, y) = (x as f32, y as f32);
        self.has_area()
            && x >= self.x
            && x <= self.x + self.width
            && y >= self.y
            && y <= self.y + self.height
    }

    /// Pixels of a `width`x`height` frame that fall inside the box, or `None`
    /// when no pixel does.
    pub fn pixel_rect(&self, width: u32, height: u32) -> Option<PixelRect> {
        if !self.has_area() {
            return None;
        }
        let (x0, x1) = axis_span(self.x, self.width, width);
        let (y0, y1) = axis_span(self.y, self.height, height);
        let rect = PixelRect { x0, y0, x1, y1 };
        (!rect.is_empty()).then_some(rect)
    }
}

/// Integer pixels `p` with `start <= p <= start + len`, clamped to `[0, extent)`.
fn axis_span(start: f32, len: f32, extent: u32) -> (u32, u32) {
    let lo = start.ceil().max(0.0);
    let hi = ((start + len).floor() + 1.0).min(extent as f32);
    if hi <= lo {
        (0, 0)
    } else {
        (lo as u32, hi as u32)
    }
}

/// Occludes one padded rectangle around every person pixel in the frame.
#[derive(Debug, Clone)]
pub struct BoundingBoxSelector {
    scale: f32,
}

impl BoundingBoxSelector {
    pub fn new(scale: f32) -> Result<Self> {
        if !scale.is_finite() || scale < 1.0 {
            return Err(Error::InvalidTuning(format!(
                "bounding-box scale must be a finite value >= 1.0, got {scale}"
            )));
        }
        Ok(Self { scale })
    }

    /// Tight bounds of the person pixels, `None` when the mask holds no person.
    pub fn tight_box(mask: &Mask) -> Option<TightBox> {
        let width = mask.width() as usize;
        if width == 0 {
            return None;
        }
        let mut bounds: Option<TightBox> = None;
        for (n, _) in mask.as_slice().iter().enumerate().filter(|&(_, &v)| v != 0) {
            let x = (n % width) as u32;
            let y = (n / width) as u32;
            match bounds.as_mut() {
                Some(b) => b.include(x, y),
                None => {
                    bounds = Some(TightBox {
                        min_x: x,
                        min_y: y,
                        max_x: x,
                        max_y: y,
                    })
                }
            }
        }
        bounds
    }
}

impl Default for BoundingBoxSelector {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCALE,
        }
    }
}

impl RegionSelector for BoundingBoxSelector {
    fn select(&self, mask: &Mask) -> OcclusionRegion {
        let _span = tracing::debug_span!("bounding_box_select").entered();

        match Self::tight_box(mask) {
            Some(tight) => {
                let expanded = ExpandedBox::from_tight(&tight, self.scale);
                tracing::trace!(?tight, ?expanded, "person bounds");
                OcclusionRegion::Box(expanded)
            }
            None => OcclusionRegion::Clear,
        }
    }

    fn name(&self) -> &'static str {
        "bounding-box"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Coverage;

    fn mask_with(width: u32, height: u32, people: &[(u32, u32)]) -> Mask {
        let mut data = vec![0u8; (width * height) as usize];
        for &(x, y) in people {
            data[(y * width + x) as usize] = 1;
        }
        Mask::new(width, height, data).unwrap()
    }

    #[test]
    fn test_no_person_is_clear() {
        let selector = BoundingBoxSelector::default();
        let region = selector.select(&Mask::clear(8, 8));
        assert!(matches!(region, OcclusionRegion::Clear));
        assert!(region.is_clear());
    }

    #[test]
    fn test_tight_box_tracks_extremes() {
        let mask = mask_with(10, 10, &[(3, 2), (7, 5), (4, 8)]);
        let tight = BoundingBoxSelector::tight_box(&mask).unwrap();
        assert_eq!(
            tight,
            TightBox {
                min_x: 3,
                min_y: 2,
                max_x: 7,
                max_y: 8
            }
        );
        assert_eq!(tight.width(), 4);
        assert_eq!(tight.height(), 6);
    }

    #[test]
    fn test_expansion_keeps_center_and_scales_size() {
        let tight = TightBox {
            min_x: 10,
            min_y: 20,
            max_x: 50,
            max_y: 100,
        };
        let expanded = ExpandedBox::from_tight(&tight, 1.3);
        let (cx, cy) = expanded.center();
        assert!((cx - 30.0).abs() < 1e-4);
        assert!((cy - 60.0).abs() < 1e-4);
        assert!((expanded.width - 52.0).abs() < 1e-4);
        assert!((expanded.height - 104.0).abs() < 1e-4);
    }

    #[test]
    fn test_single_pixel_has_zero_area() {
        let mask = mask_with(4, 4, &[(2, 2)]);
        let selector = BoundingBoxSelector::new(1.3).unwrap();
        let region = selector.select(&mask);
        match &region {
            OcclusionRegion::Box(b) => {
                assert_eq!((b.x, b.y, b.width, b.height), (2.0, 2.0, 0.0, 0.0));
                assert!(!b.has_area());
                assert!(!b.contains(2, 2));
            }
            other => panic!("expected a box, got {other:?}"),
        }
        assert!(region.is_clear());
        assert_eq!(region.coverage(4, 4).count(Coverage::Refresh), 16);
    }

    #[test]
    fn test_one_pixel_thick_person_excludes_nothing() {
        let mask = mask_with(6, 6, &[(1, 3), (4, 3)]);
        let region = BoundingBoxSelector::default().select(&mask);
        assert_eq!(region.coverage(6, 6).count(Coverage::Hold), 0);
    }

    #[test]
    fn test_coverage_holds_inclusive_expanded_box() {
        // Tight box 4..=6 on both axes, expanded by 1.5 -> 3.5..=6.5.
        let mask = mask_with(10, 10, &[(4, 4), (6, 6)]);
        let selector = BoundingBoxSelector::new(1.5).unwrap();
        let map = selector.select(&mask).coverage(10, 10);
        for y in 0..10 {
            for x in 0..10 {
                let inside = (4..=6).contains(&x) && (4..=6).contains(&y);
                let expected = if inside {
                    Coverage::Hold
                } else {
                    Coverage::Refresh
                };
                assert_eq!(map.get(x, y), expected, "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_exact_edges_are_inside() {
        let tight = TightBox {
            min_x: 2,
            min_y: 2,
            max_x: 5,
            max_y: 5,
        };
        let expanded = ExpandedBox::from_tight(&tight, 1.0);
        assert!(expanded.contains(2, 2));
        assert!(expanded.contains(5, 5));
        assert!(!expanded.contains(6, 5));
        let rect = expanded.pixel_rect(10, 10).unwrap();
        assert_eq!(
            rect,
            PixelRect {
                x0: 2,
                y0: 2,
                x1: 6,
                y1: 6
            }
        );
    }

    #[test]
    fn test_expanded_box_clamps_to_frame() {
        let mask = mask_with(8, 8, &[(0, 0), (7, 7)]);
        let map = BoundingBoxSelector::default().select(&mask).coverage(8, 8);
        assert_eq!(map.count(Coverage::Hold), 64);
    }

    #[test]
    fn test_rejects_shrinking_scale() {
        assert!(BoundingBoxSelector::new(0.5).is_err());
        assert!(BoundingBoxSelector::new(f32::NAN).is_err());
    }
}
