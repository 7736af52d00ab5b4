use super::{Coverage, CoverageMap, OcclusionRegion, RegionSelector};
use crate::error::{Error, Result};
use crate::frame::{Mask, PixelRect};

/// Full width of the square searched around each tile center. Must be even.
pub const DEFAULT_SEARCH_RADIUS: u32 = 300;

/// Spacing between tile centers. About a tenth of the search radius keeps the
/// windows overlapping enough to mop up unclassified body spill.
pub const DEFAULT_RESOLUTION_MIN: u32 = 20;

/// One grid cell: its center, the clamped search window around it, and
/// whether any person pixel fell inside that window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub center: (u32, u32),
    pub window: PixelRect,
    pub occluded: bool,
}

/// Every tile evaluated for one frame.
#[derive(Debug, Clone)]
pub struct TileMap {
    width: u32,
    height: u32,
    tiles: Vec<Tile>,
}

impl TileMap {
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn occluded_tiles(&self) -> usize {
        self.tiles.iter().filter(|t| t.occluded).count()
    }

    /// A pixel inside any occluded window is held, even when a clean window
    /// also covers it. Pixels no window reaches stay untouched.
    pub fn coverage(&self) -> CoverageMap {
        let mut held = WindowCounter::new(self.width, self.height);
        let mut clean = WindowCounter::new(self.width, self.height);
        for tile in &self.tiles {
            if tile.occluded {
                held.add(tile.window);
            } else {
                clean.add(tile.window);
            }
        }
        let held = held.resolve();
        let clean = clean.resolve();

        let cells = held
            .iter()
            .zip(clean.iter())
            .map(|(&h, &c)| {
                if h > 0 {
                    Coverage::Hold
                } else if c > 0 {
                    Coverage::Refresh
                } else {
                    Coverage::Untouched
                }
            })
            .collect();
        CoverageMap::from_cells(self.width, self.height, cells)
    }
}

/// Counts how many rectangles cover each pixel using a 2D difference array.
struct WindowCounter {
    width: usize,
    height: usize,
    diff: Vec<i32>,
}

impl WindowCounter {
    fn new(width: u32, height: u32) -> Self {
        let (width, height) = (width as usize, height as usize);
        Self {
            width,
            height,
            diff: vec![0; (width + 1) * (height + 1)],
        }
    }

    fn add(&mut self, rect: PixelRect) {
        if rect.is_empty() {
            return;
        }
        let stride = self.width + 1;
        let (x0, y0, x1, y1) = (
            rect.x0 as usize,
            rect.y0 as usize,
            rect.x1 as usize,
            rect.y1 as usize,
        );
        self.diff[y0 * stride + x0] += 1;
        self.diff[y0 * stride + x1] -= 1;
        self.diff[y1 * stride + x0] -= 1;
        self.diff[y1 * stride + x1] += 1;
    }

    fn resolve(mut self) -> Vec<i32> {
        let stride = self.width + 1;
        for y in 0..=self.height {
            for x in 0..=self.width {
                let mut v = self.diff[y * stride + x];
                if x > 0 {
                    v += self.diff[y * stride + x - 1];
                }
                if y > 0 {
                    v += self.diff[(y - 1) * stride + x];
                }
                if x > 0 && y > 0 {
                    v -= self.diff[(y - 1) * stride + x - 1];
                }
                self.diff[y * stride + x] = v;
            }
        }
        let mut counts = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            counts.extend_from_slice(&self.diff[y * stride..y * stride + self.width]);
        }
        counts
    }
}

/// Summed-area table over the mask, so any window's person count is O(1).
struct SummedArea {
    stride: usize,
    sums: Vec<u32>,
}

impl SummedArea {
    fn new(mask: &Mask) -> Self {
        let width = mask.width() as usize;
        let height = mask.height() as usize;
        let stride = width + 1;
        let mut sums = vec![0u32; stride * (height + 1)];
        let data = mask.as_slice();
        for y in 0..height {
            let mut row = 0u32;
            for x in 0..width {
                row += u32::from(data[y * width + x] != 0);
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self { stride, sums }
    }

    fn count(&self, rect: PixelRect) -> u32 {
        if rect.is_empty() {
            return 0;
        }
        let s = self.stride;
        let (x0, y0, x1, y1) = (
            rect.x0 as usize,
            rect.y0 as usize,
            rect.x1 as usize,
            rect.y1 as usize,
        );
        self.sums[y1 * s + x1] + self.sums[y0 * s + x0]
            - self.sums[y0 * s + x1]
            - self.sums[y1 * s + x0]
    }
}

/// Judges occlusion window by window on a regular grid.
#[derive(Debug, Clone)]
pub struct TiledSelector {
    search_radius: u32,
    resolution_min: u32,
}

impl TiledSelector {
    pub fn new(search_radius: u32, resolution_min: u32) -> Result<Self> {
        if search_radius == 0 || search_radius % 2 != 0 {
            return Err(Error::InvalidTuning(format!(
                "search radius must be a positive even number, got {search_radius}"
            )));
        }
        if resolution_min == 0 {
            return Err(Error::InvalidTuning(
                "tile resolution must be positive".to_string(),
            ));
        }
        // Windows reach search_radius / 2 either side of a center; with a
        // larger pitch they would leave never-refreshed gaps between tiles.
        if resolution_min > search_radius / 2 {
            return Err(Error::InvalidTuning(format!(
                "tile resolution {resolution_min} exceeds half the search radius {search_radius}"
            )));
        }
        Ok(Self {
            search_radius,
            resolution_min,
        })
    }

    fn search_offset(&self) -> u32 {
        self.search_radius / 2
    }

    /// Tile centers along one axis: every `pitch` pixels starting at `pitch`,
    /// or the midpoint when the axis is no longer than one pitch.
    fn centers(extent: u32, pitch: u32) -> Vec<u32> {
        let centers: Vec<u32> = (pitch..extent).step_by(pitch as usize).collect();
        if centers.is_empty() && extent > 0 {
            vec![extent / 2]
        } else {
            centers
        }
    }

    fn window(center: u32, offset: u32, extent: u32) -> (u32, u32) {
        (
            center.saturating_sub(offset),
            center.saturating_add(offset).min(extent),
        )
    }
}

impl Default for TiledSelector {
    fn default() -> Self {
        Self {
            search_radius: DEFAULT_SEARCH_RADIUS,
            resolution_min: DEFAULT_RESOLUTION_MIN,
        }
    }
}

impl RegionSelector for TiledSelector {
    fn select(&self, mask: &Mask) -> OcclusionRegion {
        let _span = tracing::debug_span!("tiled_select").entered();

        let (width, height) = mask.dimensions();
        let offset = self.search_offset();
        let table = SummedArea::new(mask);

        let xs = Self::centers(width, self.resolution_min);
        let ys = Self::centers(height, self.resolution_min);
        let mut tiles = Vec::with_capacity(xs.len() * ys.len());
        for &x in &xs {
            let (x0, x1) = Self::window(x, offset, width);
            for &y in &ys {
                let (y0, y1) = Self::window(y, offset, height);
                let window = PixelRect { x0, y0, x1, y1 };
                tiles.push(Tile {
                    center: (x, y),
                    window,
                    occluded: table.count(window) > 0,
                });
            }
        }

        let map = TileMap {
            width,
            height,
            tiles,
        };
        tracing::trace!(
            tiles = map.tiles.len(),
            occluded = map.occluded_tiles(),
            "tile scan"
        );
        OcclusionRegion::Tiles(map)
    }

    fn name(&self) -> &'static str {
        "tiled"
    }
}
