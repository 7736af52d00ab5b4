//! Region selection: decide which pixels a person currently occludes.
//!
//! A `RegionSelector` turns a classification `Mask` into an `OcclusionRegion`,
//! and the region expands into a per-pixel `CoverageMap` that the compositor
//! walks. Two strategies exist and are picked at startup:
//! - `BoundingBoxSelector`: one padded rectangle around every person pixel
//! - `TiledSelector`: overlapping square windows on a fixed grid, each one
//!   clean or occluded on its own

mod bounding_box;
mod tiled;

pub use bounding_box::{BoundingBoxSelector, ExpandedBox, TightBox, DEFAULT_SCALE};
pub use tiled::{Tile, TileMap, TiledSelector, DEFAULT_RESOLUTION_MIN, DEFAULT_SEARCH_RADIUS};

use crate::error::Result;
use crate::frame::{pixel_index, Mask, PixelRect};
use serde::Deserialize;

/// What the compositor does with one pixel this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// Outside every window the selector evaluated; left as is.
    Untouched,
    /// Background is visible; copy the live pixel.
    Refresh,
    /// Occluded by a person; keep the last known background.
    Hold,
}

/// Per-pixel coverage for a whole frame, row-major.
#[derive(Debug, Clone)]
pub struct CoverageMap {
    width: u32,
    height: u32,
    cells: Vec<Coverage>,
}

impl CoverageMap {
    pub fn filled(width: u32, height: u32, value: Coverage) -> Self {
        Self {
            width,
            height,
            cells: vec![value; width as usize * height as usize],
        }
    }

    pub(crate) fn from_cells(width: u32, height: u32, cells: Vec<Coverage>) -> Self {
        debug_assert_eq!(cells.len(), width as usize * height as usize);
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn fill_rect(&mut self, rect: PixelRect, value: Coverage) {
        if rect.is_empty() {
            return;
        }
        let x1 = rect.x1.min(self.width);
        let y1 = rect.y1.min(self.height);
        for y in rect.y0..y1 {
            let start = pixel_index(self.width, rect.x0, y);
            let end = pixel_index(self.width, x1, y);
            self.cells[start..end].fill(value);
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Coverage {
        self.cells[pixel_index(self.width, x, y)]
    }

    pub fn cells(&self) -> &[Coverage] {
        &self.cells
    }

    pub fn count(&self, value: Coverage) -> usize {
        self.cells.iter().filter(|&&c| c == value).count()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// The pixels judged to be covered by a person for the current frame.
#[derive(Debug, Clone)]
pub enum OcclusionRegion {
    /// Nothing occluded; the whole frame refreshes.
    Clear,
    /// A padded rectangle around the detected person.
    Box(ExpandedBox),
    /// A grid of windows, each flagged clean or occluded.
    Tiles(TileMap),
}

impl OcclusionRegion {
    pub fn is_clear(&self) -> bool {
        match self {
            OcclusionRegion::Clear => true,
            OcclusionRegion::Box(b) => !b.has_area(),
            OcclusionRegion::Tiles(map) => map.occluded_tiles() == 0,
        }
    }

    /// Expand the region into per-pixel coverage for a `width`x`height` frame.
    pub fn coverage(&self, width: u32, height: u32) -> CoverageMap {
        match self {
            OcclusionRegion::Clear => CoverageMap::filled(width, height, Coverage::Refresh),
            OcclusionRegion::Box(b) => {
                let mut map = CoverageMap::filled(width, height, Coverage::Refresh);
                if let Some(rect) = b.pixel_rect(width, height) {
                    map.fill_rect(rect, Coverage::Hold);
                }
                map
            }
            OcclusionRegion::Tiles(tiles) => tiles.coverage(),
        }
    }
}

/// Derives the occlusion region for one frame from its mask.
pub trait RegionSelector {
    fn select(&self, mask: &Mask) -> OcclusionRegion;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Which selection strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SelectorKind {
    #[default]
    BoundingBox,
    Tiled,
}

/// Tuning for both selector strategies; only the active one's fields apply.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    #[serde(default)]
    pub kind: SelectorKind,
    /// Bounding-box growth factor around its own center
    #[serde(default = "default_scale")]
    pub scale: f32,
    /// Tiled: full width of the square searched around each tile center (even)
    #[serde(default = "default_search_radius")]
    pub search_radius: u32,
    /// Tiled: pitch between tile centers
    #[serde(default = "default_resolution_min")]
    pub resolution_min: u32,
}

fn default_scale() -> f32 { DEFAULT_SCALE }
fn default_search_radius() -> u32 { DEFAULT_SEARCH_RADIUS }
fn default_resolution_min() -> u32 { DEFAULT_RESOLUTION_MIN }

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            kind: SelectorKind::default(),
            scale: default_scale(),
            search_radius: default_search_radius(),
            resolution_min: default_resolution_min(),
        }
    }
}

/// Build the configured selector, validating its tuning.
pub fn build_selector(config: &SelectorConfig) -> Result<Box<dyn RegionSelector + Send>> {
    let selector: Box<dyn RegionSelector + Send> = match config.kind {
        SelectorKind::BoundingBox => Box::new(BoundingBoxSelector::new(config.scale)?),
        SelectorKind::Tiled => Box::new(TiledSelector::new(
            config.search_radius,
            config.resolution_min,
        )?),
    };
    tracing::debug!(selector = selector.name(), "region selector ready");
    Ok(selector)
}
