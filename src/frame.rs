use crate::error::{Error, Result};
use image::{Rgba, RgbaImage};

/// Opaque alpha written into every refreshed pixel.
pub const OPAQUE: u8 = 255;

/// Per-pixel person/background classification for one frame.
///
/// Row-major, one byte per pixel: zero is background, anything else is person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Mask {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(Error::MaskLength {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A mask with no person pixels.
    pub fn clear(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    /// Threshold a probability matte into a mask.
    ///
    /// A pixel counts as person when its probability is strictly greater than
    /// `threshold`.
    pub fn from_matte(width: u32, height: u32, matte: &[f32], threshold: f32) -> Result<Self> {
        let data = matte.iter().map(|&p| u8::from(p > threshold)).collect();
        Self::new(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn person_pixels(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    /// Mirror every row in place.
    pub fn flip_horizontal(&mut self) {
        if self.width == 0 {
            return;
        }
        for row in self.data.chunks_exact_mut(self.width as usize) {
            row.reverse();
        }
    }

    /// Fail unless the mask covers exactly the given pixel grid.
    pub fn ensure_dimensions(&self, width: u32, height: u32) -> Result<()> {
        if self.dimensions() != (width, height) {
            return Err(Error::DimensionMismatch {
                what: "mask",
                expected: (width, height),
                actual: self.dimensions(),
            });
        }
        Ok(())
    }
}

/// Row-major index of pixel `(x, y)` in a grid `width` pixels wide.
#[inline]
pub fn pixel_index(width: u32, x: u32, y: u32) -> usize {
    y as usize * width as usize + x as usize
}

/// Integer rectangle, half-open on the right and bottom edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    pub fn area(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.x1 - self.x0) as usize * (self.y1 - self.y0) as usize
        }
    }
}

/// Copy `src` into `dst` pixel for pixel, forcing alpha opaque.
pub fn copy_opaque(dst: &mut RgbaImage, src: &RgbaImage) -> Result<()> {
    if dst.dimensions() != src.dimensions() {
        return Err(Error::DimensionMismatch {
            what: "source frame",
            expected: dst.dimensions(),
            actual: src.dimensions(),
        });
    }
    for (d, s) in dst.pixels_mut().zip(src.pixels()) {
        *d = Rgba([s[0], s[1], s[2], OPAQUE]);
    }
    Ok(())
}
