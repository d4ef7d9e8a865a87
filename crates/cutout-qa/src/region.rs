//! Boolean pixel sets.
//!
//! A [`Region`] is the binary view of a mask (or of a band, a hole set, a
//! region of interest) that every check reasons about. It converts to and
//! from the 0/255 [`GrayImage`] representation used by `imageproc`'s
//! morphology and labelling operators.

use image::GrayImage;

use crate::types::{AlphaMap, Dimensions, Heatmap};

/// A set of pixels of an image with fixed dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    dimensions: Dimensions,
    pixels: Vec<bool>,
}

impl Region {
    /// An empty region.
    #[must_use]
    pub fn empty(dimensions: Dimensions) -> Self {
        Self {
            dimensions,
            pixels: vec![false; dimensions.pixel_count()],
        }
    }

    /// Build a region from a per-pixel predicate.
    #[must_use]
    pub fn from_fn(dimensions: Dimensions, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut pixels = Vec::with_capacity(dimensions.pixel_count());
        for y in 0..dimensions.height {
            for x in 0..dimensions.width {
                pixels.push(f(x, y));
            }
        }
        Self { dimensions, pixels }
    }

    /// Pixels whose alpha is strictly above `threshold`.
    #[must_use]
    pub fn above(alpha: &AlphaMap, threshold: f32) -> Self {
        Self {
            dimensions: Dimensions::new(alpha.width(), alpha.height()),
            pixels: alpha.pixels().map(|p| p.0[0] > threshold).collect(),
        }
    }

    /// Pixels whose alpha is strictly below `threshold`.
    #[must_use]
    pub fn below(alpha: &AlphaMap, threshold: f32) -> Self {
        Self {
            dimensions: Dimensions::new(alpha.width(), alpha.height()),
            pixels: alpha.pixels().map(|p| p.0[0] < threshold).collect(),
        }
    }

    /// Non-zero pixels of a grayscale image.
    #[must_use]
    pub fn from_gray(image: &GrayImage) -> Self {
        Self {
            dimensions: Dimensions::new(image.width(), image.height()),
            pixels: image.pixels().map(|p| p.0[0] != 0).collect(),
        }
    }

    /// Render as a 0/255 grayscale image.
    #[must_use]
    pub fn to_gray(&self) -> GrayImage {
        let raw = self.pixels.iter().map(|&b| if b { 255 } else { 0 }).collect();
        GrayImage::from_raw(self.dimensions.width, self.dimensions.height, raw)
            .unwrap_or_else(|| GrayImage::new(self.dimensions.width, self.dimensions.height))
    }

    /// Render as a heatmap holding `value` on member pixels, 0 elsewhere.
    #[must_use]
    pub fn to_heatmap(&self, value: f32) -> Heatmap {
        let raw = self
            .pixels
            .iter()
            .map(|&b| if b { value } else { 0.0 })
            .collect();
        Heatmap::from_raw(self.dimensions.width, self.dimensions.height, raw)
            .unwrap_or_else(|| Heatmap::new(self.dimensions.width, self.dimensions.height))
    }

    /// Dimensions of the underlying image.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Number of member pixels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.pixels.iter().filter(|&&b| b).count()
    }

    /// `true` if no pixel is a member.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.pixels.iter().any(|&b| b)
    }

    /// Member count divided by the image's pixel count.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.pixels.is_empty() {
            0.0
        } else {
            self.count() as f64 / self.pixels.len() as f64
        }
    }

    /// Whether `(x, y)` is a member. Out-of-bounds coordinates are not.
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.dimensions.width
            && y < self.dimensions.height
            && self.pixels[self.index(x, y)]
    }

    /// Add `(x, y)`. Out-of-bounds coordinates are ignored.
    pub fn insert(&mut self, x: u32, y: u32) {
        if x < self.dimensions.width && y < self.dimensions.height {
            let i = self.index(x, y);
            self.pixels[i] = true;
        }
    }

    /// Pixels in `self` but not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a && !b)
    }

    /// Pixels in both `self` and `other`.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a && b)
    }

    /// Pixels in `self` or `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a || b)
    }

    /// Iterate over member coordinates in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let width = self.dimensions.width as usize;
        self.pixels
            .iter()
            .enumerate()
            .filter(|&(_, &b)| b)
            .map(move |(i, _)| {
                #[allow(clippy::cast_possible_truncation)]
                let coords = ((i % width) as u32, (i / width) as u32);
                coords
            })
    }

    /// Rows that contain at least one member, as `(first, last)`.
    #[must_use]
    pub fn row_extent(&self) -> Option<(u32, u32)> {
        let width = self.dimensions.width as usize;
        if width == 0 {
            return None;
        }
        let mut rows = self
            .pixels
            .chunks(width)
            .enumerate()
            .filter(|(_, row)| row.iter().any(|&b| b))
            .map(|(y, _)| y);
        let first = rows.next()?;
        let last = rows.last().unwrap_or(first);
        #[allow(clippy::cast_possible_truncation)]
        let extent = (first as u32, last as u32);
        Some(extent)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.dimensions.width as usize + x as usize
    }

    fn zip_with(&self, other: &Self, op: impl Fn(bool, bool) -> bool) -> Self {
        debug_assert_eq!(self.dimensions, other.dimensions);
        Self {
            dimensions: self.dimensions,
            pixels: self
                .pixels
                .iter()
                .zip(&other.pixels)
                .map(|(&a, &b)| op(a, b))
                .collect(),
        }
    }
}
