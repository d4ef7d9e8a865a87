//! Input normalization and perceptual color conversion.
//!
//! Accepts 8-bit or floating-point pixel buffers and canonicalizes them to
//! `f32` in `[0, 1]`. Checks that reason about color distance use
//! [`LabImage`], CIE L*a*b* (D65) encoded in the 8-bit colorimetric
//! convention:
//!
//! ```text
//! L = L* × 255 / 100      (0..=255)
//! a = a* + 128            (0..=255)
//! b = b* + 128            (0..=255)
//! ```
//!
//! The source is re-quantized to 8 bits (rounding) before conversion so
//! that float and 8-bit inputs of the same picture produce identical
//! L*a*b* values.

use image::{DynamicImage, GrayImage, Rgb32FImage, RgbImage};
use palette::{FromColor, Lab, Srgb};

use crate::types::{AlphaMap, Dimensions};

/// Conversion of an RGB buffer to `f32` RGB in `[0, 1]`.
pub trait ToUnitRgb {
    /// Produce the normalized image.
    fn to_unit_rgb(&self) -> Rgb32FImage;
}

/// Conversion of a single-channel opacity buffer to `f32` in `[0, 1]`.
pub trait ToUnitAlpha {
    /// Produce the normalized alpha map.
    fn to_unit_alpha(&self) -> AlphaMap;
}

impl ToUnitRgb for RgbImage {
    fn to_unit_rgb(&self) -> Rgb32FImage {
        Rgb32FImage::from_fn(self.width(), self.height(), |x, y| {
            let p = self.get_pixel(x, y).0;
            image::Rgb(p.map(|c| f32::from(c) / 255.0))
        })
    }
}

impl ToUnitRgb for Rgb32FImage {
    fn to_unit_rgb(&self) -> Rgb32FImage {
        Rgb32FImage::from_fn(self.width(), self.height(), |x, y| {
            image::Rgb(self.get_pixel(x, y).0.map(unit))
        })
    }
}

impl ToUnitRgb for DynamicImage {
    fn to_unit_rgb(&self) -> Rgb32FImage {
        match self {
            Self::ImageRgb8(img) => img.to_unit_rgb(),
            other => other.to_rgb32f().to_unit_rgb(),
        }
    }
}

impl ToUnitAlpha for GrayImage {
    fn to_unit_alpha(&self) -> AlphaMap {
        AlphaMap::from_fn(self.width(), self.height(), |x, y| {
            image::Luma([f32::from(self.get_pixel(x, y).0[0]) / 255.0])
        })
    }
}

impl ToUnitAlpha for AlphaMap {
    fn to_unit_alpha(&self) -> AlphaMap {
        AlphaMap::from_fn(self.width(), self.height(), |x, y| {
            image::Luma([unit(self.get_pixel(x, y).0[0])])
        })
    }
}

/// Clamp into `[0, 1]`, mapping NaN to 0.
#[must_use]
pub fn unit(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// Re-quantize a unit value to 8 bits.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn quantize(v: f32) -> u8 {
    (unit(v) * 255.0).round() as u8
}

/// Convert one 8-bit sRGB pixel to 8-bit-encoded L*a*b*.
#[must_use]
pub fn lab8(rgb: [u8; 3]) -> [f32; 3] {
    let srgb = Srgb::new(rgb[0], rgb[1], rgb[2]).into_format::<f32>();
    let lab: Lab = Lab::from_color(srgb);
    [
        (lab.l * 255.0 / 100.0).round().clamp(0.0, 255.0),
        (lab.a + 128.0).round().clamp(0.0, 255.0),
        (lab.b + 128.0).round().clamp(0.0, 255.0),
    ]
}

/// An image in 8-bit-encoded L*a*b*, one `[L, a, b]` triple per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct LabImage {
    dimensions: Dimensions,
    pixels: Vec<[f32; 3]>,
}

impl LabImage {
    /// Convert a normalized RGB image.
    #[must_use = "returns the converted image"]
    pub fn from_rgb(image: &Rgb32FImage) -> Self {
        let pixels = image
            .pixels()
            .map(|p| lab8(p.0.map(quantize)))
            .collect();
        Self {
            dimensions: Dimensions::new(image.width(), image.height()),
            pixels,
        }
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// The L*a*b* triple at `(x, y)`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> [f32; 3] {
        self.pixels[y as usize * self.dimensions.width as usize + x as usize]
    }

    /// Gather the triples of every pixel in `coords`.
    pub fn gather(&self, coords: impl Iterator<Item = (u32, u32)>) -> Vec<[f32; 3]> {
        coords.map(|(x, y)| self.get(x, y)).collect()
    }
}

/// Euclidean distance between two L*a*b* triples.
#[must_use]
pub fn lab_distance(a: [f32; 3], b: [f32; 3]) -> f64 {
    a.iter()
        .zip(&b)
        .map(|(&p, &q)| {
            let d = f64::from(p) - f64::from(q);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u8_image_scales_to_unit_range() {
        let img = RgbImage::from_pixel(2, 2, image::Rgb([255, 0, 51]));
        let unit_img = img.to_unit_rgb();
        let p = unit_img.get_pixel(1, 1).0;
        assert!((p[0] - 1.0).abs() < f32::EPSILON);
        assert!(p[1].abs() < f32::EPSILON);
        assert!((p[2] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn float_image_is_clamped() {
        let img = Rgb32FImage::from_pixel(1, 1, image::Rgb([1.5, -0.5, f32::NAN]));
        let p = img.to_unit_rgb().get_pixel(0, 0).0;
        assert_eq!(p, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn dynamic_image_matches_rgb8_path() {
        let img = RgbImage::from_pixel(3, 2, image::Rgb([10, 200, 30]));
        let dynamic = DynamicImage::ImageRgb8(img.clone());
        assert_eq!(dynamic.to_unit_rgb(), img.to_unit_rgb());
    }

    #[test]
    fn gray_alpha_scales_to_unit_range() {
        let mask = GrayImage::from_pixel(2, 2, image::Luma([255]));
        let alpha = mask.to_unit_alpha();
        assert!((alpha.get_pixel(0, 0).0[0] - 1.0).abs() < f32::EPSILON);
        assert_eq!(alpha.dimensions(), (2, 2));
    }

    #[test]
    fn float_alpha_is_clamped() {
        let alpha = AlphaMap::from_pixel(1, 1, image::Luma([2.0]));
        assert!((alpha.to_unit_alpha().get_pixel(0, 0).0[0] - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn quantize_rounds_to_nearest_level() {
        assert_eq!(quantize(1.0), 255);
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(0.998), 254);
        assert_eq!(quantize(-1.0), 0);
        for level in 0..=255u8 {
            assert_eq!(quantize(f32::from(level) / 255.0), level);
        }
    }

    #[test]
    fn lab_of_white_and_black() {
        assert_eq!(lab8([255, 255, 255]), [255.0, 128.0, 128.0]);
        assert_eq!(lab8([0, 0, 0]), [0.0, 128.0, 128.0]);
    }

    #[test]
    fn lab_of_pure_red_matches_colorimetric_tables() {
        // L* = 53.24, a* = 80.09, b* = 67.20 for sRGB red.
        assert_eq!(lab8([255, 0, 0]), [136.0, 208.0, 195.0]);
    }

    #[test]
    fn lab_image_reads_back_per_pixel() {
        let img = RgbImage::from_fn(4, 2, |x, _| {
            if x < 2 {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        });
        let lab = LabImage::from_rgb(&img.to_unit_rgb());
        assert_eq!(lab.dimensions(), Dimensions::new(4, 2));
        assert_eq!(lab.get(1, 1), [136.0, 208.0, 195.0]);
        assert_eq!(lab.get(3, 0), [255.0, 128.0, 128.0]);
        assert_eq!(lab.gather([(0, 0), (2, 1)].into_iter()).len(), 2);
    }

    #[test]
    fn lab_distance_is_euclidean() {
        let d = lab_distance([0.0, 0.0, 0.0], [3.0, 4.0, 0.0]);
        assert!((d - 5.0).abs() < 1e-12);
    }
}
