//! Binary morphology and boundary band extraction.
//!
//! Wraps [`imageproc::morphology`] with a disk-shaped (L2 norm)
//! structuring element. The bands are the thin rings just inside and just
//! outside the silhouette that the halo check compares.

use imageproc::distance_transform::Norm;

use crate::region::Region;

/// Default band width in pixels.
pub const DEFAULT_BAND_WIDTH: u8 = 5;

/// Rings just inside and just outside the mask edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryBands {
    /// `mask − erode(mask)`.
    pub inside: Region,
    /// `dilate(mask) − mask`.
    pub outside: Region,
}

/// Extract the inside/outside bands of `mask` using a disk of radius
/// `width`.
///
/// An empty mask yields two empty bands.
#[must_use = "returns the extracted bands"]
pub fn boundary_bands(mask: &Region, width: u8) -> BoundaryBands {
    if mask.is_empty() {
        return BoundaryBands {
            inside: Region::empty(mask.dimensions()),
            outside: Region::empty(mask.dimensions()),
        };
    }
    let inside = mask.difference(&erode(mask, width));
    let outside = dilate(mask, width).difference(mask);
    BoundaryBands { inside, outside }
}

/// Grow `region` by a disk of radius `radius`.
#[must_use = "returns the dilated region"]
pub fn dilate(region: &Region, radius: u8) -> Region {
    if radius == 0 {
        return region.clone();
    }
    Region::from_gray(&imageproc::morphology::dilate(
        &region.to_gray(),
        Norm::L2,
        radius,
    ))
}

/// Shrink `region` by a disk of radius `radius`.
///
/// Pixels outside the image do not erode the region, so a silhouette
/// touching the border keeps its border pixels.
#[must_use = "returns the eroded region"]
pub fn erode(region: &Region, radius: u8) -> Region {
    if radius == 0 {
        return region.clone();
    }
    Region::from_gray(&imageproc::morphology::erode(
        &region.to_gray(),
        Norm::L2,
        radius,
    ))
}

/// Morphological closing (dilate then erode) with a disk of radius
/// `radius`. Fills gaps narrower than the disk.
#[must_use = "returns the closed region"]
pub fn close(region: &Region, radius: u8) -> Region {
    if radius == 0 {
        return region.clone();
    }
    Region::from_gray(&imageproc::morphology::close(
        &region.to_gray(),
        Norm::L2,
        radius,
    ))
}
