//! Halo / bleed detection.
//!
//! A clean cutout edge keeps the subject's colors on the inside and the
//! backdrop's on the outside. When the mean L*a*b* color of the inside
//! band is close to that of the outside band, the edge has soaked up
//! background color.

use crate::band::{self, DEFAULT_BAND_WIDTH};
use crate::normalize::{LabImage, lab_distance};
use crate::region::Region;
use crate::types::{CheckError, CheckKind, CheckResult, Severity};

/// Each band needs at least this many pixels.
pub const MIN_BAND_PIXELS: usize = 10;

/// Band means closer than this (L*a*b* units) indicate a halo.
pub const HALO_DISTANCE_THRESHOLD: f64 = 20.0;

/// Compare the inside and outside boundary bands of `foreground`.
///
/// # Errors
///
/// Returns [`CheckError::NonFinite`] if a band mean is not finite.
pub fn check_halo(lab: &LabImage, foreground: &Region) -> Result<CheckResult, CheckError> {
    let bands = band::boundary_bands(foreground, DEFAULT_BAND_WIDTH);
    if bands.inside.count() < MIN_BAND_PIXELS || bands.outside.count() < MIN_BAND_PIXELS {
        return Ok(CheckResult::neutral(CheckKind::Halo, "boundary bands too thin"));
    }

    let inside = mean_color(lab, &bands.inside)?;
    let outside = mean_color(lab, &bands.outside)?;
    let distance = lab_distance(inside, outside);
    if !distance.is_finite() {
        return Err(CheckError::NonFinite("halo band distance"));
    }

    let detail = format!("edge color contrast {distance:.1}");
    if distance >= HALO_DISTANCE_THRESHOLD {
        return Ok(CheckResult::new(
            CheckKind::Halo,
            true,
            Severity::None,
            detail,
            distance,
            0.0,
        ));
    }

    let penalty = ((HALO_DISTANCE_THRESHOLD - distance) / HALO_DISTANCE_THRESHOLD * 0.5).max(0.0);
    Ok(CheckResult::new(
        CheckKind::Halo,
        false,
        Severity::Warning,
        detail,
        distance,
        penalty,
    )
    .with_heatmap(bands.inside.to_heatmap(1.0)))
}

/// Per-channel mean of the L*a*b* values in `region`.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn mean_color(lab: &LabImage, region: &Region) -> Result<[f32; 3], CheckError> {
    let mut sum = [0.0f64; 3];
    let mut n = 0usize;
    for (x, y) in region.iter() {
        let p = lab.get(x, y);
        for c in 0..3 {
            sum[c] += f64::from(p[c]);
        }
        n += 1;
    }
    let mean = sum.map(|s| (s / n as f64) as f32);
    if mean.iter().all(|v| v.is_finite()) {
        Ok(mean)
    } else {
        Err(CheckError::NonFinite("band mean color"))
    }
}
