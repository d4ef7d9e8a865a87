//! Background-color contamination.
//!
//! Models the confident background as a per-channel Gaussian in L*a*b* and
//! flags confident-foreground pixels that fit it on every channel. Those
//! are typically bits of backdrop the mask swallowed (between fingers,
//! under an arm).

use crate::normalize::LabImage;
use crate::region::Region;
use crate::types::{AlphaMap, CheckError, CheckKind, CheckResult, Severity};

/// Alpha below this is confident background.
pub const BACKGROUND_ALPHA_MAX: f32 = 0.2;

/// Alpha above this is confident foreground.
pub const FOREGROUND_ALPHA_MIN: f32 = 0.8;

/// Both sets need at least this many pixels.
pub const MIN_SET_PIXELS: usize = 100;

/// A pixel is background-like when every channel's |z| is below this.
pub const Z_THRESHOLD: f64 = 1.0;

/// Outlier ratio above this is a warning.
pub const WARNING_RATIO: f64 = 0.03;

/// Outlier ratio above this is critical.
pub const CRITICAL_RATIO: f64 = 0.08;

/// Lower bound on the per-channel background deviation.
const MIN_STD: f64 = 1.0;

/// Measure the fraction of confident foreground that looks like background.
///
/// # Errors
///
/// Returns [`CheckError::NonFinite`] if the background statistics are not
/// finite.
pub fn check_color_outlier(lab: &LabImage, alpha: &AlphaMap) -> Result<CheckResult, CheckError> {
    let background = Region::below(alpha, BACKGROUND_ALPHA_MAX);
    let foreground = Region::above(alpha, FOREGROUND_ALPHA_MIN);
    let fg_count = foreground.count();
    if background.count() < MIN_SET_PIXELS || fg_count < MIN_SET_PIXELS {
        return Ok(CheckResult::neutral(
            CheckKind::ColorOutlier,
            "not enough confident background or foreground",
        ));
    }

    let (mean, std) = channel_stats(&lab.gather(background.iter()));
    if mean.iter().chain(&std).any(|v| !v.is_finite()) {
        return Err(CheckError::NonFinite("background color statistics"));
    }

    let outliers = Region::from_fn(foreground.dimensions(), |x, y| {
        foreground.contains(x, y) && {
            let p = lab.get(x, y);
            (0..3).all(|c| ((f64::from(p[c]) - mean[c]) / std[c]).abs() < Z_THRESHOLD)
        }
    });
    #[allow(clippy::cast_precision_loss)]
    let ratio = outliers.count() as f64 / fg_count as f64;

    let severity = if ratio > CRITICAL_RATIO {
        Severity::Critical
    } else if ratio > WARNING_RATIO {
        Severity::Warning
    } else {
        Severity::None
    };

    Ok(CheckResult::new(
        CheckKind::ColorOutlier,
        severity != Severity::Critical,
        severity,
        format!("background-colored residue {:.1}%", ratio * 100.0),
        ratio,
        ratio * 20.0,
    )
    .with_heatmap(outliers.to_heatmap(1.0)))
}

/// Per-channel mean and population standard deviation (floored at
/// [`MIN_STD`]).
#[allow(clippy::cast_precision_loss)]
fn channel_stats(pixels: &[[f32; 3]]) -> ([f64; 3], [f64; 3]) {
    let n = pixels.len() as f64;
    let mut mean = [0.0f64; 3];
    for p in pixels {
        for c in 0..3 {
            mean[c] += f64::from(p[c]);
        }
    }
    mean = mean.map(|s| s / n);

    let mut var = [0.0f64; 3];
    for p in pixels {
        for c in 0..3 {
            let d = f64::from(p[c]) - mean[c];
            var[c] += d * d;
        }
    }
    let std = var.map(|v| (v / n).sqrt().max(MIN_STD));
    (mean, std)
}
