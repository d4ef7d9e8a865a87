//! Foreground color consistency.
//!
//! A person is mostly a few color families (skin, hair, top, bottom). An
//! attached stroller or bag adds colors of its own that cluster away from
//! those, and because such objects hang off the silhouette they show up
//! in the outer ring of the foreground.

use crate::band;
use crate::cluster::ColorClusterer;
use crate::normalize::LabImage;
use crate::region::Region;
use crate::types::{CheckError, CheckKind, CheckResult, Severity};

/// Minimum foreground pixels to attempt clustering.
pub const MIN_FOREGROUND_PIXELS: usize = 1000;

/// Sample cap for fitting.
pub const MAX_SAMPLES: usize = 30_000;

/// Clusters fitted over the foreground.
pub const CLUSTERS: usize = 10;

/// Largest clusters treated as the subject's own colors.
pub const MAIN_CLUSTERS: usize = 4;

/// Radius of each of the two erosions that carve out the core.
pub const RING_EROSION_RADIUS: u8 = 25;

/// Ring outlier ratio above this may be flagged.
pub const RING_RATIO_MIN: f64 = 0.48;

/// ...and only if the outlier area exceeds this many pixels.
pub const RING_AREA_MIN: usize = 10_000;

/// Ring outlier ratio above this is critical.
pub const CRITICAL_RATIO: f64 = 0.65;

/// Measure how much of the foreground's outer ring falls outside the main
/// color clusters.
///
/// # Errors
///
/// Propagates clustering failures as [`CheckError::Cluster`].
pub fn check_foreground_consistency(
    lab: &LabImage,
    foreground: &Region,
    clusterer: &impl ColorClusterer,
) -> Result<CheckResult, CheckError> {
    if foreground.count() < MIN_FOREGROUND_PIXELS {
        return Ok(CheckResult::neutral(
            CheckKind::ForegroundConsistency,
            "not enough foreground pixels",
        ));
    }
    if !clusterer.is_available() {
        return Ok(CheckResult::neutral(
            CheckKind::ForegroundConsistency,
            "color clustering unavailable",
        ));
    }

    let coords: Vec<(u32, u32)> = foreground.iter().collect();
    let pixels = lab.gather(coords.iter().copied());
    let model = clusterer.fit(&pixels, CLUSTERS, MAX_SAMPLES)?;
    let labels = model.assign_all(&pixels);
    let main = model.dominant(&labels, MAIN_CLUSTERS);

    let mut minor = Region::empty(foreground.dimensions());
    for (&(x, y), &label) in coords.iter().zip(&labels) {
        if !main[label] {
            minor.insert(x, y);
        }
    }

    let core = band::erode(&band::erode(foreground, RING_EROSION_RADIUS), RING_EROSION_RADIUS);
    let ring = foreground.difference(&core);
    let ring_total = ring.count();
    let ring_outliers = minor.intersection(&ring).count();
    #[allow(clippy::cast_precision_loss)]
    let ratio = if ring_total == 0 {
        0.0
    } else {
        ring_outliers as f64 / ring_total as f64
    };

    let flagged = ratio > RING_RATIO_MIN && ring_outliers > RING_AREA_MIN;
    let detail = format!(
        "minor colors cover {:.1}% of the outer ring ({ring_outliers} px)",
        ratio * 100.0
    );
    if !flagged {
        return Ok(CheckResult::new(
            CheckKind::ForegroundConsistency,
            true,
            Severity::None,
            detail,
            ratio,
            0.0,
        ));
    }

    let severity = if ratio > CRITICAL_RATIO {
        Severity::Critical
    } else {
        Severity::Warning
    };
    Ok(CheckResult::new(
        CheckKind::ForegroundConsistency,
        false,
        severity,
        detail,
        ratio,
        (ratio - 0.5) * 4.0,
    )
    .with_heatmap(minor.to_heatmap(1.0)))
}
