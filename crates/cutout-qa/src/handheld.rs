//! Handheld / attached-object detection.
//!
//! Cups, toys and phones held by the subject are usually meant to be cut
//! away. They sit around the hands and their colors fall outside the few
//! dominant color families of the body. Only the hand region is examined,
//! so feet touching the floor or a car seat are never penalized.

use crate::cluster::ColorClusterer;
use crate::normalize::LabImage;
use crate::profile::ExtrasHandheldConfig;
use crate::region::Region;
use crate::types::{CheckError, CheckKind, CheckResult, Point, Severity};

/// Minimum foreground pixels to attempt the check.
pub const MIN_FOREGROUND_PIXELS: usize = 1000;

/// Minimum foreground pixels inside the hand region.
pub const MIN_HAND_PIXELS: usize = 500;

/// Sample cap for fitting.
pub const MAX_SAMPLES: usize = 20_000;

/// Clusters fitted over the whole foreground.
pub const CLUSTERS: usize = 6;

/// Largest clusters treated as the subject's own colors.
pub const MAIN_CLUSTERS: usize = 3;

/// Where the hands are assumed to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandRoi {
    /// Disks around supplied wrist keypoints.
    Wrists,
    /// The upper part of the silhouette, used when no keypoints are known.
    UpperBody,
}

/// Build the hand region of interest.
///
/// With wrists, each keypoint with positive coordinates seeds a disk whose
/// radius is `hand_roi_radius_ratio` of the image diagonal (truncated to
/// whole pixels). Without wrists, every row above `fallback_top_fraction`
/// of the foreground's vertical extent is used.
#[must_use]
pub fn hand_region(
    foreground: &Region,
    wrists: &[Point],
    extras: &ExtrasHandheldConfig,
) -> (HandRoi, Region) {
    let dims = foreground.dimensions();
    if wrists.is_empty() {
        let Some((top, bottom)) = foreground.row_extent() else {
            return (HandRoi::UpperBody, Region::empty(dims));
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let zone = (f64::from(bottom - top) * extras.fallback_top_fraction) as u32;
        let limit = top + zone;
        return (HandRoi::UpperBody, Region::from_fn(dims, |_, y| y < limit));
    }

    let radius = (dims.diagonal() * extras.hand_roi_radius_ratio).trunc();
    let centers: Vec<Point> = wrists
        .iter()
        .copied()
        .filter(|p| p.x > 0.0 && p.y > 0.0)
        .collect();
    let roi = Region::from_fn(dims, |x, y| {
        let p = Point::new(f64::from(x), f64::from(y));
        centers.iter().any(|&c| p.distance(c) <= radius)
    });
    (HandRoi::Wrists, roi)
}

/// Measure the fraction of hand-region foreground outside the body's
/// dominant colors.
///
/// The caller restricts this check to person cases. Without wrists the
/// check is less sure of where the hands are: it uses a lower threshold
/// but never reports more than a warning.
///
/// # Errors
///
/// Propagates clustering failures as [`CheckError::Cluster`].
pub fn check_handheld_extras(
    lab: &LabImage,
    foreground: &Region,
    wrists: &[Point],
    extras: &ExtrasHandheldConfig,
    clusterer: &impl ColorClusterer,
) -> Result<CheckResult, CheckError> {
    if !extras.enabled {
        return Ok(CheckResult::neutral(CheckKind::HandheldExtras, "disabled"));
    }
    if foreground.count() < MIN_FOREGROUND_PIXELS {
        return Ok(CheckResult::neutral(
            CheckKind::HandheldExtras,
            "not enough foreground pixels",
        ));
    }

    let (roi_kind, roi) = hand_region(foreground, wrists, extras);
    let hand = foreground.intersection(&roi);
    let hand_count = hand.count();
    if hand_count < MIN_HAND_PIXELS {
        return Ok(CheckResult::neutral(
            CheckKind::HandheldExtras,
            "not enough foreground in the hand region",
        ));
    }

    let threshold = match roi_kind {
        HandRoi::Wrists => extras.outlier_threshold,
        HandRoi::UpperBody => extras.fallback_outlier_threshold,
    };

    let ratio = if clusterer.is_available() {
        let pixels = lab.gather(foreground.iter());
        let model = clusterer.fit(&pixels, CLUSTERS, MAX_SAMPLES)?;
        let main = model.dominant(&model.assign_all(&pixels), MAIN_CLUSTERS);
        let hand_main = hand
            .iter()
            .filter(|&(x, y)| main[model.assign(lab.get(x, y))])
            .count();
        #[allow(clippy::cast_precision_loss)]
        let main_fraction = hand_main as f64 / hand_count as f64;
        1.0 - main_fraction
    } else {
        tracing::debug!("color clustering unavailable, hand region left unscored");
        0.0
    };

    let detail = format!(
        "hand region foreign colors {:.1}% (threshold {:.0}%)",
        ratio * 100.0,
        threshold * 100.0
    );
    if ratio <= threshold {
        return Ok(CheckResult::new(
            CheckKind::HandheldExtras,
            true,
            Severity::None,
            detail,
            ratio,
            0.0,
        ));
    }

    let severity = if roi_kind == HandRoi::Wrists && ratio > extras.critical_ratio {
        Severity::Critical
    } else {
        Severity::Warning
    };
    #[allow(clippy::cast_possible_truncation)]
    let heat = hand.to_heatmap(ratio as f32);
    Ok(CheckResult::new(
        CheckKind::HandheldExtras,
        false,
        severity,
        detail,
        ratio,
        ratio * 5.0,
    )
    .with_heatmap(heat))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cluster::ClustererKind;
    use crate::normalize::ToUnitRgb;
    use crate::types::{Dimensions, RgbImage};

    const SKIN: [u8; 3] = [224, 172, 140];
    const SHIRT: [u8; 3] = [30, 60, 180];
    const PANTS: [u8; 3] = [50, 50, 50];
    const TOY: [u8; 3] = [250, 220, 0];

    /// Where the tests put the right wrist.
    const WRIST: Point = Point::new(145.0, 105.0);

    /// A 200×200 figure in columns 60..140 and rows 20..180 with skin,
    /// shirt and pants bands. With `toy`, a yellow 60×40 block sticks out
    /// of the right edge at wrist height.
    fn figure(toy: bool) -> (LabImage, Region) {
        let dims = Dimensions::new(200, 200);
        let body = |x: u32, y: u32| (60..140).contains(&x) && (20..180).contains(&y);
        let held = |x: u32, y: u32| toy && (140..200).contains(&x) && (85..125).contains(&y);
        let fg = Region::from_fn(dims, |x, y| body(x, y) || held(x, y));
        let img = RgbImage::from_fn(200, 200, |x, y| {
            let c = if held(x, y) {
                TOY
            } else if y < 60 {
                SKIN
            } else if y < 120 {
                SHIRT
            } else {
                PANTS
            };
            image::Rgb(c)
        });
        (LabImage::from_rgb(&img.to_unit_rgb()), fg)
    }

    #[test]
    fn wrist_roi_is_a_disk_of_tenth_diagonal() {
        let fg = Region::from_fn(Dimensions::new(300, 400), |_, _| true);
        let extras = ExtrasHandheldConfig::default();
        let (kind, roi) = hand_region(&fg, &[Point::new(100.0, 100.0)], &extras);
        assert_eq!(kind, HandRoi::Wrists);
        // Diagonal 500, radius 50.
        assert!(roi.contains(150, 100));
        assert!(!roi.contains(151, 100));
    }

    #[test]
    fn non_positive_wrists_are_ignored() {
        let fg = Region::from_fn(Dimensions::new(50, 50), |_, _| true);
        let extras = ExtrasHandheldConfig::default();
        let (kind, roi) = hand_region(&fg, &[Point::new(0.0, 20.0), Point::new(-1.0, -1.0)], &extras);
        assert_eq!(kind, HandRoi::Wrists);
        assert!(roi.is_empty());
    }

    #[test]
    fn fallback_roi_covers_upper_rows() {
        let fg = Region::from_fn(Dimensions::new(10, 120), |_, y| (10..111).contains(&y));
        let (kind, roi) = hand_region(&fg, &[], &ExtrasHandheldConfig::default());
        assert_eq!(kind, HandRoi::UpperBody);
        // Extent 10..=110, height 100, zone 40 rows: y < 50.
        assert!(roi.contains(0, 49));
        assert!(!roi.contains(0, 50));
    }

    #[test]
    fn clean_hands_pass() {
        let (lab, fg) = figure(false);
        let r = check_handheld_extras(
            &lab,
            &fg,
            &[WRIST],
            &ExtrasHandheldConfig::default(),
            &ClustererKind::default(),
        )
        .unwrap();
        assert!(r.passed, "{}", r.detail);
        assert!(r.value.abs() < f64::EPSILON);
    }

    #[test]
    fn held_toy_with_wrists_is_critical() {
        let (lab, fg) = figure(true);
        let r = check_handheld_extras(
            &lab,
            &fg,
            &[WRIST],
            &ExtrasHandheldConfig::default(),
            &ClustererKind::default(),
        )
        .unwrap();
        assert!(!r.passed, "{}", r.detail);
        assert_eq!(r.severity, Severity::Critical);
        assert!(r.value > 0.40);
        assert!(r.heatmap.is_some());
    }

    #[test]
    fn unavailable_clusterer_scores_zero() {
        let (lab, fg) = figure(true);
        let r = check_handheld_extras(
            &lab,
            &fg,
            &[WRIST],
            &ExtrasHandheldConfig::default(),
            &ClustererKind::Unavailable,
        )
        .unwrap();
        assert!(r.passed);
        assert!(r.value.abs() < f64::EPSILON);
    }

    #[test]
    fn disabled_is_neutral() {
        let (lab, fg) = figure(true);
        let extras = ExtrasHandheldConfig {
            enabled: false,
            ..ExtrasHandheldConfig::default()
        };
        let r = check_handheld_extras(&lab, &fg, &[], &extras, &ClustererKind::default()).unwrap();
        assert!(r.passed);
        assert_eq!(r.detail, "disabled");
    }
}
