//! Hard-fail gate checks: area sanity (G1), face coverage (G2) and
//! interior holes (G3).
//!
//! These only look at the mask, so they are cheap and always run before
//! any color analysis.

use crate::band;
use crate::profile::GateThresholds;
use crate::region::Region;
use crate::types::{AlphaMap, BoundingBox, CheckKind, CheckResult, Dimensions, Severity};

/// Alpha above which a face pixel counts as covered.
pub const FACE_ALPHA_MIN: f32 = 0.9;

/// Radius of the disk used to close interior holes (an 11×11 element).
pub const HOLE_CLOSING_RADIUS: u8 = 5;

/// G1: foreground area ratio must lie in `[area_min, area_max]`.
#[must_use]
pub fn check_area(foreground: &Region, gates: &GateThresholds) -> CheckResult {
    let ratio = foreground.fraction();
    let pct = ratio * 100.0;
    if ratio < gates.area_min {
        CheckResult::new(
            CheckKind::MaskSanity,
            false,
            Severity::Critical,
            format!("foreground too small: {pct:.1}%"),
            ratio,
            1.0,
        )
    } else if ratio > gates.area_max {
        CheckResult::new(
            CheckKind::MaskSanity,
            false,
            Severity::Critical,
            format!("foreground too large: {pct:.1}%"),
            ratio,
            1.0,
        )
    } else {
        CheckResult::new(
            CheckKind::MaskSanity,
            true,
            Severity::None,
            format!("foreground {pct:.1}%"),
            ratio,
            0.0,
        )
    }
}

/// G2: fraction of the face box with alpha above [`FACE_ALPHA_MIN`].
///
/// The box is truncated and clamped to the image first; a box with no
/// area left is not applicable and passes. Callers decide whether the
/// gate applies to the case at all.
#[must_use]
pub fn check_face_coverage(
    alpha: &AlphaMap,
    face_box: &BoundingBox,
    gates: &GateThresholds,
) -> CheckResult {
    let dims = Dimensions::new(alpha.width(), alpha.height());
    let Some(rect) = face_box.clamp_to(dims) else {
        return CheckResult::neutral(CheckKind::FaceCoverage, "face box is empty after clamping");
    };

    let lost = Region::from_fn(dims, |x, y| {
        (rect.x0..rect.x1).contains(&x)
            && (rect.y0..rect.y1).contains(&y)
            && alpha.get_pixel(x, y).0[0] <= FACE_ALPHA_MIN
    });
    #[allow(clippy::cast_precision_loss)]
    let coverage = 1.0 - lost.count() as f64 / rect.area() as f64;

    if coverage >= gates.primary_face_coverage_min {
        return CheckResult::new(
            CheckKind::FaceCoverage,
            true,
            Severity::None,
            format!("face preserved {:.1}%", coverage * 100.0),
            coverage,
            0.0,
        );
    }

    let secondary = if coverage >= gates.secondary_face_coverage_min {
        "within"
    } else {
        "below"
    };
    CheckResult::new(
        CheckKind::FaceCoverage,
        false,
        Severity::Critical,
        format!(
            "face area {:.1}% lost ({secondary} the {:.1}% secondary threshold)",
            (1.0 - coverage) * 100.0,
            gates.secondary_face_coverage_min * 100.0,
        ),
        coverage,
        1.0,
    )
    .with_heatmap(lost.to_heatmap(1.0))
}

/// G3: holes that a radius-5 closing would fill, relative to the
/// foreground area.
///
/// Exceeding `face_holes_area_ratio_max` is critical for people and a
/// warning for objects. An empty foreground is always critical.
#[must_use]
pub fn check_holes(foreground: &Region, is_person: bool, gates: &GateThresholds) -> CheckResult {
    let fg_area = foreground.count();
    if fg_area == 0 {
        return CheckResult::new(
            CheckKind::Holes,
            false,
            Severity::Critical,
            "no foreground",
            0.0,
            1.0,
        );
    }

    let holes = band::close(foreground, HOLE_CLOSING_RADIUS).difference(foreground);
    #[allow(clippy::cast_precision_loss)]
    let ratio = holes.count() as f64 / fg_area as f64;
    let passed = ratio <= gates.face_holes_area_ratio_max;
    let severity = match (passed, is_person) {
        (true, _) => Severity::None,
        (false, true) => Severity::Critical,
        (false, false) => Severity::Warning,
    };

    let result = CheckResult::new(
        CheckKind::Holes,
        passed,
        severity,
        format!("interior holes {:.2}%", ratio * 100.0),
        ratio,
        (ratio * 10.0).min(1.0),
    );
    if holes.is_empty() {
        result
    } else {
        result.with_heatmap(holes.to_heatmap(1.0))
    }
}
