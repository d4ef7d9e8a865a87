//! Semi-transparent patches inside the silhouette.
//!
//! Matting models sometimes lower the alpha of flat, background-like areas
//! of the subject (a white shirt on a white wall). The binary checks miss
//! this because alpha stays above 0.5, but the composite shows the new
//! background through it.

use crate::band;
use crate::profile::GateThresholds;
use crate::region::Region;
use crate::types::{AlphaMap, CheckKind, CheckResult, Severity};

/// Erosion radius separating the interior core from the soft edge.
pub const CORE_EROSION_RADIUS: u8 = 5;

/// Minimum core pixels to attempt the check.
pub const MIN_CORE_PIXELS: usize = 100;

/// Fraction of the interior core with alpha below
/// `interior_low_alpha_threshold`.
///
/// Informational only: matting output routinely sits a little below full
/// opacity inside the subject, so the result never carries a severity and
/// never produces an issue. The penalty only feeds the `interior_alpha`
/// metric.
#[must_use]
pub fn check_interior_alpha(
    alpha: &AlphaMap,
    foreground: &Region,
    gates: &GateThresholds,
) -> CheckResult {
    let core = band::erode(foreground, CORE_EROSION_RADIUS);
    let core_count = core.count();
    if core_count < MIN_CORE_PIXELS {
        return CheckResult::neutral(CheckKind::InteriorAlpha, "interior too small");
    }

    #[allow(clippy::cast_possible_truncation)]
    let threshold = gates.interior_low_alpha_threshold as f32;
    let soft = Region::from_fn(core.dimensions(), |x, y| {
        core.contains(x, y) && alpha.get_pixel(x, y).0[0] < threshold
    });
    #[allow(clippy::cast_precision_loss)]
    let frac = soft.count() as f64 / core_count as f64;
    let detail = format!("semi-transparent interior {:.2}%", frac * 100.0);

    if frac <= gates.interior_low_alpha_frac_max {
        return CheckResult::new(CheckKind::InteriorAlpha, true, Severity::None, detail, frac, 0.0);
    }
    CheckResult::new(
        CheckKind::InteriorAlpha,
        false,
        Severity::None,
        detail,
        frac,
        (frac * 10.0).min(1.0),
    )
    .with_heatmap(soft.to_heatmap(1.0))
}
