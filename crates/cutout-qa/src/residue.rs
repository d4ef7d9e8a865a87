//! Residue / fragmentation.
//!
//! Segmentation models often leave specks of background around the
//! subject. They show up as tiny 8-connected components next to one large
//! main component.

use image::Luma;
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::region::Region;
use crate::types::{CheckKind, CheckResult, Severity};

/// Components smaller than this fraction of the main component are residue.
pub const SMALL_COMPONENT_RATIO: f64 = 0.001;

/// More small components than this is flagged.
pub const MAX_SMALL_COMPONENTS: usize = 10;

/// Residue area ratio above this is flagged.
pub const RESIDUE_RATIO_WARN: f64 = 0.01;

/// Label the foreground and measure how much of it is detached residue.
///
/// `value` is the residue ratio (total small-component area over the main
/// component's area), which also feeds the G4 gate.
#[must_use]
pub fn check_residue(foreground: &Region) -> CheckResult {
    let labels = connected_components(&foreground.to_gray(), Connectivity::Eight, Luma([0u8]));
    let mut areas: Vec<usize> = Vec::new();
    for p in labels.pixels() {
        let label = p.0[0] as usize;
        if label == 0 {
            continue;
        }
        if areas.len() < label {
            areas.resize(label, 0);
        }
        areas[label - 1] += 1;
    }

    let Some(&main_area) = areas.iter().max() else {
        return CheckResult::neutral(CheckKind::Residue, "no components");
    };

    #[allow(clippy::cast_precision_loss)]
    let small_limit = main_area as f64 * SMALL_COMPONENT_RATIO;
    #[allow(clippy::cast_precision_loss)]
    let is_small = |area: usize| (area as f64) < small_limit;
    let small: Vec<usize> = areas.iter().copied().filter(|&a| is_small(a)).collect();
    let num_small = small.len();
    #[allow(clippy::cast_precision_loss)]
    let ratio = small.iter().sum::<usize>() as f64 / main_area as f64;

    let flagged = num_small > MAX_SMALL_COMPONENTS || ratio > RESIDUE_RATIO_WARN;
    let detail = format!(
        "{num_small} detached fragments, {:.2}% of the main area",
        ratio * 100.0
    );
    tracing::trace!(components = areas.len(), main_area, num_small, ratio, "residue labelled");

    if !flagged {
        return CheckResult::new(CheckKind::Residue, true, Severity::None, detail, ratio, 0.0);
    }

    #[allow(clippy::cast_precision_loss)]
    let penalty = ratio.mul_add(50.0, num_small as f64 / 50.0).min(1.0);
    let fragments = Region::from_fn(foreground.dimensions(), |x, y| {
        let label = labels.get_pixel(x, y).0[0] as usize;
        label != 0 && is_small(areas[label - 1])
    });
    CheckResult::new(CheckKind::Residue, false, Severity::Warning, detail, ratio, penalty)
        .with_heatmap(fragments.to_heatmap(1.0))
}
