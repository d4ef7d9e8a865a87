//! cutout-qa: Pure quality evaluation engine for alpha-matte cutouts (sans-IO).
//!
//! Judges a foreground cutout (an RGB image plus a soft alpha mask)
//! through:
//! normalize -> hard-fail gates -> soft metrics -> weighted score.
//!
//! Gates (area, face coverage, holes, residue, handheld extras) reject
//! unusable cutouts outright with a score of 5.0. Soft metrics (halo,
//! residue, background-color contamination, handheld extras) lower a
//! 0–100 score. The caller maps the score to a next step with
//! [`NextStep`].
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! image buffers and returns structured data. Thresholds come from a
//! [`ProfileTable`] the caller builds or deserializes once.

pub mod band;
pub mod cluster;
pub mod consistency;
pub mod diagnostics;
pub mod gates;
pub mod halo;
pub mod handheld;
pub mod interior;
pub mod normalize;
pub mod outlier;
pub mod pipeline;
pub mod profile;
pub mod region;
pub mod residue;
pub mod score;
pub mod types;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use cluster::{ClusterError, ClusterModel, ClustererKind, ColorClusterer, KMeansParams};
pub use diagnostics::EvaluationDiagnostics;
pub use normalize::{ToUnitAlpha, ToUnitRgb};
pub use pipeline::{Evaluation, Finished, GateOutcome};
pub use profile::{CaseProfile, ProfileTable, SubjectCase, detect_case};
pub use score::NextStep;
pub use types::{
    BoundingBox, CheckKind, CheckResult, Dimensions, EvaluationReport, EvaluationResult,
    HardFailReason, Issue, Metric, Point, QaError, Severity,
};

use crate::region::Region;

/// What is known about the subject, usually from upstream detectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subject {
    /// Explicit case. `None` derives it with [`detect_case`].
    pub case: Option<SubjectCase>,
    /// A face detector found a face.
    pub has_face: bool,
    /// The person is a child (only used when deriving the case).
    pub is_child: bool,
    /// Face bounding box, if one was detected.
    pub face_box: Option<BoundingBox>,
    /// Wrist keypoints, if a pose estimator ran.
    pub wrists: Vec<Point>,
}

impl Default for Subject {
    fn default() -> Self {
        Self {
            case: None,
            has_face: false,
            is_child: true,
            face_box: None,
            wrists: Vec::new(),
        }
    }
}

impl Subject {
    /// The case to evaluate under.
    #[must_use]
    pub fn resolve_case(&self) -> SubjectCase {
        self.case
            .unwrap_or_else(|| detect_case(self.has_face, self.face_box.as_ref(), self.is_child))
    }
}

/// Per-call evaluation switches.
#[derive(Debug, Clone, Default)]
pub struct EvaluationOptions {
    /// Build the combined debug heatmap.
    pub debug_heatmap: bool,
    /// Clustering strategy. `None` uses k-means seeded from
    /// [`ProfileTable::cluster_seed`].
    pub clusterer: Option<ClustererKind>,
}

/// Evaluate a cutout.
///
/// # Steps
///
/// 1. Normalize image and alpha into `[0, 1]` and validate shapes
/// 2. Resolve the subject case and its profile
/// 3. Gates: area, face coverage, holes, residue (may end the run)
/// 4. Soft checks: halo, color outlier, handheld extras, foreground
///    consistency, interior alpha (each guarded)
/// 5. Weighted score
///
/// # Errors
///
/// Returns [`QaError::DimensionMismatch`] when image and mask sizes
/// differ, [`QaError::EmptyInput`] for a zero-sized image and
/// [`QaError::InvalidProfile`] when the selected profile is inconsistent.
/// A hard fail is a result, not an error.
pub fn evaluate(
    image: &impl ToUnitRgb,
    alpha: &impl ToUnitAlpha,
    subject: &Subject,
    profiles: &ProfileTable,
    options: &EvaluationOptions,
) -> Result<EvaluationReport, QaError> {
    evaluate_with_diagnostics(image, alpha, subject, profiles, options).map(|(report, _)| report)
}

/// [`evaluate`], also returning per-check timings.
///
/// # Errors
///
/// Same as [`evaluate`].
pub fn evaluate_with_diagnostics(
    image: &impl ToUnitRgb,
    alpha: &impl ToUnitAlpha,
    subject: &Subject,
    profiles: &ProfileTable,
    options: &EvaluationOptions,
) -> Result<(EvaluationReport, EvaluationDiagnostics), QaError> {
    let case = subject.resolve_case();
    let clusterer = options
        .clusterer
        .clone()
        .unwrap_or_else(|| ClustererKind::kmeans(profiles.cluster_seed));

    let finished = Evaluation::new(image, alpha, case, profiles.get(case))
        .with_face_box(subject.face_box)
        .with_wrists(subject.wrists.clone())
        .with_clusterer(clusterer)
        .with_debug_heatmap(options.debug_heatmap)
        .normalize()?
        .check_gates()
        .finish();
    Ok(finished.into_parts())
}

/// Gate-only evaluation from the mask alone.
///
/// Runs the area gate, the face coverage gate when a person case comes
/// with a face box, and the holes gate (fatal and reported for person
/// cases only; objects get just the metric). The score is 100.0 when nothing failed and 5.0 otherwise.
///
/// # Errors
///
/// Returns [`QaError::EmptyInput`] for a zero-sized mask and
/// [`QaError::InvalidProfile`] when the selected profile is inconsistent.
pub fn evaluate_quick(
    alpha: &impl ToUnitAlpha,
    subject: &Subject,
    profiles: &ProfileTable,
) -> Result<EvaluationResult, QaError> {
    let alpha = alpha.to_unit_alpha();
    if alpha.width() == 0 || alpha.height() == 0 {
        return Err(QaError::EmptyInput);
    }
    let case = subject.resolve_case();
    let profile = profiles.get(case);
    profile.validate()?;
    let thresholds = &profile.gates;
    let foreground = Region::above(&alpha, pipeline::FOREGROUND_THRESHOLD);

    let mut issues = Vec::new();
    let mut metrics = BTreeMap::new();
    let mut hard_fail_reason = None;

    let area = gates::check_area(&foreground, thresholds);
    issues.extend(area.issue());
    if !area.passed {
        hard_fail_reason = Some(HardFailReason::Area);
    }

    if case.is_person()
        && thresholds.require_face
        && let Some(face_box) = subject.face_box
    {
        let face = gates::check_face_coverage(&alpha, &face_box, thresholds);
        issues.extend(face.issue());
        if face_box.clamp_to(foreground.dimensions()).is_some() {
            metrics.insert(Metric::FaceCoverage, face.value);
        }
        if !face.passed {
            hard_fail_reason = hard_fail_reason.or(Some(HardFailReason::FaceCover));
        }
    }

    // Holes only matter to the quick verdict for persons.
    let holes = gates::check_holes(&foreground, case.is_person(), thresholds);
    if case.is_person() {
        issues.extend(holes.issue());
    }
    metrics.insert(Metric::Holes, holes.cleanliness());
    if holes.severity == Severity::Critical {
        hard_fail_reason = hard_fail_reason.or(Some(HardFailReason::FaceHoles));
    }

    let score = if hard_fail_reason.is_some() {
        score::HARD_FAIL_SCORE
    } else {
        score::PERFECT_SCORE
    };
    tracing::debug!(case = case.code(), score, "quick evaluation finished");
    Ok(EvaluationResult {
        passed: hard_fail_reason.is_none(),
        score,
        case,
        issues,
        hard_fail_reason,
        metrics,
    })
}
