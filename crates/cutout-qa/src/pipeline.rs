//! Staged evaluation: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! [`crate::evaluate`] runs everything in one call. [`Evaluation`] lets
//! the caller drive the same steps one at a time:
//!
//! ```rust
//! # use cutout_qa::{Evaluation, ProfileTable, QaError, SubjectCase};
//! # use cutout_qa::types::{GrayImage, RgbImage};
//! # fn run(image: &RgbImage, mask: &GrayImage) -> Result<(), QaError> {
//! let profiles = ProfileTable::default();
//! let finished = Evaluation::new(image, mask, SubjectCase::Object, profiles.get(SubjectCase::Object))
//!     .normalize()?
//!     .check_gates()
//!     .finish();
//!
//! println!("score {}", finished.result().score);
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state, carrying
//! the issues, metrics and timings gathered so far. The gate stage is the
//! only branch point: a hard fail skips straight to [`Finished`].

use std::collections::BTreeMap;

use web_time::Instant;

use crate::cluster::ClustererKind;
use crate::diagnostics::{CheckDiagnostics, CheckOutcome, EvaluationDiagnostics};
use crate::normalize::{LabImage, ToUnitAlpha, ToUnitRgb};
use crate::profile::{CaseProfile, SubjectCase};
use crate::region::Region;
use crate::types::{
    AlphaMap, BoundingBox, CheckError, CheckKind, CheckResult, Dimensions, EvaluationReport,
    EvaluationResult, HardFailReason, Heatmap, Issue, Metric, Point, QaError, Rgb32FImage,
    Severity,
};
use crate::{consistency, gates, halo, handheld, interior, outlier, residue, score};

/// Alpha strictly above this is foreground.
pub const FOREGROUND_THRESHOLD: f32 = 0.5;

/// Everything the caller supplied, normalized.
struct Inputs<'p> {
    image: Rgb32FImage,
    alpha: AlphaMap,
    case: SubjectCase,
    profile: &'p CaseProfile,
    face_box: Option<BoundingBox>,
    wrists: Vec<Point>,
    clusterer: ClustererKind,
    debug_heatmap: bool,
    started: Instant,
}

impl Inputs<'_> {
    fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.alpha.width(), self.alpha.height())
    }
}

/// Running tally of check outcomes.
#[derive(Default)]
struct Ledger {
    issues: Vec<Issue>,
    metrics: BTreeMap<Metric, f64>,
    checks: Vec<CheckDiagnostics>,
    heatmaps: Vec<Heatmap>,
    keep_heatmaps: bool,
    hard_fail: Option<HardFailReason>,
}

impl Ledger {
    /// Log a finished check and file its issue, heatmap and timing.
    fn record(&mut self, check: (CheckResult, CheckDiagnostics)) -> CheckResult {
        let result = self.file(check);
        self.issues.extend(result.issue());
        result
    }

    /// Like [`record`](Self::record) but leaves the issue to the caller.
    fn file(&mut self, (mut result, diagnostics): (CheckResult, CheckDiagnostics)) -> CheckResult {
        tracing::debug!(
            check = result.kind.name(),
            passed = result.passed,
            severity = ?result.severity,
            value = result.value,
            penalty = result.penalty,
            "{}",
            result.detail,
        );
        if let Some(heatmap) = result.heatmap.take()
            && self.keep_heatmaps
        {
            self.heatmaps.push(heatmap);
        }
        self.checks.push(diagnostics);
        result
    }

    /// Record a hard fail. The first gate to fail wins.
    fn fail(&mut self, reason: HardFailReason) {
        if self.hard_fail.is_some() {
            return;
        }
        tracing::info!(reason = reason.code(), "hard fail: {}", reason.describe());
        self.hard_fail = Some(reason);
    }
}

/// Run one check, timing it and substituting a neutral result if it fails
/// internally.
fn timed(
    kind: CheckKind,
    run: impl FnOnce() -> Result<CheckResult, CheckError>,
) -> (CheckResult, CheckDiagnostics) {
    let start = Instant::now();
    let (result, outcome) = match run() {
        Ok(result) => {
            let outcome = CheckOutcome::completed(&result);
            (result, outcome)
        }
        Err(error) => {
            tracing::warn!(check = kind.name(), %error, "check failed, using a neutral result");
            (
                CheckResult::neutral(kind, format!("check skipped: {error}")),
                CheckOutcome::Recovered {
                    error: error.to_string(),
                },
            )
        }
    };
    let diagnostics = CheckDiagnostics {
        kind,
        duration: start.elapsed(),
        outcome,
    };
    (result, diagnostics)
}

/// Pixel-wise maximum of `heatmaps`, or `None` when nothing is lit.
#[must_use]
pub fn combine_heatmaps(heatmaps: &[Heatmap]) -> Option<Heatmap> {
    let (first, rest) = heatmaps.split_first()?;
    let mut combined = first.clone();
    for map in rest {
        if map.dimensions() != combined.dimensions() {
            continue;
        }
        for (dst, src) in combined.pixels_mut().zip(map.pixels()) {
            dst.0[0] = dst.0[0].max(src.0[0]);
        }
    }
    combined.pixels().any(|p| p.0[0] > 0.0).then_some(combined)
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Evaluation state before validation.
///
/// The inputs have been converted to unit range but not checked against
/// each other. Optional signals are attached with the `with_*` methods;
/// call [`normalize`](Self::normalize) to continue.
#[must_use = "evaluation stages are consumed by advancing; call .normalize() to continue"]
pub struct Pending<'p> {
    inputs: Inputs<'p>,
}

impl<'p> Pending<'p> {
    /// Attach a face bounding box (used by the face coverage gate).
    pub fn with_face_box(mut self, face_box: Option<BoundingBox>) -> Self {
        self.inputs.face_box = face_box;
        self
    }

    /// Attach wrist keypoints (used by the handheld extras check).
    pub fn with_wrists(mut self, wrists: Vec<Point>) -> Self {
        self.inputs.wrists = wrists;
        self
    }

    /// Choose the color clustering strategy.
    pub fn with_clusterer(mut self, clusterer: ClustererKind) -> Self {
        self.inputs.clusterer = clusterer;
        self
    }

    /// Collect per-check heatmaps into a combined debug heatmap.
    pub const fn with_debug_heatmap(mut self, enabled: bool) -> Self {
        self.inputs.debug_heatmap = enabled;
        self
    }

    /// The normalized image.
    #[must_use]
    pub const fn image(&self) -> &Rgb32FImage {
        &self.inputs.image
    }

    /// The normalized alpha map.
    #[must_use]
    pub const fn alpha(&self) -> &AlphaMap {
        &self.inputs.alpha
    }

    /// Validate the inputs and profile and advance to [`Normalized`].
    ///
    /// # Errors
    ///
    /// Returns [`QaError::DimensionMismatch`] when image and mask sizes
    /// differ, [`QaError::EmptyInput`] for a zero-sized image, and
    /// [`QaError::InvalidProfile`] when the profile violates its
    /// invariants.
    pub fn normalize(self) -> Result<Normalized<'p>, QaError> {
        let inputs = self.inputs;
        let image = Dimensions::new(inputs.image.width(), inputs.image.height());
        let mask = inputs.dimensions();
        if image != mask {
            return Err(QaError::DimensionMismatch { image, mask });
        }
        if mask.pixel_count() == 0 {
            return Err(QaError::EmptyInput);
        }
        inputs.profile.validate()?;

        let span = tracing::debug_span!(
            "evaluate",
            case = inputs.case.code(),
            width = mask.width,
            height = mask.height,
        );
        let foreground = Region::above(&inputs.alpha, FOREGROUND_THRESHOLD);
        let ledger = Ledger {
            keep_heatmaps: inputs.debug_heatmap,
            ..Ledger::default()
        };
        Ok(Normalized {
            inputs,
            foreground,
            ledger,
            span,
        })
    }
}

// ───────────────────────── Stage 1: Normalized ───────────────────────

/// Evaluation state after validation.
///
/// The binary foreground (`alpha > 0.5`) has been extracted. Call
/// [`check_gates`](Self::check_gates) to run the hard-fail gates.
#[must_use = "evaluation stages are consumed by advancing; call .check_gates() to continue"]
pub struct Normalized<'p> {
    inputs: Inputs<'p>,
    foreground: Region,
    ledger: Ledger,
    span: tracing::Span,
}

impl<'p> Normalized<'p> {
    /// The binary foreground.
    #[must_use]
    pub const fn foreground(&self) -> &Region {
        &self.foreground
    }

    /// The subject case being evaluated.
    #[must_use]
    pub const fn case(&self) -> SubjectCase {
        self.inputs.case
    }

    /// Run the gates: area (G1), face coverage (G2), holes (G3) and
    /// residue (G4).
    ///
    /// G1 to G3 always run so their issues and metrics are reported
    /// together. The face gate applies only to person cases whose profile
    /// requires a face and only when a face box was supplied. Residue is
    /// measured here too; its metric feeds the score and its ratio feeds G4.
    /// Its issue is listed after the halo issue.
    pub fn check_gates(self) -> GateOutcome<'p> {
        let _span = self.span.clone().entered();
        let Self {
            inputs,
            foreground,
            mut ledger,
            span,
        } = self;
        let thresholds = &inputs.profile.gates;
        let is_person = inputs.case.is_person();

        let area = ledger.record(timed(CheckKind::MaskSanity, || {
            Ok(gates::check_area(&foreground, thresholds))
        }));
        if !area.passed {
            ledger.fail(HardFailReason::Area);
        }

        if is_person
            && thresholds.require_face
            && let Some(face_box) = inputs.face_box
        {
            let face = ledger.record(timed(CheckKind::FaceCoverage, || {
                Ok(gates::check_face_coverage(&inputs.alpha, &face_box, thresholds))
            }));
            if face_box.clamp_to(inputs.dimensions()).is_some() {
                ledger.metrics.insert(Metric::FaceCoverage, face.value);
            }
            if !face.passed {
                ledger.fail(HardFailReason::FaceCover);
            }
        }

        let holes = ledger.record(timed(CheckKind::Holes, || {
            Ok(gates::check_holes(&foreground, is_person, thresholds))
        }));
        ledger.metrics.insert(Metric::Holes, holes.cleanliness());
        if holes.severity == Severity::Critical {
            ledger.fail(HardFailReason::FaceHoles);
        }

        let residue = ledger.file(timed(CheckKind::Residue, || {
            Ok(residue::check_residue(&foreground))
        }));
        let residue_issue = residue.issue();
        ledger
            .metrics
            .insert(Metric::ResidueFragmentation, residue.cleanliness());
        if !residue.passed && residue.value > thresholds.residue_ratio_max_hard_fail {
            ledger.fail(HardFailReason::Residue);
        }

        if ledger.hard_fail.is_some() {
            ledger.issues.extend(residue_issue);
            return GateOutcome::HardFailed(Finished::new(&inputs, ledger));
        }
        GateOutcome::Passed(Gated {
            inputs,
            foreground,
            ledger,
            residue_issue,
            span,
        })
    }
}

/// Result of the gate stage.
#[must_use = "call .finish() to obtain the result"]
pub enum GateOutcome<'p> {
    /// No gate failed; soft checks can run.
    Passed(Gated<'p>),
    /// A gate failed; the result is final.
    HardFailed(Finished),
}

impl GateOutcome<'_> {
    /// Whether a gate failed.
    #[must_use]
    pub const fn is_hard_failed(&self) -> bool {
        matches!(self, Self::HardFailed(_))
    }

    /// Run whatever stages remain.
    pub fn finish(self) -> Finished {
        match self {
            Self::Passed(gated) => gated.run_soft_checks().score(),
            Self::HardFailed(finished) => finished,
        }
    }
}

// ───────────────────────── Stage 2: Gated ────────────────────────────

/// Evaluation state after every gate passed.
///
/// Call [`run_soft_checks`](Self::run_soft_checks) to measure the scored
/// and informational metrics.
#[must_use = "evaluation stages are consumed by advancing; call .run_soft_checks() to continue"]
pub struct Gated<'p> {
    inputs: Inputs<'p>,
    foreground: Region,
    ledger: Ledger,
    residue_issue: Option<Issue>,
    span: tracing::Span,
}

impl<'p> Gated<'p> {
    /// Issues reported by the gates (warnings only, since none failed).
    #[must_use]
    pub fn issues(&self) -> Vec<Issue> {
        self.ledger
            .issues
            .iter()
            .chain(&self.residue_issue)
            .cloned()
            .collect()
    }

    /// Run the soft checks in order: halo, color outlier, handheld extras
    /// (person cases only), foreground consistency and interior alpha.
    ///
    /// A check that fails internally is logged and replaced by a neutral
    /// result. Handheld extras can still hard-fail (G6) when wrists were
    /// supplied and the foreign-color ratio exceeds the profile's
    /// `hard_fail_ratio`.
    pub fn run_soft_checks(self) -> Checked<'p> {
        let _span = self.span.clone().entered();
        let Self {
            inputs,
            foreground,
            mut ledger,
            residue_issue,
            ..
        } = self;
        let profile = inputs.profile;
        let lab = LabImage::from_rgb(&inputs.image);
        let clusterer = &inputs.clusterer;

        let halo = ledger.record(timed(CheckKind::Halo, || halo::check_halo(&lab, &foreground)));
        ledger.metrics.insert(Metric::HaloBleed, halo.cleanliness());
        ledger.issues.extend(residue_issue);

        let outlier = ledger.record(timed(CheckKind::ColorOutlier, || {
            outlier::check_color_outlier(&lab, &inputs.alpha)
        }));
        ledger.metrics.insert(Metric::ColorOutlier, outlier.cleanliness());

        if inputs.case.is_person() {
            let extras = ledger.record(timed(CheckKind::HandheldExtras, || {
                handheld::check_handheld_extras(
                    &lab,
                    &foreground,
                    &inputs.wrists,
                    &profile.extras,
                    clusterer,
                )
            }));
            ledger
                .metrics
                .insert(Metric::ExtrasCleanliness, extras.cleanliness());
            if !inputs.wrists.is_empty()
                && !extras.passed
                && extras.value > profile.extras.hard_fail_ratio
            {
                ledger.fail(HardFailReason::HandheldExtras);
            }
        }

        let consistency = ledger.record(timed(CheckKind::ForegroundConsistency, || {
            consistency::check_foreground_consistency(&lab, &foreground, clusterer)
        }));
        ledger
            .metrics
            .insert(Metric::ForegroundConsistency, consistency.cleanliness());

        let interior = ledger.record(timed(CheckKind::InteriorAlpha, || {
            Ok(interior::check_interior_alpha(
                &inputs.alpha,
                &foreground,
                &profile.gates,
            ))
        }));
        ledger
            .metrics
            .insert(Metric::InteriorAlpha, interior.cleanliness());

        Checked { inputs, ledger }
    }
}

// ───────────────────────── Stage 3: Checked ──────────────────────────

/// Evaluation state after the soft checks.
///
/// Call [`score`](Self::score) to aggregate the result.
#[must_use = "evaluation stages are consumed by advancing; call .score() to continue"]
pub struct Checked<'p> {
    inputs: Inputs<'p>,
    ledger: Ledger,
}

impl Checked<'_> {
    /// Metrics collected so far.
    #[must_use]
    pub const fn metrics(&self) -> &BTreeMap<Metric, f64> {
        &self.ledger.metrics
    }

    /// The handheld extras gate (G6) fired.
    #[must_use]
    pub const fn hard_fail_reason(&self) -> Option<HardFailReason> {
        self.ledger.hard_fail
    }

    /// Aggregate into the final result.
    pub fn score(self) -> Finished {
        Finished::new(&self.inputs, self.ledger)
    }
}

// ───────────────────────── Stage 4: Finished ─────────────────────────

/// Final evaluation state: the report plus diagnostics.
#[derive(Debug, Clone)]
pub struct Finished {
    report: EvaluationReport,
    diagnostics: EvaluationDiagnostics,
}

impl Finished {
    fn new(inputs: &Inputs<'_>, ledger: Ledger) -> Self {
        let case = inputs.case;
        let result = score::finalize(
            case,
            ledger.issues,
            ledger.metrics,
            ledger.hard_fail,
            &inputs.profile.weights,
        );
        let heatmap = combine_heatmaps(&ledger.heatmaps);
        let diagnostics = EvaluationDiagnostics {
            dimensions: inputs.dimensions(),
            case,
            checks: ledger.checks,
            hard_fail_reason: result.hard_fail_reason,
            total_duration: inputs.started.elapsed(),
        };
        tracing::debug!(
            case = case.code(),
            score = result.score,
            passed = result.passed,
            issues = result.issues.len(),
            "evaluation finished"
        );
        Self {
            report: EvaluationReport { result, heatmap },
            diagnostics,
        }
    }

    /// The evaluation result.
    #[must_use]
    pub const fn result(&self) -> &EvaluationResult {
        &self.report.result
    }

    /// The result plus optional debug heatmap.
    #[must_use]
    pub const fn report(&self) -> &EvaluationReport {
        &self.report
    }

    /// Per-check timings.
    #[must_use]
    pub const fn diagnostics(&self) -> &EvaluationDiagnostics {
        &self.diagnostics
    }

    /// Consume into the report.
    #[must_use]
    pub fn into_report(self) -> EvaluationReport {
        self.report
    }

    /// Consume into the report and diagnostics.
    #[must_use]
    pub fn into_parts(self) -> (EvaluationReport, EvaluationDiagnostics) {
        (self.report, self.diagnostics)
    }
}

/// Entry point for staged evaluation.
///
/// Each stage method consumes the current state and returns the next,
/// making it a compile-time error to skip stages or call them out of
/// order.
pub struct Evaluation;

impl Evaluation {
    /// Start an evaluation of `image` cut out by `alpha`.
    ///
    /// Pixel values are clamped into `[0, 1]` here; nothing else is
    /// checked until [`.normalize()`](Pending::normalize).
    #[allow(clippy::new_ret_no_self)]
    pub fn new<'p>(
        image: &impl ToUnitRgb,
        alpha: &impl ToUnitAlpha,
        case: SubjectCase,
        profile: &'p CaseProfile,
    ) -> Pending<'p> {
        Pending {
            inputs: Inputs {
                image: image.to_unit_rgb(),
                alpha: alpha.to_unit_alpha(),
                case,
                profile,
                face_box: None,
                wrists: Vec::new(),
                clusterer: ClustererKind::default(),
                debug_heatmap: false,
                started: Instant::now(),
            },
        }
    }
}
