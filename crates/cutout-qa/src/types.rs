//! Shared types for the cutout quality evaluation engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::profile::SubjectCase;

/// Re-export the raster types callers hand to the evaluator so downstream
/// crates do not need to depend on `image` directly.
pub use image::{DynamicImage, GrayImage, Rgb32FImage, RgbImage};

/// Per-pixel opacity in `[0, 1]`, one `f32` per pixel.
pub type AlphaMap = image::ImageBuffer<image::Luma<f32>, Vec<f32>>;

/// Per-pixel defect intensity in `[0, 1]`, same shape as the mask.
pub type Heatmap = image::ImageBuffer<image::Luma<f32>, Vec<f32>>;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels.
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Length of the image diagonal in pixels.
    #[must_use]
    pub fn diagonal(self) -> f64 {
        f64::from(self.width).hypot(f64::from(self.height))
    }
}

/// Axis-aligned face bounding box `(x1, y1)`–`(x2, y2)` in pixel
/// coordinates, as reported by a face detector.
///
/// Coordinates may lie outside the image or be inverted; see
/// [`BoundingBox::clamp_to`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x1: f64,
    /// Top edge.
    pub y1: f64,
    /// Right edge (exclusive).
    pub x2: f64,
    /// Bottom edge (exclusive).
    pub y2: f64,
}

/// Integer pixel rectangle `[x0, x1) × [y0, y1)` guaranteed to lie inside
/// the image and to be non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    /// First column.
    pub x0: u32,
    /// First row.
    pub y0: u32,
    /// One past the last column.
    pub x1: u32,
    /// One past the last row.
    pub y1: u32,
}

impl PixelRect {
    /// Number of pixels covered.
    #[must_use]
    pub const fn area(self) -> usize {
        (self.x1 - self.x0) as usize * (self.y1 - self.y0) as usize
    }
}

impl BoundingBox {
    /// Create a new bounding box.
    #[must_use]
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Truncate the coordinates toward zero and clamp them to the image.
    ///
    /// Returns `None` when the clamped box has zero area (including boxes
    /// entirely outside the image and inverted boxes).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn clamp_to(&self, dimensions: Dimensions) -> Option<PixelRect> {
        let clamp = |v: f64, max: u32| -> u32 {
            let t = v.trunc();
            if t.is_nan() || t <= 0.0 {
                0
            } else if t >= f64::from(max) {
                max
            } else {
                t as u32
            }
        };
        let x0 = clamp(self.x1, dimensions.width);
        let y0 = clamp(self.y1, dimensions.height);
        let x1 = clamp(self.x2, dimensions.width);
        let y1 = clamp(self.y2, dimensions.height);
        (x1 > x0 && y1 > y0).then_some(PixelRect { x0, y0, x1, y1 })
    }
}

/// How serious a detected defect is.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Nothing to report.
    #[default]
    None,
    /// Visible but tolerable defect; lowers the score.
    Warning,
    /// Serious defect. Fatal only when raised by a gate.
    Critical,
}

/// Which check produced a [`CheckResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Foreground area sanity (G1).
    MaskSanity,
    /// Face bounding box coverage (G2).
    FaceCoverage,
    /// Interior holes (G3).
    Holes,
    /// Background color bleeding into the edge.
    Halo,
    /// Detached fragments (feeds G4).
    Residue,
    /// Background-colored pixels inside the foreground.
    ColorOutlier,
    /// Minor color clusters along the silhouette boundary.
    ForegroundConsistency,
    /// Foreign colors around the hands (feeds G6).
    HandheldExtras,
    /// Semi-transparent patches inside the silhouette.
    InteriorAlpha,
}

impl CheckKind {
    /// Stable snake-case name, matching the serialized form.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MaskSanity => "mask_sanity",
            Self::FaceCoverage => "face_coverage",
            Self::Holes => "holes",
            Self::Halo => "halo",
            Self::Residue => "residue",
            Self::ColorOutlier => "color_outlier",
            Self::ForegroundConsistency => "foreground_consistency",
            Self::HandheldExtras => "handheld_extras",
            Self::InteriorAlpha => "interior_alpha",
        }
    }
}

/// Uniform output of every individual check.
///
/// Built once per check invocation and never mutated afterwards. The
/// penalty is clamped into `[0, 1]` on construction.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Whether the check considers the mask acceptable.
    pub passed: bool,
    /// Which check produced this result.
    pub kind: CheckKind,
    /// Severity of the finding.
    pub severity: Severity,
    /// Human-readable description of the measurement.
    pub detail: String,
    /// The measured ratio or distance.
    pub value: f64,
    /// Score penalty in `[0, 1]`.
    pub penalty: f64,
    /// Optional per-pixel defect map (same shape as the mask).
    pub heatmap: Option<Heatmap>,
}

impl CheckResult {
    /// Create a check result, clamping `penalty` into `[0, 1]`.
    #[must_use]
    pub fn new(
        kind: CheckKind,
        passed: bool,
        severity: Severity,
        detail: impl Into<String>,
        value: f64,
        penalty: f64,
    ) -> Self {
        let penalty = if penalty.is_nan() {
            0.0
        } else {
            penalty.clamp(0.0, 1.0)
        };
        Self {
            passed,
            kind,
            severity,
            detail: detail.into(),
            value,
            penalty,
            heatmap: None,
        }
    }

    /// A "passed, no penalty" result for checks whose preconditions were
    /// not met.
    #[must_use]
    pub fn neutral(kind: CheckKind, detail: impl Into<String>) -> Self {
        Self::new(kind, true, Severity::None, detail, 0.0, 0.0)
    }

    /// Attach a defect heatmap.
    #[must_use]
    pub fn with_heatmap(mut self, heatmap: Heatmap) -> Self {
        self.heatmap = Some(heatmap);
        self
    }

    /// The `1 - penalty` cleanliness score used by the aggregator.
    #[must_use]
    pub fn cleanliness(&self) -> f64 {
        1.0 - self.penalty
    }

    /// The issue entry for this result, if it has anything to report.
    #[must_use]
    pub fn issue(&self) -> Option<Issue> {
        (self.severity != Severity::None).then(|| Issue {
            kind: self.kind,
            severity: self.severity,
            detail: self.detail.clone(),
        })
    }
}

/// One reported defect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Which check found it.
    pub kind: CheckKind,
    /// How serious it is.
    pub severity: Severity,
    /// Human-readable description.
    pub detail: String,
}

/// Named entries of [`EvaluationResult::metrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Halo / bleed cleanliness.
    HaloBleed,
    /// Residue / fragmentation cleanliness.
    ResidueFragmentation,
    /// Interior holes cleanliness.
    Holes,
    /// Background-color contamination cleanliness.
    ColorOutlier,
    /// Handheld extras cleanliness (person cases only).
    ExtrasCleanliness,
    /// Boundary color-consistency cleanliness (informational).
    ForegroundConsistency,
    /// Interior opacity cleanliness (informational).
    InteriorAlpha,
    /// Raw face coverage fraction (informational).
    FaceCoverage,
}

/// Gate that caused a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HardFailReason {
    /// Foreground area outside `[area_min, area_max]`.
    #[serde(rename = "G1_AREA")]
    Area,
    /// Face box not sufficiently opaque.
    #[serde(rename = "G2_FACE_COVER")]
    FaceCover,
    /// Interior holes above the person-case ceiling, or no foreground.
    #[serde(rename = "G3_FACE_HOLES")]
    FaceHoles,
    /// Detached residue above the hard-fail ceiling.
    #[serde(rename = "G4_RESIDUE")]
    Residue,
    /// Foreign object held at the wrists.
    #[serde(rename = "G6_HANDHELD_EXTRAS")]
    HandheldExtras,
}

impl HardFailReason {
    /// Stable reason code, matching the serialized form.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Area => "G1_AREA",
            Self::FaceCover => "G2_FACE_COVER",
            Self::FaceHoles => "G3_FACE_HOLES",
            Self::Residue => "G4_RESIDUE",
            Self::HandheldExtras => "G6_HANDHELD_EXTRAS",
        }
    }

    /// Short human-readable explanation.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Area => "foreground area is implausibly small or large",
            Self::FaceCover => "part of the face was cut away",
            Self::FaceHoles => "the subject has holes punched through it",
            Self::Residue => "too much detached background residue",
            Self::HandheldExtras => "an object held in the hands was kept",
        }
    }
}

impl std::fmt::Display for HardFailReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Final output of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// `true` whenever no hard-fail gate fired.
    pub passed: bool,
    /// Quality score in `[0, 100]`, one decimal. Exactly `5.0` on hard fail.
    pub score: f64,
    /// Which profile was applied.
    pub case: SubjectCase,
    /// Reported defects in check order.
    pub issues: Vec<Issue>,
    /// The first gate that failed, if any.
    pub hard_fail_reason: Option<HardFailReason>,
    /// Per-metric `[0, 1]` scores collected during the run.
    pub metrics: BTreeMap<Metric, f64>,
}

/// An [`EvaluationResult`] plus the optional combined debug heatmap.
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    /// The evaluation outcome.
    pub result: EvaluationResult,
    /// Pixel-wise maximum over all check heatmaps, when requested and
    /// non-empty.
    pub heatmap: Option<Heatmap>,
}

/// Errors returned by the evaluator.
///
/// Insufficient data and hard fails are never errors; only malformed
/// inputs are.
#[derive(Debug, thiserror::Error)]
pub enum QaError {
    /// Image and mask sizes differ.
    #[error(
        "image is {}x{} but mask is {}x{}",
        .image.width,
        .image.height,
        .mask.width,
        .mask.height
    )]
    DimensionMismatch {
        /// Image dimensions.
        image: Dimensions,
        /// Mask dimensions.
        mask: Dimensions,
    },

    /// The image has no pixels.
    #[error("input image is empty")]
    EmptyInput,

    /// A case profile violates its invariants.
    #[error("invalid case profile: {0}")]
    InvalidProfile(String),
}

/// Internal failure of a single soft check.
///
/// Never surfaces to the caller: the pipeline logs it and substitutes a
/// neutral result.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// The color clusterer rejected its input.
    #[error("clustering failed: {0}")]
    Cluster(#[from] crate::cluster::ClusterError),

    /// A statistic came out NaN or infinite.
    #[error("non-finite statistic: {0}")]
    NonFinite(&'static str),
}
