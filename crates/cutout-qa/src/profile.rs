//! Per-case thresholds and metric weights.
//!
//! A [`CaseProfile`] is an immutable bundle of gate thresholds, metric
//! weights and handheld-extras parameters for one [`SubjectCase`]. The
//! caller builds (or deserializes) a [`ProfileTable`] once and passes it
//! into every evaluation; nothing in this crate holds global state.
//!
//! All structs use `#[serde(default)]`, so a partial document only needs
//! to name the values it overrides.

use serde::{Deserialize, Serialize};

use crate::types::{BoundingBox, QaError};

/// Which kind of subject the cutout contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubjectCase {
    /// A child; the default person case.
    ChildPerson,
    /// An adult.
    AdultPerson,
    /// A toy or other object; no face, holes tolerated.
    Object,
}

impl SubjectCase {
    /// All cases, in table order.
    pub const ALL: [Self; 3] = [Self::ChildPerson, Self::AdultPerson, Self::Object];

    /// `true` for the two person cases.
    #[must_use]
    pub const fn is_person(self) -> bool {
        matches!(self, Self::ChildPerson | Self::AdultPerson)
    }

    /// Stable code, matching the serialized form.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ChildPerson => "CHILD_PERSON",
            Self::AdultPerson => "ADULT_PERSON",
            Self::Object => "OBJECT",
        }
    }
}

/// Derive the case from face-detection signals.
///
/// A detected face (or a supplied face box) means a person; `is_child`
/// chooses between the two person cases. Everything else is an object.
#[must_use]
pub const fn detect_case(
    has_face: bool,
    face_box: Option<&BoundingBox>,
    is_child: bool,
) -> SubjectCase {
    if has_face || face_box.is_some() {
        if is_child {
            SubjectCase::ChildPerson
        } else {
            SubjectCase::AdultPerson
        }
    } else {
        SubjectCase::Object
    }
}

/// Hard-fail gate thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateThresholds {
    /// Minimum foreground area ratio (G1).
    pub area_min: f64,
    /// Maximum foreground area ratio (G1).
    pub area_max: f64,
    /// Whether a supplied face box must be covered (G2).
    pub require_face: bool,
    /// Face coverage below this fails G2.
    pub primary_face_coverage_min: f64,
    /// Laxer coverage threshold, reported for information only.
    pub secondary_face_coverage_min: f64,
    /// Hole ratio above this fails G3 for person cases.
    pub face_holes_area_ratio_max: f64,
    /// Residue ratio above this fails G4.
    pub residue_ratio_max_hard_fail: f64,
    /// Interior pixels with alpha below this count as semi-transparent.
    pub interior_low_alpha_threshold: f64,
    /// Fraction of semi-transparent interior pixels tolerated.
    pub interior_low_alpha_frac_max: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            area_min: 0.02,
            area_max: 0.90,
            require_face: true,
            primary_face_coverage_min: 0.995,
            secondary_face_coverage_min: 0.95,
            face_holes_area_ratio_max: 0.001,
            residue_ratio_max_hard_fail: 0.02,
            interior_low_alpha_threshold: 0.98,
            interior_low_alpha_frac_max: 0.01,
        }
    }
}

/// Non-negative weights of the scored metrics. They need not sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricWeights {
    /// Halo / bleed.
    pub halo_bleed: f64,
    /// Residue / fragmentation.
    pub residue_fragmentation: f64,
    /// Interior holes. Zero means [`MetricWeights::HOLES_FALLBACK`].
    pub holes: f64,
    /// Background-color contamination.
    pub color_outlier: f64,
    /// Handheld extras (person cases only).
    pub extras_cleanliness: f64,
}

impl MetricWeights {
    /// Weight used for `holes` when the profile leaves it at zero.
    pub const HOLES_FALLBACK: f64 = 0.05;
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self {
            halo_bleed: 0.12,
            residue_fragmentation: 0.08,
            holes: 0.0,
            color_outlier: 0.15,
            extras_cleanliness: 0.10,
        }
    }
}

/// Handheld-extras filter settings.
///
/// The class lists and geometric ratios describe what an upstream object
/// detector may keep (a cup, a toy) versus what must be cut away (a
/// stroller, a chair). The hand-ROI values drive the color-cluster test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtrasHandheldConfig {
    /// Whether the handheld-extras check runs at all.
    pub enabled: bool,
    /// Object classes that must never stay attached.
    pub deny_classes: Vec<String>,
    /// Object classes a subject may legitimately hold.
    pub allow_classes: Vec<String>,
    /// Largest allowed held object, as a fraction of a child's area.
    pub small_object_max_kid: f64,
    /// Largest allowed held object, as a fraction of an adult's area.
    pub small_object_max_adult: f64,
    /// Object area fraction that always fails.
    pub large_object_fail: f64,
    /// Allowed fraction of an object outside the body outline.
    pub outside_ratio_allow_max: f64,
    /// Outside fraction that always fails.
    pub outside_ratio_fail_min: f64,
    /// Allowed object diagonal relative to the body diagonal.
    pub diag_ratio_allow_max: f64,
    /// Diagonal ratio that always fails.
    pub diag_ratio_fail_min: f64,
    /// Allowed object elongation (long side over short side).
    pub elongation_allow_max: f64,
    /// Elongation that always fails.
    pub elongation_fail_min: f64,
    /// Minimum overlap with a hand for an object to count as held.
    pub hand_overlap_min_allow: f64,
    /// Hand ROI radius as a fraction of the image diagonal.
    pub hand_roi_radius_ratio: f64,
    /// Hand outlier ratio above this is flagged when wrists are known.
    pub outlier_threshold: f64,
    /// Threshold used with the coarse top-of-body ROI (no wrists).
    pub fallback_outlier_threshold: f64,
    /// With wrists known, a flagged ratio above this is critical.
    pub critical_ratio: f64,
    /// With wrists known, a ratio above this fails G6.
    pub hard_fail_ratio: f64,
    /// Fraction of the foreground's vertical extent used as the coarse ROI.
    pub fallback_top_fraction: f64,
}

impl Default for ExtrasHandheldConfig {
    fn default() -> Self {
        let names = |list: &[&str]| list.iter().map(|s| (*s).to_string()).collect();
        Self {
            enabled: true,
            deny_classes: names(&[
                "stroller",
                "shopping_cart",
                "chair",
                "table",
                "car_seat",
                "sofa",
                "bed",
                "bicycle",
            ]),
            allow_classes: names(&[
                "cup",
                "paper_cup",
                "bottle",
                "toy",
                "book",
                "phone",
                "plush",
                "ball",
            ]),
            small_object_max_kid: 0.06,
            small_object_max_adult: 0.04,
            large_object_fail: 0.20,
            outside_ratio_allow_max: 0.15,
            outside_ratio_fail_min: 0.40,
            diag_ratio_allow_max: 0.55,
            diag_ratio_fail_min: 0.70,
            elongation_allow_max: 4.0,
            elongation_fail_min: 7.0,
            hand_overlap_min_allow: 0.05,
            hand_roi_radius_ratio: 0.10,
            outlier_threshold: 0.40,
            fallback_outlier_threshold: 0.25,
            critical_ratio: 0.15,
            hard_fail_ratio: 0.50,
            fallback_top_fraction: 0.40,
        }
    }
}

/// Resolved thresholds and weights for one subject case.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseProfile {
    /// Free-form description.
    pub description: String,
    /// Hard-fail gate thresholds.
    pub gates: GateThresholds,
    /// Scored metric weights.
    pub weights: MetricWeights,
    /// Handheld-extras settings.
    pub extras: ExtrasHandheldConfig,
}

impl CaseProfile {
    /// Built-in profile for `case`.
    #[must_use]
    pub fn for_case(case: SubjectCase) -> Self {
        match case {
            SubjectCase::ChildPerson => Self {
                description: "child subject: face preserved, hands kept clean".to_string(),
                ..Self::default()
            },
            SubjectCase::AdultPerson => Self {
                description: "adult subject: face preserved, hands kept clean".to_string(),
                ..Self::default()
            },
            SubjectCase::Object => Self {
                description: "object subject: structure preserved, holes tolerated".to_string(),
                gates: GateThresholds {
                    require_face: false,
                    ..GateThresholds::default()
                },
                ..Self::default()
            },
        }
    }

    /// Check the profile's invariants.
    ///
    /// # Errors
    ///
    /// Returns [`QaError::InvalidProfile`] when a weight is negative or
    /// non-finite, the area bounds are inverted, or a ratio threshold lies
    /// outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), QaError> {
        let g = &self.gates;
        let ratios = [
            ("area_min", g.area_min),
            ("area_max", g.area_max),
            ("primary_face_coverage_min", g.primary_face_coverage_min),
            ("secondary_face_coverage_min", g.secondary_face_coverage_min),
            ("face_holes_area_ratio_max", g.face_holes_area_ratio_max),
            ("interior_low_alpha_threshold", g.interior_low_alpha_threshold),
            ("interior_low_alpha_frac_max", g.interior_low_alpha_frac_max),
            ("hand_roi_radius_ratio", self.extras.hand_roi_radius_ratio),
            ("fallback_top_fraction", self.extras.fallback_top_fraction),
        ];
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(QaError::InvalidProfile(format!(
                    "{name} must lie in [0, 1], got {value}"
                )));
            }
        }
        if g.area_min > g.area_max {
            return Err(QaError::InvalidProfile(format!(
                "area_min ({}) exceeds area_max ({})",
                g.area_min, g.area_max
            )));
        }
        if !g.residue_ratio_max_hard_fail.is_finite() || g.residue_ratio_max_hard_fail < 0.0 {
            return Err(QaError::InvalidProfile(format!(
                "residue_ratio_max_hard_fail must be non-negative, got {}",
                g.residue_ratio_max_hard_fail
            )));
        }
        let w = &self.weights;
        let weights = [
            ("halo_bleed", w.halo_bleed),
            ("residue_fragmentation", w.residue_fragmentation),
            ("holes", w.holes),
            ("color_outlier", w.color_outlier),
            ("extras_cleanliness", w.extras_cleanliness),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(QaError::InvalidProfile(format!(
                    "weight {name} must be non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Score boundaries for the recommended next pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NextStepThresholds {
    /// At or above: accept the cutout.
    pub ok_min_score: f64,
    /// At or above: run a matting refiner.
    pub run_refiner_min_score: f64,
    /// At or above: retry with the fallback segmentation service.
    pub run_fallback_api_min_score: f64,
}

impl Default for NextStepThresholds {
    fn default() -> Self {
        Self {
            ok_min_score: 85.0,
            run_refiner_min_score: 70.0,
            run_fallback_api_min_score: 40.0,
        }
    }
}

/// One profile per case, plus next-step thresholds.
///
/// Load once, share read-only across evaluations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileTable {
    /// Profile for [`SubjectCase::ChildPerson`].
    pub child_person: CaseProfile,
    /// Profile for [`SubjectCase::AdultPerson`].
    pub adult_person: CaseProfile,
    /// Profile for [`SubjectCase::Object`].
    pub object: CaseProfile,
    /// Next-step score boundaries.
    pub next_step: NextStepThresholds,
    /// Seed for every clustering call, so repeated runs agree bit for bit.
    pub cluster_seed: u64,
}

/// Seed used when none is configured.
pub const DEFAULT_CLUSTER_SEED: u64 = 1337;

impl Default for ProfileTable {
    fn default() -> Self {
        Self {
            child_person: CaseProfile::for_case(SubjectCase::ChildPerson),
            adult_person: CaseProfile::for_case(SubjectCase::AdultPerson),
            object: CaseProfile::for_case(SubjectCase::Object),
            next_step: NextStepThresholds::default(),
            cluster_seed: DEFAULT_CLUSTER_SEED,
        }
    }
}

impl ProfileTable {
    /// The profile that applies to `case`.
    #[must_use]
    pub const fn get(&self, case: SubjectCase) -> &CaseProfile {
        match case {
            SubjectCase::ChildPerson => &self.child_person,
            SubjectCase::AdultPerson => &self.adult_person,
            SubjectCase::Object => &self.object,
        }
    }

    /// Validate every profile in the table.
    ///
    /// # Errors
    ///
    /// Returns the first [`QaError::InvalidProfile`] found, prefixed with
    /// the case it belongs to.
    pub fn validate(&self) -> Result<(), QaError> {
        for case in SubjectCase::ALL {
            self.get(case).validate().map_err(|e| match e {
                QaError::InvalidProfile(msg) => {
                    QaError::InvalidProfile(format!("{}: {msg}", case.code()))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}
