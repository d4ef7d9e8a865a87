//! Scoring aggregator.
//!
//! Turns per-metric cleanliness values into the final 0–100 score and
//! maps a score to the recommended next pipeline step.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::profile::{MetricWeights, NextStepThresholds, SubjectCase};
use crate::types::{EvaluationResult, HardFailReason, Issue, Metric};

/// Score reported whenever a gate hard-fails.
pub const HARD_FAIL_SCORE: f64 = 5.0;

/// Score reported when nothing is weighted.
pub const PERFECT_SCORE: f64 = 100.0;

/// Metrics that contribute to the score for `case`, in aggregation order.
#[must_use]
pub fn scored_metrics(case: SubjectCase) -> &'static [Metric] {
    const OBJECT: [Metric; 4] = [
        Metric::HaloBleed,
        Metric::ResidueFragmentation,
        Metric::Holes,
        Metric::ColorOutlier,
    ];
    const PERSON: [Metric; 5] = [
        Metric::HaloBleed,
        Metric::ResidueFragmentation,
        Metric::Holes,
        Metric::ColorOutlier,
        Metric::ExtrasCleanliness,
    ];
    if case.is_person() { &PERSON } else { &OBJECT }
}

/// The weight of `metric`, or `None` for informational metrics.
#[must_use]
pub fn weight_for(metric: Metric, weights: &MetricWeights) -> Option<f64> {
    match metric {
        Metric::HaloBleed => Some(weights.halo_bleed),
        Metric::ResidueFragmentation => Some(weights.residue_fragmentation),
        Metric::Holes => Some(if weights.holes > 0.0 {
            weights.holes
        } else {
            MetricWeights::HOLES_FALLBACK
        }),
        Metric::ColorOutlier => Some(weights.color_outlier),
        Metric::ExtrasCleanliness => Some(weights.extras_cleanliness),
        Metric::ForegroundConsistency | Metric::InteriorAlpha | Metric::FaceCoverage => None,
    }
}

/// Weighted mean of the scored metrics, scaled to 0–100, clamped and
/// rounded to one decimal.
///
/// Missing metrics count as perfectly clean. Zero-weight metrics are
/// skipped; with no positive weight at all the score is 100.
#[must_use]
pub fn weighted_score(
    case: SubjectCase,
    metrics: &BTreeMap<Metric, f64>,
    weights: &MetricWeights,
) -> f64 {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for &metric in scored_metrics(case) {
        let Some(weight) = weight_for(metric, weights).filter(|w| *w > 0.0) else {
            continue;
        };
        let value = metrics.get(&metric).copied().unwrap_or(1.0);
        weighted_sum += weight * value;
        total_weight += weight;
    }
    if total_weight <= 0.0 {
        return PERFECT_SCORE;
    }
    round_tenth((weighted_sum / total_weight * 100.0).clamp(0.0, 100.0))
}

/// Round to one decimal place.
#[must_use]
pub fn round_tenth(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Assemble the final result.
///
/// A hard-fail reason pins the score at [`HARD_FAIL_SCORE`] and marks the
/// result as failed; otherwise the weighted score is used and the result
/// passes whatever soft issues were found.
#[must_use]
pub fn finalize(
    case: SubjectCase,
    issues: Vec<Issue>,
    metrics: BTreeMap<Metric, f64>,
    hard_fail_reason: Option<HardFailReason>,
    weights: &MetricWeights,
) -> EvaluationResult {
    let score = if hard_fail_reason.is_some() {
        HARD_FAIL_SCORE
    } else {
        weighted_score(case, &metrics, weights)
    };
    EvaluationResult {
        passed: hard_fail_reason.is_none(),
        score,
        case,
        issues,
        hard_fail_reason,
        metrics,
    }
}

/// What the calling pipeline should do with the cutout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NextStep {
    /// Good enough to use as-is.
    Ok,
    /// Usable after an edge-refinement pass.
    RunRefiner,
    /// Retry with the fallback segmentation service.
    RunFallbackApi,
    /// Unusable; ask for a different photo.
    RequestNewInput,
}

impl NextStep {
    /// Pick the step for `score`.
    #[must_use]
    pub fn for_score(score: f64, thresholds: &NextStepThresholds) -> Self {
        if score >= thresholds.ok_min_score {
            Self::Ok
        } else if score >= thresholds.run_refiner_min_score {
            Self::RunRefiner
        } else if score >= thresholds.run_fallback_api_min_score {
            Self::RunFallbackApi
        } else {
            Self::RequestNewInput
        }
    }

    /// Pick the step for a finished evaluation.
    #[must_use]
    pub fn for_result(result: &EvaluationResult, thresholds: &NextStepThresholds) -> Self {
        Self::for_score(result.score, thresholds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_clean(case: SubjectCase) -> BTreeMap<Metric, f64> {
        scored_metrics(case).iter().map(|&m| (m, 1.0)).collect()
    }

    #[test]
    fn clean_metrics_score_100() {
        let weights = MetricWeights::default();
        for case in SubjectCase::ALL {
            let score = weighted_score(case, &all_clean(case), &weights);
            assert!((score - 100.0).abs() < f64::EPSILON, "{case:?}: {score}");
        }
    }

    #[test]
    fn weighted_mean_of_object_metrics() {
        let mut metrics = all_clean(SubjectCase::Object);
        metrics.insert(Metric::HaloBleed, 0.5);
        // (0.12 × 0.5 + 0.08 + 0.05 + 0.15) / 0.40 = 0.85
        let score = weighted_score(SubjectCase::Object, &metrics, &MetricWeights::default());
        assert!((score - 85.0).abs() < 1e-9, "{score}");
    }

    #[test]
    fn extras_only_count_for_people() {
        let mut metrics = all_clean(SubjectCase::ChildPerson);
        metrics.insert(Metric::ExtrasCleanliness, 0.0);
        let weights = MetricWeights::default();
        let object = weighted_score(SubjectCase::Object, &metrics, &weights);
        let person = weighted_score(SubjectCase::ChildPerson, &metrics, &weights);
        assert!((object - 100.0).abs() < f64::EPSILON);
        // 0.40 / 0.50 = 80.
        assert!((person - 80.0).abs() < 1e-9, "{person}");
    }

    #[test]
    fn informational_metrics_do_not_score() {
        let mut metrics = all_clean(SubjectCase::Object);
        metrics.insert(Metric::ForegroundConsistency, 0.0);
        metrics.insert(Metric::InteriorAlpha, 0.0);
        metrics.insert(Metric::FaceCoverage, 0.0);
        let score = weighted_score(SubjectCase::Object, &metrics, &MetricWeights::default());
        assert!((score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_holes_weight_falls_back() {
        let weights = MetricWeights::default();
        assert_eq!(weight_for(Metric::Holes, &weights), Some(0.05));
        let explicit = MetricWeights {
            holes: 0.2,
            ..MetricWeights::default()
        };
        assert_eq!(weight_for(Metric::Holes, &explicit), Some(0.2));
    }

    #[test]
    fn zeroed_weights_leave_only_holes() {
        let weights = MetricWeights {
            halo_bleed: 0.0,
            residue_fragmentation: 0.0,
            holes: 0.0,
            color_outlier: 0.0,
            extras_cleanliness: 0.0,
        };
        // Holes falls back to 0.05 and is the only weighted metric left.
        let mut metrics = all_clean(SubjectCase::Object);
        metrics.insert(Metric::HaloBleed, 0.0);
        let score = weighted_score(SubjectCase::Object, &metrics, &weights);
        assert!((score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn hard_fail_pins_score() {
        let result = finalize(
            SubjectCase::AdultPerson,
            Vec::new(),
            all_clean(SubjectCase::AdultPerson),
            Some(HardFailReason::Residue),
            &MetricWeights::default(),
        );
        assert!(!result.passed);
        assert!((result.score - HARD_FAIL_SCORE).abs() < f64::EPSILON);
    }

    #[test]
    fn rounds_to_one_decimal() {
        assert!((round_tenth(87.349) - 87.3).abs() < 1e-9);
        assert!((round_tenth(87.36) - 87.4).abs() < 1e-9);
        assert!((round_tenth(100.0) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn next_step_boundaries() {
        let t = NextStepThresholds::default();
        assert_eq!(NextStep::for_score(100.0, &t), NextStep::Ok);
        assert_eq!(NextStep::for_score(85.0, &t), NextStep::Ok);
        assert_eq!(NextStep::for_score(84.9, &t), NextStep::RunRefiner);
        assert_eq!(NextStep::for_score(70.0, &t), NextStep::RunRefiner);
        assert_eq!(NextStep::for_score(69.9, &t), NextStep::RunFallbackApi);
        assert_eq!(NextStep::for_score(40.0, &t), NextStep::RunFallbackApi);
        assert_eq!(NextStep::for_score(39.9, &t), NextStep::RequestNewInput);
        assert_eq!(NextStep::for_score(HARD_FAIL_SCORE, &t), NextStep::RequestNewInput);
    }
}
