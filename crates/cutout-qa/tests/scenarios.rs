//! Integration tests: synthetic cutouts run through the public API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use cutout_qa::normalize::{LabImage, ToUnitAlpha, ToUnitRgb};
use cutout_qa::outlier::check_color_outlier;
use cutout_qa::types::{GrayImage, RgbImage};
use cutout_qa::{
    BoundingBox, CheckKind, ClustererKind, EvaluationOptions, EvaluationReport, HardFailReason,
    Metric, NextStep, Point, ProfileTable, QaError, Severity, Subject, SubjectCase, evaluate,
    evaluate_quick, evaluate_with_diagnostics,
};

const BACKDROP: [u8; 3] = [230, 230, 230];
const RED: [u8; 3] = [200, 40, 40];
const SKIN: [u8; 3] = [224, 172, 140];
const SHIRT: [u8; 3] = [30, 60, 180];
const PANTS: [u8; 3] = [50, 50, 50];
const TOY: [u8; 3] = [250, 220, 0];

/// Paint a cutout: `Some(color)` pixels are opaque foreground, `None`
/// pixels are transparent backdrop.
fn cutout(
    width: u32,
    height: u32,
    paint: impl Fn(u32, u32) -> Option<[u8; 3]>,
) -> (RgbImage, GrayImage) {
    let image = RgbImage::from_fn(width, height, |x, y| image::Rgb(paint(x, y).unwrap_or(BACKDROP)));
    let mask = GrayImage::from_fn(width, height, |x, y| {
        image::Luma([if paint(x, y).is_some() { 255 } else { 0 }])
    });
    (image, mask)
}

/// 100×100, red subject in columns 25..75 over the full height: area 0.5.
fn half_scene() -> (RgbImage, GrayImage) {
    cutout(100, 100, |x, _| (25..75).contains(&x).then_some(RED))
}

fn subject(case: SubjectCase) -> Subject {
    Subject {
        case: Some(case),
        ..Subject::default()
    }
}

fn run(image: &RgbImage, mask: &GrayImage, subject: &Subject) -> EvaluationReport {
    evaluate(
        image,
        mask,
        subject,
        &ProfileTable::default(),
        &EvaluationOptions::default(),
    )
    .unwrap()
}

// ─────────── Gates ──────────────────────────────────────────────────

#[test]
fn area_outside_bounds_hard_fails() {
    // 1%, 95% and 100% foreground.
    for side in [10, 98, 100] {
        let (image, mask) = cutout(100, 100, |x, y| (x < side && y < side).then_some(RED));
        let result = run(&image, &mask, &subject(SubjectCase::Object)).result;
        assert!(!result.passed, "side {side}");
        assert_eq!(result.hard_fail_reason, Some(HardFailReason::Area), "side {side}");
        assert!((result.score - 5.0).abs() < f64::EPSILON);
    }
}

#[test]
fn all_foreground_mask_hard_fails() {
    let image = RgbImage::from_pixel(64, 48, image::Rgb(RED));
    let mask = GrayImage::from_pixel(64, 48, image::Luma([255]));
    let result = run(&image, &mask, &subject(SubjectCase::Object)).result;
    assert_eq!(result.hard_fail_reason, Some(HardFailReason::Area));
    assert!((result.score - 5.0).abs() < f64::EPSILON);
}

/// Half scene whose rows `soft_from..30` inside the subject sit at alpha
/// 0.6: still foreground, but not opaque enough to cover a face.
fn face_scene(soft_from: u32) -> (RgbImage, GrayImage) {
    let (image, mut mask) = half_scene();
    for y in soft_from..30 {
        for x in 25..75 {
            mask.put_pixel(x, y, image::Luma([153]));
        }
    }
    (image, mask)
}

const FACE: BoundingBox = BoundingBox::new(30.0, 10.0, 70.0, 30.0);

#[test]
fn face_covered_at_90_percent_fails() {
    let (image, mask) = face_scene(28);
    let subject = Subject {
        case: Some(SubjectCase::AdultPerson),
        face_box: Some(FACE),
        ..Subject::default()
    };
    let result = run(&image, &mask, &subject).result;
    assert_eq!(result.hard_fail_reason, Some(HardFailReason::FaceCover));
    assert!((result.metrics[&Metric::FaceCoverage] - 0.9).abs() < 1e-12);
    let issue = result.issues.iter().find(|i| i.kind == CheckKind::FaceCoverage).unwrap();
    assert_eq!(issue.severity, Severity::Critical);
}

#[test]
fn child_with_80_percent_face_scores_5() {
    let (image, mask) = face_scene(26);
    let subject = Subject {
        has_face: true,
        face_box: Some(FACE),
        ..Subject::default()
    };
    let result = run(&image, &mask, &subject).result;
    assert_eq!(result.case, SubjectCase::ChildPerson);
    assert!(!result.passed);
    assert_eq!(result.hard_fail_reason.map(HardFailReason::code), Some("G2_FACE_COVER"));
    assert!((result.score - 5.0).abs() < f64::EPSILON);
}

#[test]
fn solid_mask_has_no_hole_penalty_in_any_case() {
    let (image, mask) = half_scene();
    for case in SubjectCase::ALL {
        let result = run(&image, &mask, &subject(case)).result;
        assert!((result.metrics[&Metric::Holes] - 1.0).abs() < f64::EPSILON, "{case:?}");
        assert!(result.issues.iter().all(|i| i.kind != CheckKind::Holes), "{case:?}");
    }
}

/// 60×60 block with twenty 3×3 holes: hole ratio 180 / 3420 ≈ 0.053.
fn holey_scene() -> (RgbImage, GrayImage) {
    let in_hole = |x: u32, y: u32| {
        [30, 40, 50, 60, 70].iter().any(|&cx: &u32| x.abs_diff(cx) <= 1)
            && [30, 40, 50, 60].iter().any(|&cy: &u32| y.abs_diff(cy) <= 1)
    };
    cutout(100, 100, |x, y| {
        ((20..80).contains(&x) && (20..80).contains(&y) && !in_hole(x, y)).then_some(RED)
    })
}

#[test]
fn object_tolerates_holes_with_a_warning() {
    let (image, mask) = holey_scene();
    let result = run(&image, &mask, &subject(SubjectCase::Object)).result;
    assert!(result.passed);
    assert!(result.hard_fail_reason.is_none());
    let issue = result.issues.iter().find(|i| i.kind == CheckKind::Holes).unwrap();
    assert_eq!(issue.severity, Severity::Warning);
    // Penalty min(1, 0.0526 × 10).
    assert!((result.metrics[&Metric::Holes] - (1.0 - 1800.0 / 3420.0)).abs() < 1e-9);
    assert!(result.score < 100.0);
}

#[test]
fn person_with_the_same_holes_hard_fails() {
    let (image, mask) = holey_scene();
    let result = run(&image, &mask, &subject(SubjectCase::ChildPerson)).result;
    assert_eq!(result.hard_fail_reason, Some(HardFailReason::FaceHoles));
    assert!((result.score - 5.0).abs() < f64::EPSILON);
}

#[test]
fn heavy_residue_hard_fails() {
    // 60×60 blob plus 33 three-pixel runs: each run is under 0.1% of the
    // main area and together they are 2.75% of it, above the 2% gate.
    let run_at = |x: u32, y: u32| {
        [80, 86, 92].contains(&y) && (2..90).contains(&x) && (x - 2) % 8 < 3
    };
    let (image, mask) = cutout(100, 100, |x, y| {
        let blob = (10..70).contains(&x) && (10..70).contains(&y);
        (blob || run_at(x, y)).then_some(RED)
    });
    let result = run(&image, &mask, &subject(SubjectCase::Object)).result;
    assert!(!result.passed);
    assert_eq!(result.hard_fail_reason, Some(HardFailReason::Residue));
    assert!((result.score - 5.0).abs() < f64::EPSILON);
    let issue = result.issues.iter().find(|i| i.kind == CheckKind::Residue).unwrap();
    assert!(issue.detail.starts_with("33 detached fragments"), "{}", issue.detail);
}

// ─────────── Soft metrics ───────────────────────────────────────────

#[test]
fn clean_half_object_scores_100() {
    let (image, mask) = half_scene();
    let report = run(&image, &mask, &subject(SubjectCase::Object));
    let result = report.result;
    assert!(result.passed);
    assert!((result.score - 100.0).abs() < f64::EPSILON, "{result:?}");
    assert!(result.issues.is_empty(), "{:?}", result.issues);
    assert!(report.heatmap.is_none());
}

#[test]
fn slightly_translucent_subject_is_still_clean() {
    // Subject alpha 242/255 ≈ 0.95: the interior is measured but never
    // reported as an issue.
    let (image, _) = half_scene();
    let mask = GrayImage::from_fn(100, 100, |x, _| {
        image::Luma([if (25..75).contains(&x) { 242 } else { 0 }])
    });
    let result = run(&image, &mask, &subject(SubjectCase::Object)).result;
    assert!(result.passed);
    assert!(result.issues.is_empty(), "{:?}", result.issues);
    assert!((result.score - 100.0).abs() < f64::EPSILON, "{result:?}");
    assert!(result.metrics.contains_key(&Metric::InteriorAlpha));
}

#[test]
fn fifteen_specks_trigger_residue_warning() {
    // 50×50 blob plus 15 single pixels 12 px apart: residue ratio 0.6%,
    // below the area threshold, but more than ten fragments.
    let speck = |x: u32, y: u32| {
        (y == 80 && x % 12 == 6 && x < 96) || (y == 92 && x % 12 == 6 && x < 84)
    };
    let (image, mask) = cutout(100, 100, |x, y| {
        let blob = (10..60).contains(&x) && (10..60).contains(&y);
        (blob || speck(x, y)).then_some(RED)
    });
    let result = run(&image, &mask, &subject(SubjectCase::Object)).result;
    assert!(result.passed);
    let issue = result.issues.iter().find(|i| i.kind == CheckKind::Residue).unwrap();
    assert_eq!(issue.severity, Severity::Warning);
    assert!(issue.detail.starts_with("15 detached fragments"), "{}", issue.detail);
    assert!(result.metrics[&Metric::ResidueFragmentation] < 1.0);
}

#[test]
fn color_outlier_ignores_orientation() {
    // Subject whose left strip was painted with the backdrop color.
    let (image, mask) = cutout(100, 100, |x, y| {
        let body = (20..80).contains(&x) && (20..80).contains(&y);
        body.then_some(if x < 30 { BACKDROP } else { RED })
    });
    let measure = |image: &RgbImage, mask: &GrayImage| {
        check_color_outlier(&LabImage::from_rgb(&image.to_unit_rgb()), &mask.to_unit_alpha())
            .unwrap()
    };
    let upright = measure(&image, &mask);
    assert_eq!(upright.severity, Severity::Critical);
    for (rotated_image, rotated_mask) in [
        (image::imageops::rotate90(&image), image::imageops::rotate90(&mask)),
        (image::imageops::rotate180(&image), image::imageops::rotate180(&mask)),
        (image::imageops::rotate270(&image), image::imageops::rotate270(&mask)),
    ] {
        let rotated = measure(&rotated_image, &rotated_mask);
        assert!((rotated.value - upright.value).abs() < 1e-12);
        assert_eq!(rotated.severity, upright.severity);
    }
}

// ─────────── Handheld extras ────────────────────────────────────────

/// 200×200 figure (columns 50..150, rows 20..180) in skin, shirt and pants
/// bands with a yellow 40×50 toy painted over its upper right.
fn toy_scene() -> (RgbImage, GrayImage) {
    cutout(200, 200, |x, y| {
        if !((50..150).contains(&x) && (20..180).contains(&y)) {
            return None;
        }
        Some(if (110..150).contains(&x) && (30..80).contains(&y) {
            TOY
        } else if y < 60 {
            SKIN
        } else if y < 120 {
            SHIRT
        } else {
            PANTS
        })
    })
}

#[test]
fn without_wrists_extras_is_at_most_a_warning() {
    let (image, mask) = toy_scene();
    let result = run(&image, &mask, &subject(SubjectCase::ChildPerson)).result;
    assert!(result.passed);
    assert_ne!(result.hard_fail_reason, Some(HardFailReason::HandheldExtras));
    let issue = result
        .issues
        .iter()
        .find(|i| i.kind == CheckKind::HandheldExtras)
        .unwrap();
    assert_eq!(issue.severity, Severity::Warning);
    assert!(result.metrics[&Metric::ExtrasCleanliness] < 1.0);
}

#[test]
fn wrists_at_the_toy_fire_the_handheld_gate() {
    let (image, mask) = toy_scene();
    let subject = Subject {
        case: Some(SubjectCase::ChildPerson),
        wrists: vec![Point::new(130.0, 55.0)],
        ..Subject::default()
    };
    let result = run(&image, &mask, &subject).result;
    assert_eq!(result.hard_fail_reason, Some(HardFailReason::HandheldExtras));
    assert!((result.score - 5.0).abs() < f64::EPSILON);
    let issue = result
        .issues
        .iter()
        .find(|i| i.kind == CheckKind::HandheldExtras)
        .unwrap();
    assert_eq!(issue.severity, Severity::Critical);
}

#[test]
fn unavailable_clustering_leaves_extras_clean() {
    let (image, mask) = toy_scene();
    let options = EvaluationOptions {
        clusterer: Some(ClustererKind::Unavailable),
        ..EvaluationOptions::default()
    };
    let report = evaluate(
        &image,
        &mask,
        &subject(SubjectCase::ChildPerson),
        &ProfileTable::default(),
        &options,
    )
    .unwrap();
    assert!(report.result.passed);
    assert!((report.result.metrics[&Metric::ExtrasCleanliness] - 1.0).abs() < f64::EPSILON);
}

// ─────────── Determinism and API ────────────────────────────────────

#[test]
fn repeated_evaluations_are_identical() {
    let (image, mask) = toy_scene();
    let subject = subject(SubjectCase::AdultPerson);
    let first = run(&image, &mask, &subject).result;
    let second = run(&image, &mask, &subject).result;
    assert_eq!(first, second);
    for (metric, value) in &first.metrics {
        assert_eq!(value.to_bits(), second.metrics[metric].to_bits(), "{metric:?}");
    }
}

#[test]
fn float_and_8bit_inputs_agree() {
    let (image, mask) = toy_scene();
    let subject = subject(SubjectCase::ChildPerson);
    let from_bytes = run(&image, &mask, &subject).result;
    let from_floats = evaluate(
        &image.to_unit_rgb(),
        &mask.to_unit_alpha(),
        &subject,
        &ProfileTable::default(),
        &EvaluationOptions::default(),
    )
    .unwrap()
    .result;
    assert_eq!(from_bytes, from_floats);
}

#[test]
fn quick_evaluation_scores_100_or_5() {
    let profiles = ProfileTable::default();
    let (_, clean) = half_scene();
    let result = evaluate_quick(&clean, &subject(SubjectCase::Object), &profiles).unwrap();
    assert!((result.score - 100.0).abs() < f64::EPSILON);
    assert_eq!(NextStep::for_result(&result, &profiles.next_step), NextStep::Ok);

    let empty = GrayImage::new(100, 100);
    let result = evaluate_quick(&empty, &subject(SubjectCase::Object), &profiles).unwrap();
    assert_eq!(result.hard_fail_reason, Some(HardFailReason::Area));
    assert!((result.score - 5.0).abs() < f64::EPSILON);
    assert_eq!(
        NextStep::for_result(&result, &profiles.next_step),
        NextStep::RequestNewInput
    );
}

#[test]
fn partial_profile_json_tightens_a_gate() {
    let profiles: ProfileTable =
        serde_json::from_str(r#"{ "object": { "gates": { "area_min": 0.6 } } }"#).unwrap();
    let (image, mask) = half_scene();
    let report = evaluate(
        &image,
        &mask,
        &subject(SubjectCase::Object),
        &profiles,
        &EvaluationOptions::default(),
    )
    .unwrap();
    assert_eq!(report.result.hard_fail_reason, Some(HardFailReason::Area));
}

#[test]
fn inverted_area_bounds_are_an_error() {
    let mut profiles = ProfileTable::default();
    profiles.object.gates.area_min = 0.95;
    let (image, mask) = half_scene();
    let err = evaluate(
        &image,
        &mask,
        &subject(SubjectCase::Object),
        &profiles,
        &EvaluationOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, QaError::InvalidProfile(_)), "{err}");
}

#[test]
fn mismatched_sizes_are_an_error() {
    let (image, _) = half_scene();
    let err = evaluate(
        &image,
        &GrayImage::new(100, 50),
        &Subject::default(),
        &ProfileTable::default(),
        &EvaluationOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, QaError::DimensionMismatch { .. }));
}

#[test]
fn diagnostics_time_every_check_that_ran() {
    let (image, mask) = toy_scene();
    let (report, diagnostics) = evaluate_with_diagnostics(
        &image,
        &mask,
        &subject(SubjectCase::ChildPerson),
        &ProfileTable::default(),
        &EvaluationOptions::default(),
    )
    .unwrap();
    assert!(report.result.passed);
    assert_eq!(diagnostics.checks.len(), 8);
    assert_eq!(diagnostics.recovered().count(), 0);
    assert!(diagnostics.checks_duration() <= diagnostics.total_duration);
    let text = diagnostics.report();
    assert!(text.contains("handheld_extras"));
    assert!(text.contains("Case: CHILD_PERSON"));
}
