/// End-to-end behaviour of the file, subject and group entry points.
mod common;

use approx::assert_abs_diff_eq;
use backfit::{
    fit_file, fit_subject, fit_subjects, AtomType, CancelFlag, FitError, FitWarning,
    FittingConfig, Interval, LabelingMode, NoProgress, Recording, Segment, Stage, Subject,
    TemplateSet,
};
use common::{
    hadamard_row, labels_of, recording, recording_with_amplitude, run, templates, Run, N_CHANNELS,
};
use ndarray::{s, Array2};
use std::sync::Mutex;

fn cycling(name: &str, n_runs: usize, len: usize, score: f64) -> Recording {
    let runs: Vec<Run> = (0..n_runs).map(|i| run(i % 3, score, len)).collect();
    recording(name, &runs, 250.0)
}

#[test]
fn perfect_fit_explains_all_variance() {
    let runs = [run(0, 1.0, 30), run(1, 1.0, 30)];
    let quiet = recording_with_amplitude("quiet", &runs, &[1.0; 60], 250.0);
    let loud = recording_with_amplitude("loud", &runs, &[2.0; 60], 250.0);
    let subject = Subject { name: "s".into(), conditions: vec![quiet, loud] };
    let fit = fit_subject(&subject, &templates(2), &FittingConfig::default(), &NoProgress).unwrap();

    assert_abs_diff_eq!(fit.total_gev(), 1.0, epsilon = 1e-5);
    // The denominator spans both conditions: power ratio 1 : 4.
    let per_file: Vec<f64> = fit
        .files
        .iter()
        .map(|f| f.statistics.maps.iter().filter_map(|m| m.gev).sum())
        .collect();
    assert_abs_diff_eq!(per_file[0], 0.2, epsilon = 1e-5);
    assert_abs_diff_eq!(per_file[1], 0.8, epsilon = 1e-5);
}

#[test]
fn gev_bounded_by_one() {
    let a = recording("a", &[run(0, 0.7, 20), run(1, 0.95, 25), run(2, 0.6, 15)], 250.0);
    let b = cycling("b", 9, 6, 0.85);
    let subject = Subject { name: "s".into(), conditions: vec![a, b] };
    let cfg = FittingConfig { min_correlation: Some(0.65), ..FittingConfig::default() };
    let fit = fit_subject(&subject, &templates(3), &cfg, &NoProgress).unwrap();

    let total = fit.total_gev();
    assert!(total > 0.0 && total <= 1.0 + 1e-9, "total GEV {total}");
    assert!(fit.files.iter().flat_map(|f| &f.statistics.maps).all(|m| m.gev.map_or(true, |g| g >= 0.0)));
}

#[test]
fn coverages_sum_to_one_hundred() {
    let rec = recording("a", &[run(0, 0.9, 17), run(2, 0.3, 9), run(1, 0.8, 31), run(2, 0.75, 5)], 500.0);
    let subject = Subject { name: "s".into(), conditions: vec![rec] };
    let cfg = FittingConfig { min_correlation: Some(0.5), ..FittingConfig::default() };
    let fit = fit_subject(&subject, &templates(3), &cfg, &NoProgress).unwrap();
    let stats = &fit.files[0].statistics;

    let sum: f64 = stats.maps.iter().filter_map(|m| m.time_coverage).sum();
    assert_abs_diff_eq!(sum, 100.0, epsilon = 1e-9);
    let counted: usize = stats.maps.iter().map(|m| m.n_samples).sum::<usize>() + stats.undefined.n_samples;
    assert_eq!(counted, stats.n_samples);
}

#[test]
fn segments_tile_every_epoch() {
    let mut rec = cycling("a", 12, 7, 0.8);
    rec.epochs = vec![
        backfit::Epoch::new(0, 29, vec![0, 1, 2]),
        backfit::Epoch::new(40, 83, vec![1, 2]),
    ];
    let cfg = FittingConfig { min_correlation: Some(0.5), reject_size: 3, ..FittingConfig::default() };
    let fit = fit_file(&rec, &templates(3), &cfg, &NoProgress).unwrap();
    let labels = labels_of(&fit);

    for e in &fit.epochs {
        let segs: Vec<&Segment> = fit.segments.iter().filter(|s| s.from >= e.from && s.to <= e.to).collect();
        assert_eq!(segs.first().map(|s| s.from), Some(e.from));
        assert_eq!(segs.last().map(|s| s.to), Some(e.to));
        for pair in segs.windows(2) {
            assert_eq!(pair[0].to + 1, pair[1].from);
            assert_ne!(pair[0].label, pair[1].label);
        }
        for s in &segs {
            assert!(labels[s.from..=s.to].iter().all(|&l| l == s.label));
        }
    }
    let covered: usize = fit.segments.iter().map(|s| s.len()).sum();
    assert_eq!(covered, 30 + 44);
}

#[test]
fn short_segment_between_equal_neighbours_is_merged() {
    let rec = recording("a", &[run(0, 0.9, 30), run(1, 0.9, 3), run(0, 0.9, 67)], 250.0);
    let cfg = FittingConfig { reject_size: 5, ..FittingConfig::default() };
    let fit = fit_file(&rec, &templates(2), &cfg, &NoProgress).unwrap();

    assert_eq!(fit.segments, vec![Segment::new(0, 99, Some(0))]);
    assert!(fit.warnings.is_empty());
}

#[test]
fn no_short_segment_survives_rejection() {
    let runs: Vec<Run> = [4, 2, 9, 1, 3, 12, 2, 2, 8]
        .iter()
        .enumerate()
        .map(|(i, &len)| run(i % 3, 0.8, len))
        .collect();
    let rec = recording("a", &runs, 250.0);
    let cfg = FittingConfig { reject_size: 4, ..FittingConfig::default() };
    let fit = fit_file(&rec, &templates(3), &cfg, &NoProgress).unwrap();

    assert!(fit.segments.iter().all(|s| s.len() >= 4), "{:?}", fit.segments);
    assert_eq!(fit.segments.iter().map(|s| s.len()).sum::<usize>(), rec.n_times());
}

#[test]
fn rejection_cap_reports_warning() {
    let rec = cycling("a", 20, 2, 0.9);
    let cfg = FittingConfig { reject_size: 3, reject_max_iterations: 1, ..FittingConfig::default() };
    let fit = fit_file(&rec, &templates(3), &cfg, &NoProgress).unwrap();

    assert!(matches!(
        fit.warnings.as_slice(),
        [FitWarning::RejectionNotConverged { iterations: 1, .. }]
    ));
    let covered: usize = fit.segments.iter().map(|s| s.len()).sum();
    assert_eq!(covered, rec.n_times());
}

#[test]
fn smoothing_cap_reports_warning() {
    let rec = recording("a", &[run(0, 0.9, 15), run(1, 0.95, 1), run(0, 0.9, 14)], 250.0);
    let cfg = FittingConfig {
        smoothing_half_window: 3,
        smoothing_max_iterations: 1,
        ..FittingConfig::default()
    };
    let fit = fit_file(&rec, &templates(2), &cfg, &NoProgress).unwrap();

    assert_eq!(
        fit.warnings,
        vec![FitWarning::SmoothingNotConverged { file: "a".into(), iterations: 1 }]
    );
    assert_eq!(fit.segments, vec![Segment::new(0, 29, Some(0))]);
}

#[test]
fn bad_intervals_follow_tolerance() {
    let mut rec = recording("a", &[run(0, 0.9, 50), run(1, 0.9, 50)], 250.0);
    rec.bad_intervals = vec![Interval::new(45, 54)];

    let ignored = fit_file(&rec, &templates(2), &FittingConfig::default(), &NoProgress).unwrap();
    assert_eq!(ignored.segments.len(), 2);

    let cfg = FittingConfig { bad_interval_tolerance: Some(1.0), ..FittingConfig::default() };
    let fit = fit_file(&rec, &templates(2), &cfg, &NoProgress).unwrap();
    assert_eq!(
        fit.segments,
        vec![Segment::new(0, 44, Some(0)), Segment::new(45, 54, None), Segment::new(55, 99, Some(1))]
    );

    // 5 of 50 samples bad: over a 5 % tolerance, both segments go.
    let cfg = FittingConfig { bad_interval_tolerance: Some(0.05), ..FittingConfig::default() };
    let fit = fit_file(&rec, &templates(2), &cfg, &NoProgress).unwrap();
    assert_eq!(fit.segments, vec![Segment::new(0, 99, None)]);
}

#[test]
fn markov_tables_are_normalised() {
    let subject = Subject {
        name: "s".into(),
        conditions: vec![cycling("a", 15, 4, 0.9), cycling("b", 11, 6, 0.9)],
    };
    let cfg = FittingConfig { markov_steps: 2, ..FittingConfig::default() };
    let fit = fit_subject(&subject, &templates(3), &cfg, &NoProgress).unwrap();
    let counts = fit.markov.as_ref().unwrap();
    assert_eq!(counts.transitions.dim(), (2, 2, 4, 4));
    // 15 segments in condition 0 → 14 lag-1 pairs
    assert_eq!(counts.transitions.slice(s![0, 0, .., ..]).sum(), 14.0);

    let tables = fit.markov_tables().unwrap();
    for c in 0..2 {
        for step in 0..2 {
            assert_abs_diff_eq!(tables.observed_joint.slice(s![c, step, .., ..]).sum(), 1.0, epsilon = 1e-12);
            for a in 0..4 {
                let row = tables.observed_transition.slice(s![c, step, a, ..]).sum();
                assert!(row == 0.0 || (row - 1.0).abs() < 1e-12);
            }
        }
        for a in 0..3 {
            assert_eq!(tables.observed_transition[[c, 0, a, a]], 0.0);
            assert_eq!(tables.expected_transition[[c, 0, a, a]], 0.0);
        }
    }
}

#[test]
fn group_markov_sums_subjects() {
    let subject = |name: &str, n: usize| Subject {
        name: name.into(),
        conditions: vec![cycling("a", n, 5, 0.9)],
    };
    let subjects = vec![subject("s1", 6), subject("s2", 9), subject("s3", 4)];
    let cfg = FittingConfig { markov_steps: 1, ..FittingConfig::default() };
    let group = fit_subjects(&subjects, &templates(3), &cfg, &NoProgress).unwrap();

    assert_eq!(group.subjects.len(), 3);
    assert_eq!(group.subjects[1].name, "s2");
    let total = group.markov.as_ref().unwrap().transitions.sum();
    assert_eq!(total, (5 + 8 + 3) as f64);
    let tables = group.markov_tables().unwrap();
    assert_abs_diff_eq!(tables.observed_joint.sum(), 1.0, epsilon = 1e-12);
}

#[test]
fn group_reports_each_subject_once() {
    let seen = Mutex::new(Vec::new());
    let progress = |s: Stage| seen.lock().unwrap().push(s);
    let subjects: Vec<Subject> = ["s1", "s2", "s3"]
        .iter()
        .map(|&name| Subject { name: name.into(), conditions: vec![cycling("a", 4, 5, 0.9)] })
        .collect();
    fit_subjects(&subjects, &templates(3), &FittingConfig::default(), &progress).unwrap();

    let mut indices: Vec<usize> = seen
        .into_inner()
        .unwrap()
        .into_iter()
        .filter_map(|s| match s {
            Stage::Subject { index, .. } => Some(index),
            _ => None,
        })
        .collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[test]
fn condition_counts_must_match() {
    let subjects = vec![
        Subject { name: "s1".into(), conditions: vec![cycling("a", 3, 5, 0.9), cycling("b", 3, 5, 0.9)] },
        Subject { name: "s2".into(), conditions: vec![cycling("a", 3, 5, 0.9)] },
    ];
    let err = fit_subjects(&subjects, &templates(3), &FittingConfig::default(), &NoProgress).unwrap_err();
    assert_eq!(
        err,
        FitError::ConditionCountMismatch { subject: "s2".into(), got: 1, expected: 2 }
    );
}

#[test]
fn non_competitive_evaluates_every_map() {
    let rec = recording("a", &[run(2, 0.9, 40), run(0, 0.3, 20), run(1, 0.8, 40)], 250.0);
    let cfg = FittingConfig {
        mode: LabelingMode::NonCompetitive,
        reject_size: 5,
        markov_steps: 2,
        ..FittingConfig::default()
    };
    let subject = Subject { name: "s".into(), conditions: vec![rec] };
    let fit = fit_subject(&subject, &templates(4), &cfg, &NoProgress).unwrap();
    let file = &fit.files[0];

    assert!(file.fitted.labels().is_none());
    assert!(fit.markov.is_none());
    assert_eq!(file.fitted.segments.len(), 4);
    assert!(file.fitted.segments.iter().all(|s| (s.from, s.to) == (0, 99)));
    for m in &file.statistics.maps {
        assert_abs_diff_eq!(m.time_coverage.unwrap(), 100.0, epsilon = 1e-9);
        assert_eq!(m.n_segments, 1);
    }
    assert_eq!(file.statistics.undefined.n_samples, 0);
}

#[test]
fn non_competitive_gev_is_per_map() {
    // Two copies of the same map both explain every sample.
    let mut maps = Array2::zeros((2, N_CHANNELS));
    maps.row_mut(0).assign(&hadamard_row(1));
    maps.row_mut(1).assign(&hadamard_row(1));
    let twins = TemplateSet::new(maps, AtomType::Scalar);

    let rec = recording("a", &[run(0, 1.0, 20)], 250.0);
    let cfg = FittingConfig { mode: LabelingMode::NonCompetitive, ..FittingConfig::default() };
    let subject = Subject { name: "s".into(), conditions: vec![rec] };
    let fit = fit_subject(&subject, &twins, &cfg, &NoProgress).unwrap();

    for m in &fit.files[0].statistics.maps {
        assert_abs_diff_eq!(m.gev.unwrap(), 1.0, epsilon = 1e-5);
    }
    assert_abs_diff_eq!(fit.total_gev(), 2.0, epsilon = 1e-5);
}

#[test]
fn invalid_config_is_rejected_before_fitting() {
    let rec = cycling("a", 3, 5, 0.9);
    let cfg = FittingConfig { bad_interval_tolerance: Some(1.5), ..FittingConfig::default() };
    assert!(matches!(
        fit_file(&rec, &templates(3), &cfg, &NoProgress),
        Err(FitError::InvalidParameter(_))
    ));
}

#[test]
fn cancellation_discards_results() {
    let flag = CancelFlag::new();
    flag.cancel();
    let rec = cycling("a", 3, 5, 0.9);
    assert_eq!(
        fit_file(&rec, &templates(3), &FittingConfig::default(), &flag).unwrap_err(),
        FitError::Cancelled
    );

    let subjects = vec![Subject { name: "s".into(), conditions: vec![rec] }];
    assert_eq!(
        fit_subjects(&subjects, &templates(3), &FittingConfig::default(), &flag).unwrap_err(),
        FitError::Cancelled
    );
}

#[test]
fn milestones_are_reported() {
    let seen = Mutex::new(Vec::new());
    let progress = |s: Stage| seen.lock().unwrap().push(s);
    let subject = Subject { name: "s".into(), conditions: vec![cycling("a", 6, 5, 0.9)] };
    let cfg = FittingConfig { reject_size: 3, markov_steps: 1, ..FittingConfig::default() };
    fit_subject(&subject, &templates(3), &cfg, &progress).unwrap();

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen[0], Stage::Subject { index: 0, name: "s".into() });
    assert_eq!(seen[1], Stage::Labeling { file: "a".into() });
    assert!(seen.contains(&Stage::Rejection { file: "a".into() }));
    assert!(seen.contains(&Stage::Markov));
    assert!(seen.contains(&Stage::Statistics { file: "a".into() }));
    assert!(!seen.iter().any(|s| matches!(s, Stage::Smoothing { .. })));
}
