//! File, subject and group entry points.
//!
//! Phase 1 ([`fit_file`]) labels one recording and freezes its segments.
//! Phase 2 ([`fit_subject`]) needs every condition of a subject fitted
//! first, because GEV shares one denominator across them; it then builds
//! the statistics tables and the Markov counts.  [`fit_subjects`] runs
//! independent subjects in parallel.
use ndarray::{Array1, Array2};
use rayon::prelude::*;

use crate::config::{FittingConfig, LabelingMode, PolarityMode};
use crate::correlation::ScoreTable;
use crate::error::{FitError, FitWarning};
use crate::label::{label_competitive, label_concurrent, Assignment, Label};
use crate::markov::{MarkovCounts, MarkovTables};
use crate::mask::{bad_sample_mask, mask_bad_intervals, mask_concurrent};
use crate::progress::{Progress, Stage};
use crate::recording::{Epoch, Recording, TemplateSet};
use crate::reject::{reject_small_segments, RejectionParams};
use crate::segment::{concurrent_segments, extract_segments, Segment};
use crate::smooth::{smooth_labels, SmoothingParams};
use crate::stats::{file_statistics, FileStatistics, GevDenominator};

/// A labeled, frozen file: the output of phase 1.
#[derive(Debug, Clone)]
pub struct FittedFile {
    pub name: String,
    pub sfreq: f64,
    pub gfp: Array1<f32>,
    /// Resolved epochs, sorted by onset.
    pub epochs: Vec<Epoch>,
    pub scores: ScoreTable,
    pub polarity: PolarityMode,
    pub assignment: Assignment,
    /// Segments of every epoch, in time order (non-competitive: one per
    /// eligible template per epoch).
    pub segments: Vec<Segment>,
    /// Per-sample bad flags (all `false` without a bad-interval policy).
    pub bad: Vec<bool>,
    pub warnings: Vec<FitWarning>,
}

impl FittedFile {
    #[inline]
    pub fn n_times(&self) -> usize {
        self.gfp.len()
    }

    #[inline]
    pub fn n_maps(&self) -> usize {
        self.scores.n_maps()
    }

    /// Label sequence of a competitive fit.
    pub fn labels(&self) -> Option<&[Label]> {
        self.assignment.labels()
    }

    /// Samples counted as labeled for coverage and GEV.
    ///
    /// Competitive: samples with a label.  Non-competitive: every sample of
    /// an epoch with eligible templates that is not bad.
    pub fn labeled_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.n_times()];
        for e in &self.epochs {
            for t in e.from..=e.to {
                mask[t] = match &self.assignment {
                    Assignment::Exclusive(labels) => labels[t].is_some(),
                    Assignment::Concurrent(_) => !e.maps.is_empty() && !self.bad[t],
                };
            }
        }
        mask
    }
}

fn check_cancel(progress: &dyn Progress) -> Result<(), FitError> {
    if progress.is_cancelled() {
        Err(FitError::Cancelled)
    } else {
        Ok(())
    }
}

/// Phase 1: label, smooth, reject, mask and segment one recording.
pub fn fit_file(
    recording: &Recording,
    templates: &TemplateSet,
    cfg: &FittingConfig,
    progress: &dyn Progress,
) -> Result<FittedFile, FitError> {
    cfg.validate()?;
    let epochs = recording.resolve_epochs(templates)?;
    let name = recording.name.clone();
    let n_times = recording.n_times();

    progress.report(Stage::Labeling { file: name.clone() });
    check_cancel(progress)?;
    let scores = ScoreTable::compute(recording, templates);
    let bad = match cfg.bad_interval_tolerance {
        Some(_) => bad_sample_mask(&recording.bad_intervals, n_times),
        None => vec![false; n_times],
    };
    let mut warnings = Vec::new();

    let (assignment, segments) = match cfg.mode {
        LabelingMode::Competitive => {
            let mut labels: Vec<Label> = vec![None; n_times];
            let mut n_labeled = 0;
            for e in &epochs {
                n_labeled += label_competitive(&scores, e, cfg.polarity, cfg.min_correlation, &mut labels);
            }
            log::debug!("{name}: {n_labeled}/{n_times} samples labeled");

            if cfg.smoothing_enabled() {
                progress.report(Stage::Smoothing { file: name.clone() });
                let params = SmoothingParams::from_config(cfg);
                for e in &epochs {
                    let out = smooth_labels(&scores, recording.gfp.view(), e, cfg.polarity,
                        &params, &mut labels, progress)?;
                    log::debug!("{name}: smoothing [{}, {}] relabeled {} samples in {} iterations",
                        e.from, e.to, out.relabeled, out.iterations);
                    if !out.converged {
                        warnings.push(FitWarning::SmoothingNotConverged {
                            file: name.clone(),
                            iterations: out.iterations,
                        });
                    }
                }
            }

            if cfg.rejection_enabled() {
                progress.report(Stage::Rejection { file: name.clone() });
                let params = RejectionParams::from_config(cfg);
                for e in &epochs {
                    let out = reject_small_segments(&scores, e, cfg.polarity, &params, &mut labels, progress)?;
                    log::debug!("{name}: rejection [{}, {}] absorbed {} segments",
                        e.from, e.to, out.absorbed);
                    if !out.converged {
                        warnings.push(FitWarning::RejectionNotConverged {
                            file: name.clone(),
                            iterations: out.iterations,
                            remaining: out.remaining,
                        });
                    }
                }
            }

            if let Some(tolerance) = cfg.bad_interval_tolerance {
                progress.report(Stage::Masking { file: name.clone() });
                let masked: usize = epochs
                    .iter()
                    .map(|e| mask_bad_intervals(&mut labels, &bad, e, tolerance))
                    .sum();
                log::debug!("{name}: {masked} samples masked as bad");
            }

            let segments = epochs
                .iter()
                .flat_map(|e| extract_segments(&labels, e.from, e.to))
                .collect();
            (Assignment::Exclusive(labels), segments)
        }
        LabelingMode::NonCompetitive => {
            let mut mask = Array2::from_elem((templates.n_maps(), n_times), false);
            for e in &epochs {
                label_concurrent(&scores, e, cfg.polarity, cfg.min_correlation, &mut mask);
            }
            if cfg.bad_interval_tolerance.is_some() {
                progress.report(Stage::Masking { file: name.clone() });
                for e in &epochs {
                    mask_concurrent(&mut mask, &bad, e);
                }
            }
            let segments = epochs.iter().flat_map(concurrent_segments).collect();
            (Assignment::Concurrent(mask), segments)
        }
    };
    check_cancel(progress)?;

    Ok(FittedFile {
        name,
        sfreq: recording.sfreq,
        gfp: recording.gfp.clone(),
        epochs,
        scores,
        polarity: cfg.polarity,
        assignment,
        segments,
        bad,
        warnings,
    })
}

/// One statistical unit: the conditions of one subject, in a fixed order.
#[derive(Debug, Clone)]
pub struct Subject {
    pub name: String,
    pub conditions: Vec<Recording>,
}

/// A fitted file with its statistics table.
#[derive(Debug, Clone)]
pub struct FileFit {
    pub fitted: FittedFile,
    pub statistics: FileStatistics,
}

/// Everything computed for one subject.
#[derive(Debug, Clone)]
pub struct SubjectFit {
    pub name: String,
    /// One entry per condition, in input order.
    pub files: Vec<FileFit>,
    pub gev: GevDenominator,
    /// `[C, N, K+1, K+1]` counts, when Markov modeling is enabled.
    pub markov: Option<MarkovCounts>,
    pub warnings: Vec<FitWarning>,
}

impl SubjectFit {
    /// Sum of GEV over every label of every condition.  Bounded by 1 in
    /// competitive mode only.
    pub fn total_gev(&self) -> f64 {
        self.files
            .iter()
            .flat_map(|f| f.statistics.maps.iter())
            .filter_map(|s| s.gev)
            .sum()
    }

    pub fn markov_tables(&self) -> Option<MarkovTables> {
        self.markov.as_ref().map(MarkovCounts::tables)
    }
}

/// Phase 1 on every condition, then phase 2 for the subject.
///
/// Reported to `progress` as subject 0.
pub fn fit_subject(
    subject: &Subject,
    templates: &TemplateSet,
    cfg: &FittingConfig,
    progress: &dyn Progress,
) -> Result<SubjectFit, FitError> {
    fit_subject_at(0, subject, templates, cfg, progress)
}

fn fit_subject_at(
    index: usize,
    subject: &Subject,
    templates: &TemplateSet,
    cfg: &FittingConfig,
    progress: &dyn Progress,
) -> Result<SubjectFit, FitError> {
    progress.report(Stage::Subject { index, name: subject.name.clone() });
    let fitted = subject
        .conditions
        .iter()
        .map(|rec| fit_file(rec, templates, cfg, progress))
        .collect::<Result<Vec<_>, _>>()?;

    let gev = GevDenominator::from_files(&fitted);

    let markov = if cfg.markov_enabled() {
        progress.report(Stage::Markov);
        let mut counts = MarkovCounts::new(fitted.len(), cfg.markov_steps, templates.n_maps(), cfg.markov_undefined);
        for (c, f) in fitted.iter().enumerate() {
            counts.accumulate(c, f);
        }
        Some(counts)
    } else {
        None
    };

    let mut files = Vec::with_capacity(fitted.len());
    for f in fitted {
        progress.report(Stage::Statistics { file: f.name.clone() });
        check_cancel(progress)?;
        let statistics = file_statistics(&f, &gev, cfg.histogram_max);
        files.push(FileFit { fitted: f, statistics });
    }

    let warnings: Vec<FitWarning> = files.iter().flat_map(|f| f.fitted.warnings.iter().cloned()).collect();
    for w in &warnings {
        log::warn!("{w}");
    }

    let fit = SubjectFit { name: subject.name.clone(), files, gev, markov, warnings };
    log::info!("{}: {} conditions fitted, total GEV {:.4}", fit.name, fit.files.len(), fit.total_gev());
    Ok(fit)
}

/// Results of a whole group of subjects.
#[derive(Debug, Clone)]
pub struct GroupFit {
    pub subjects: Vec<SubjectFit>,
    /// Markov counts summed over subjects.
    pub markov: Option<MarkovCounts>,
}

impl GroupFit {
    pub fn markov_tables(&self) -> Option<MarkovTables> {
        self.markov.as_ref().map(MarkovCounts::tables)
    }
}

/// Fit every subject, in parallel across subjects.
///
/// All subjects must have the same number of conditions.
pub fn fit_subjects(
    subjects: &[Subject],
    templates: &TemplateSet,
    cfg: &FittingConfig,
    progress: &(dyn Progress + Sync),
) -> Result<GroupFit, FitError> {
    cfg.validate()?;
    if let Some(first) = subjects.first() {
        let expected = first.conditions.len();
        if let Some(s) = subjects.iter().find(|s| s.conditions.len() != expected) {
            return Err(FitError::ConditionCountMismatch {
                subject: s.name.clone(),
                got: s.conditions.len(),
                expected,
            });
        }
    }

    let fits = subjects
        .par_iter()
        .enumerate()
        .map(|(index, subject)| fit_subject_at(index, subject, templates, cfg, progress))
        .collect::<Result<Vec<_>, _>>()?;

    let mut markov: Option<MarkovCounts> = None;
    for counts in fits.iter().filter_map(|f| f.markov.as_ref()) {
        match markov.as_mut() {
            Some(total) => total.merge(counts)?,
            None => markov = Some(counts.clone()),
        }
    }

    Ok(GroupFit { subjects: fits, markov })
}
