//! Per-file, per-label statistics.
use serde::{Deserialize, Serialize};

use super::gev::GevDenominator;
use super::variables::{LabelStats, TimeUnit};
use crate::pipeline::FittedFile;

/// Statistics of one fitted file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStatistics {
    pub name: String,
    pub time_unit: TimeUnit,
    /// Samples inside the file's epochs.
    pub n_samples: usize,
    /// Of those, samples that carry a label (or are evaluated, in
    /// non-competitive mode).
    pub n_labeled: usize,
    /// One entry per template, in template order.
    pub maps: Vec<LabelStats>,
    pub undefined: LabelStats,
    /// Undefined samples over `n_samples`.
    pub undefined_ratio: Option<f64>,
}

impl FileStatistics {
    pub fn label(&self, k: usize) -> &LabelStats {
        &self.maps[k]
    }
}

/// Geometric mean of segment lengths, `None` for no segments.
pub fn geometric_mean(lengths: &[usize]) -> Option<f64> {
    if lengths.is_empty() {
        return None;
    }
    let log_sum: f64 = lengths.iter().map(|&l| (l as f64).ln()).sum();
    Some((log_sum / lengths.len() as f64).exp())
}

/// Segment-length histogram with `max` bins (`0` → empty).
pub fn duration_histogram(lengths: &[usize], max: usize) -> Vec<usize> {
    let mut bins = vec![0; max];
    if max == 0 {
        return bins;
    }
    for &l in lengths.iter().filter(|&&l| l > 0) {
        bins[l.min(max) - 1] += 1;
    }
    bins
}

#[derive(Default)]
struct Accumulator {
    count: usize,
    onset: Option<usize>,
    offset: Option<usize>,
    sum_corr: f64,
    best_corr: Option<(f64, usize, f64)>,
    sum_gfp: f64,
    max_gfp: Option<(f64, usize)>,
    sum_t_gfp: f64,
    explained: f64,
}

impl Accumulator {
    fn push(&mut self, t: usize, corr: f64, gfp: f64) {
        self.count += 1;
        self.onset.get_or_insert(t);
        self.offset = Some(t);
        self.sum_corr += corr;
        if self.best_corr.map_or(true, |(c, _, _)| corr > c) {
            self.best_corr = Some((corr, t, gfp));
        }
        self.sum_gfp += gfp;
        if self.max_gfp.map_or(true, |(g, _)| gfp > g) {
            self.max_gfp = Some((gfp, t));
        }
        self.sum_t_gfp += t as f64 * gfp;
        self.explained += gfp * gfp * corr * corr;
    }
}

/// Compute the statistics table of `file`.
///
/// `denominator` must hold the labeled power of every condition of the
/// file's subject (see [`GevDenominator::from_files`]).
pub fn file_statistics(
    file: &FittedFile,
    denominator: &GevDenominator,
    histogram_max: usize,
) -> FileStatistics {
    let unit = TimeUnit::from_sfreq(file.sfreq);
    let labeled = file.labeled_mask();
    let n_samples: usize = file.epochs.iter().map(|e| e.len()).sum();
    let n_labeled = labeled.iter().filter(|&&l| l).count();

    let maps = (0..file.n_maps())
        .map(|k| map_statistics(file, k, n_labeled, denominator, unit, histogram_max))
        .collect();

    // Undefined: runs of unlabeled samples inside each epoch.
    let mut runs = Vec::new();
    for e in &file.epochs {
        let mut run = 0;
        for t in e.from..=e.to {
            if labeled[t] {
                if run > 0 {
                    runs.push(run);
                }
                run = 0;
            } else {
                run += 1;
            }
        }
        if run > 0 {
            runs.push(run);
        }
    }
    let n_undefined = n_samples - n_labeled;
    let undefined = LabelStats {
        label: None,
        eligible: true,
        n_samples: n_undefined,
        n_segments: runs.len(),
        mean_duration: geometric_mean(&runs).map(|g| unit.duration(g)),
        histogram: duration_histogram(&runs, histogram_max),
        ..LabelStats::default()
    };

    FileStatistics {
        name: file.name.clone(),
        time_unit: unit,
        n_samples,
        n_labeled,
        maps,
        undefined,
        undefined_ratio: (n_samples > 0).then(|| n_undefined as f64 / n_samples as f64),
    }
}

fn map_statistics(
    file: &FittedFile,
    k: usize,
    n_labeled: usize,
    denominator: &GevDenominator,
    unit: TimeUnit,
    histogram_max: usize,
) -> LabelStats {
    if !file.epochs.iter().any(|e| e.is_eligible(k)) {
        return LabelStats::absent(Some(k));
    }

    let mut acc = Accumulator::default();
    for e in file.epochs.iter().filter(|e| e.is_eligible(k)) {
        for t in e.from..=e.to {
            if file.assignment.occupies(k, t) {
                let corr = file.scores.adjusted(k, t, file.polarity);
                acc.push(t, corr, file.gfp[t] as f64);
            }
        }
    }

    let lengths: Vec<usize> = file
        .segments
        .iter()
        .filter(|s| s.label == Some(k))
        .map(|s| s.len())
        .collect();

    let mut stats = LabelStats {
        label: Some(k),
        eligible: true,
        n_samples: acc.count,
        time_coverage: (n_labeled > 0).then(|| acc.count as f64 / n_labeled as f64 * 100.0),
        n_segments: lengths.len(),
        histogram: duration_histogram(&lengths, histogram_max),
        ..LabelStats::default()
    };
    if acc.count == 0 {
        return stats;
    }

    let n = acc.count as f64;
    stats.onset = acc.onset;
    stats.offset = acc.offset;
    stats.centroid = (acc.sum_gfp > 0.0).then(|| acc.sum_t_gfp / acc.sum_gfp);
    stats.mean_correlation = Some(acc.sum_corr / n);
    if let Some((c, t, g)) = acc.best_corr {
        stats.best_correlation = Some(c);
        stats.best_correlation_sample = Some(t);
        stats.best_correlation_gfp = Some(g);
    }
    stats.mean_gfp = Some(acc.sum_gfp / n);
    if let Some((g, t)) = acc.max_gfp {
        stats.max_gfp = Some(g);
        stats.max_gfp_sample = Some(t);
    }
    stats.gev = denominator.ratio(acc.explained);
    stats.mean_duration = geometric_mean(&lengths).map(|g| unit.duration(g));
    stats.segment_density = (!lengths.is_empty()).then(|| unit.rate(lengths.len(), n_labeled));
    stats
}
