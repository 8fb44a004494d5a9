//! Statistic variables and the per-label record.
use serde::{Deserialize, Serialize};

use crate::label::Label;

/// Unit of duration-like values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    /// Sampling rate known: durations in ms, densities per second.
    Milliseconds { sfreq: f64 },
    /// Sampling rate unknown: durations in samples, densities per sample.
    Samples,
}

impl TimeUnit {
    pub fn from_sfreq(sfreq: f64) -> Self {
        if sfreq > 0.0 {
            Self::Milliseconds { sfreq }
        } else {
            Self::Samples
        }
    }

    /// Convert a length in samples to this unit.
    #[inline]
    pub fn duration(self, samples: f64) -> f64 {
        match self {
            Self::Milliseconds { sfreq } => samples * 1000.0 / sfreq,
            Self::Samples => samples,
        }
    }

    /// Events per second (or per sample).
    #[inline]
    pub fn rate(self, count: usize, samples: usize) -> f64 {
        match self {
            Self::Milliseconds { sfreq } => count as f64 * sfreq / samples as f64,
            Self::Samples => count as f64 / samples as f64,
        }
    }
}

/// Exported statistic, in table column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variable {
    NumSamples,
    TimeCoverage,
    Onset,
    Offset,
    Centroid,
    MeanCorrelation,
    BestCorrelation,
    BestCorrelationSample,
    BestCorrelationGfp,
    MeanGfp,
    MaxGfp,
    MaxGfpSample,
    Gev,
    NumSegments,
    MeanDuration,
    SegmentDensity,
}

impl Variable {
    pub const ALL: [Variable; 16] = [
        Variable::NumSamples,
        Variable::TimeCoverage,
        Variable::Onset,
        Variable::Offset,
        Variable::Centroid,
        Variable::MeanCorrelation,
        Variable::BestCorrelation,
        Variable::BestCorrelationSample,
        Variable::BestCorrelationGfp,
        Variable::MeanGfp,
        Variable::MaxGfp,
        Variable::MaxGfpSample,
        Variable::Gev,
        Variable::NumSegments,
        Variable::MeanDuration,
        Variable::SegmentDensity,
    ];

    /// Column name used in exported tables.
    pub fn name(self) -> &'static str {
        match self {
            Self::NumSamples => "n_samples",
            Self::TimeCoverage => "time_coverage",
            Self::Onset => "onset",
            Self::Offset => "offset",
            Self::Centroid => "centroid",
            Self::MeanCorrelation => "mean_corr",
            Self::BestCorrelation => "best_corr",
            Self::BestCorrelationSample => "best_corr_tf",
            Self::BestCorrelationGfp => "best_corr_gfp",
            Self::MeanGfp => "mean_gfp",
            Self::MaxGfp => "max_gfp",
            Self::MaxGfpSample => "max_gfp_tf",
            Self::Gev => "gev",
            Self::NumSegments => "n_segments",
            Self::MeanDuration => "mean_duration",
            Self::SegmentDensity => "segment_density",
        }
    }

    /// Count-like variables are `0` when absent rather than missing.
    pub fn is_count(self) -> bool {
        matches!(self, Self::NumSamples | Self::NumSegments)
    }
}

/// Statistics of one label in one file.  `None` means missing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LabelStats {
    /// Template index, `None` for the Undefined bucket.
    pub label: Label,
    /// Eligible in at least one epoch of the file.
    pub eligible: bool,
    pub n_samples: usize,
    /// Percentage of labeled samples.  `None` when nothing is labeled.
    pub time_coverage: Option<f64>,
    pub onset: Option<usize>,
    pub offset: Option<usize>,
    /// GFP-weighted mean sample index.
    pub centroid: Option<f64>,
    pub mean_correlation: Option<f64>,
    pub best_correlation: Option<f64>,
    pub best_correlation_sample: Option<usize>,
    pub best_correlation_gfp: Option<f64>,
    pub mean_gfp: Option<f64>,
    pub max_gfp: Option<f64>,
    pub max_gfp_sample: Option<usize>,
    /// Fraction of the subject's labeled power explained by this label.
    ///
    /// Each value is at most 1.  In non-competitive mode maps share
    /// samples, so the sum over maps can reach the number of maps.
    pub gev: Option<f64>,
    pub n_segments: usize,
    /// Geometric mean segment length, in the file's [`TimeUnit`].
    pub mean_duration: Option<f64>,
    /// Segments per second (per sample when the rate is unknown).
    pub segment_density: Option<f64>,
    /// `histogram[i]` counts segments of `i + 1` samples; the last bin
    /// also holds every longer segment.
    pub histogram: Vec<usize>,
}

impl LabelStats {
    /// Record for a label that cannot occur in the file.
    pub fn absent(label: Label) -> Self {
        Self { label, ..Self::default() }
    }

    pub fn value(&self, var: Variable) -> Option<f64> {
        match var {
            Variable::NumSamples => Some(self.n_samples as f64),
            Variable::TimeCoverage => self.time_coverage,
            Variable::Onset => self.onset.map(|v| v as f64),
            Variable::Offset => self.offset.map(|v| v as f64),
            Variable::Centroid => self.centroid,
            Variable::MeanCorrelation => self.mean_correlation,
            Variable::BestCorrelation => self.best_correlation,
            Variable::BestCorrelationSample => self.best_correlation_sample.map(|v| v as f64),
            Variable::BestCorrelationGfp => self.best_correlation_gfp,
            Variable::MeanGfp => self.mean_gfp,
            Variable::MaxGfp => self.max_gfp,
            Variable::MaxGfpSample => self.max_gfp_sample.map(|v| v as f64),
            Variable::Gev => self.gev,
            Variable::NumSegments => Some(self.n_segments as f64),
            Variable::MeanDuration => self.mean_duration,
            Variable::SegmentDensity => self.segment_density,
        }
    }

    /// `(name, value)` pairs in column order.
    pub fn table(&self) -> Vec<(&'static str, Option<f64>)> {
        Variable::ALL.iter().map(|&v| (v.name(), self.value(v))).collect()
    }
}
