//! Inputs of the fitting core: recordings, template sets, epochs and bad
//! intervals.
//!
//! Data layout follows the rest of the crate: a recording is `[D, T]` with
//! one column per time sample, and a template set is `[K, D]` with one row
//! per map.  For vectorial (source-space) data `D = 3 × n_points` and the
//! three components of a point are stored consecutively.
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// Kind of value stored per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtomType {
    /// One scalar potential per electrode.  Maps are compared after
    /// removing their spatial mean (Pearson correlation).
    Scalar,
    /// One 3-D current vector per solution point.  No spatial mean is
    /// removed.
    Vector,
}

impl AtomType {
    /// Number of stored values per channel.
    pub fn components(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vector => 3,
        }
    }
}

/// Inclusive sample interval `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub from: usize,
    pub to: usize,
}

impl Interval {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.to + 1 - self.from
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.to < self.from
    }

    #[inline]
    pub fn contains(&self, t: usize) -> bool {
        self.from <= t && t <= self.to
    }
}

/// A fitting window with its own set of eligible templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    /// First sample (inclusive).
    pub from: usize,
    /// Last sample (inclusive).
    pub to: usize,
    /// Template indices allowed in this window, ascending.
    pub maps: Vec<usize>,
}

impl Epoch {
    /// Build an epoch; `maps` is sorted and deduplicated.
    pub fn new(from: usize, to: usize, mut maps: Vec<usize>) -> Self {
        maps.sort_unstable();
        maps.dedup();
        Self { from, to, maps }
    }

    /// The whole recording with every template eligible.
    pub fn whole(n_times: usize, n_maps: usize) -> Self {
        Self { from: 0, to: n_times.saturating_sub(1), maps: (0..n_maps).collect() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.to + 1 - self.from
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.to < self.from
    }

    #[inline]
    pub fn is_eligible(&self, map: usize) -> bool {
        self.maps.binary_search(&map).is_ok()
    }

    pub fn interval(&self) -> Interval {
        Interval::new(self.from, self.to)
    }
}

/// Reference maps to fit.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    /// `[K, D]`, one map per row.
    pub maps: Array2<f32>,
    pub atom: AtomType,
}

impl TemplateSet {
    pub fn new(maps: Array2<f32>, atom: AtomType) -> Self {
        Self { maps, atom }
    }

    /// Number of templates `K`.
    #[inline]
    pub fn n_maps(&self) -> usize {
        self.maps.nrows()
    }

    /// Values per map `D`.
    #[inline]
    pub fn dim(&self) -> usize {
        self.maps.ncols()
    }

    pub fn map(&self, k: usize) -> ArrayView1<'_, f32> {
        self.maps.row(k)
    }
}

/// One preprocessed file / condition.
#[derive(Debug, Clone)]
pub struct Recording {
    /// Identifier used in warnings and exported tables.
    pub name: String,
    /// `[D, T]` preprocessed data.
    pub data: Array2<f32>,
    /// `[T]` magnitude track (GFP for scalar data, Norm for vectors).
    pub gfp: Array1<f32>,
    /// Sampling rate in Hz, `0.0` when unknown.
    pub sfreq: f64,
    pub atom: AtomType,
    /// Fitting windows.  Empty means one epoch over the whole file with
    /// every template eligible.
    pub epochs: Vec<Epoch>,
    /// Artifact intervals, honoured only when a bad-interval policy is set.
    pub bad_intervals: Vec<Interval>,
}

impl Recording {
    /// Wrap `[D, T]` data, computing its magnitude track.
    pub fn new(name: impl Into<String>, data: Array2<f32>, sfreq: f64, atom: AtomType) -> Self {
        let gfp = compute_gfp(&data, atom);
        Self {
            name: name.into(),
            data,
            gfp,
            sfreq,
            atom,
            epochs: Vec::new(),
            bad_intervals: Vec::new(),
        }
    }

    /// Number of time samples `T`.
    #[inline]
    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    /// Check this recording against `templates` and return its epochs,
    /// defaulting to one whole-file epoch.  Epochs come back sorted by
    /// onset.
    pub fn resolve_epochs(&self, templates: &TemplateSet) -> Result<Vec<Epoch>, FitError> {
        let n_times = self.n_times();
        let n_maps = templates.n_maps();

        if n_maps == 0 {
            return Err(FitError::EmptyTemplateSet);
        }
        if n_times == 0 {
            return Err(FitError::EmptyRecording(self.name.clone()));
        }
        if self.atom != templates.atom {
            return Err(FitError::AtomMismatch { name: self.name.clone() });
        }
        if self.data.nrows() != templates.dim() {
            return Err(FitError::ChannelMismatch {
                name: self.name.clone(),
                data: self.data.nrows(),
                templates: templates.dim(),
            });
        }
        if self.gfp.len() != n_times {
            return Err(FitError::GfpLength {
                name: self.name.clone(),
                gfp: self.gfp.len(),
                samples: n_times,
            });
        }
        for iv in &self.bad_intervals {
            if iv.is_empty() {
                return Err(FitError::InvalidInterval { from: iv.from, to: iv.to });
            }
        }

        if self.epochs.is_empty() {
            return Ok(vec![Epoch::whole(n_times, n_maps)]);
        }

        let mut epochs = self.epochs.clone();
        epochs.sort_by_key(|e| e.from);
        for e in &epochs {
            if e.is_empty() || e.to >= n_times {
                return Err(FitError::InvalidEpoch { from: e.from, to: e.to, n_times });
            }
            if let Some(&index) = e.maps.iter().find(|&&m| m >= n_maps) {
                return Err(FitError::InvalidTemplateIndex { index, n_maps });
            }
        }
        for pair in epochs.windows(2) {
            if pair[1].from <= pair[0].to {
                return Err(FitError::OverlappingEpochs {
                    a_from: pair[0].from,
                    a_to: pair[0].to,
                    b_from: pair[1].from,
                    b_to: pair[1].to,
                });
            }
        }
        Ok(epochs)
    }
}

/// Magnitude track of `[D, T]` data.
///
/// Scalar: standard deviation across channels (`ddof = 0`), i.e. the
/// classical Global Field Power.  Vector: root mean square of the 3-D
/// vector norms.
pub fn compute_gfp(data: &Array2<f32>, atom: AtomType) -> Array1<f32> {
    let n_dim = data.nrows();
    let n_points = (n_dim / atom.components()).max(1) as f64;

    data.axis_iter(Axis(1))
        .map(|col| {
            let power = match atom {
                AtomType::Scalar => {
                    let mean = col.iter().map(|&v| v as f64).sum::<f64>() / n_dim.max(1) as f64;
                    col.iter().map(|&v| {
                        let d = v as f64 - mean; d * d
                    }).sum::<f64>() / n_points
                }
                AtomType::Vector => {
                    col.iter().map(|&v| (v as f64) * (v as f64)).sum::<f64>() / n_points
                }
            };
            power.sqrt() as f32
        })
        .collect()
}
