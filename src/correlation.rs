//! Spatial correlation between samples and templates.
//!
//! Every sample and every template is normalised once (centred for scalar
//! data, scaled to unit norm), after which a correlation is a plain dot
//! product.  A vector with zero norm normalises to all zeros, so any
//! correlation involving it is exactly `0`.
//!
//! [`ScoreTable`] holds the signed correlation of every template against
//! every sample of a recording.  All later stages read scores from it and
//! apply the [`PolarityMode`] on the fly.
use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::config::PolarityMode;
use crate::recording::{AtomType, Recording, TemplateSet};

/// Norms below this are treated as zero.
const NORM_EPS: f64 = 1e-12;

/// Centre (scalar data only) and scale `v` to unit norm, in `f64`.
pub fn normalize_map(v: ArrayView1<'_, f32>, atom: AtomType) -> Array1<f64> {
    let mut out: Array1<f64> = v.mapv(|x| x as f64);
    if atom == AtomType::Scalar && !out.is_empty() {
        let mean = out.sum() / out.len() as f64;
        out.mapv_inplace(|x| x - mean);
    }
    let norm = out.dot(&out).sqrt();
    if norm > NORM_EPS {
        out.mapv_inplace(|x| x / norm);
    } else {
        out.fill(0.0);
    }
    out
}

/// Signed spatial correlation of two maps, in `[-1, 1]`.
///
/// Returns `0.0` when either map is degenerate (all zeros, or constant
/// for scalar data).
pub fn correlation(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>, atom: AtomType) -> f64 {
    let na = normalize_map(a, atom);
    let nb = normalize_map(b, atom);
    na.dot(&nb).clamp(-1.0, 1.0)
}

/// Signed correlation of every template against every sample, `[K, T]`.
#[derive(Debug, Clone)]
pub struct ScoreTable {
    scores: Array2<f64>,
}

impl ScoreTable {
    /// Correlate every column of `recording.data` with every template.
    ///
    /// Channel counts are assumed to have been checked by
    /// [`Recording::resolve_epochs`].
    pub fn compute(recording: &Recording, templates: &TemplateSet) -> Self {
        let atom = templates.atom;
        let n_maps = templates.n_maps();

        let mut maps = Array2::<f64>::zeros((n_maps, templates.dim()));
        for (k, mut row) in maps.axis_iter_mut(Axis(0)).enumerate() {
            row.assign(&normalize_map(templates.map(k), atom));
        }

        let mut scores = Array2::<f64>::zeros((n_maps, recording.n_times()));
        for (t, col) in recording.data.axis_iter(Axis(1)).enumerate() {
            let sample = normalize_map(col, atom);
            let r = maps.dot(&sample);
            for k in 0..n_maps {
                scores[[k, t]] = r[k].clamp(-1.0, 1.0);
            }
        }

        Self { scores }
    }

    /// Wrap precomputed scores `[K, T]`.
    pub fn from_scores(scores: Array2<f64>) -> Self {
        Self { scores }
    }

    #[inline]
    pub fn n_maps(&self) -> usize {
        self.scores.nrows()
    }

    #[inline]
    pub fn n_times(&self) -> usize {
        self.scores.ncols()
    }

    /// Signed correlation of template `k` at sample `t`.
    #[inline]
    pub fn signed(&self, k: usize, t: usize) -> f64 {
        self.scores[[k, t]]
    }

    /// Correlation of template `k` at sample `t` after the polarity rule.
    #[inline]
    pub fn adjusted(&self, k: usize, t: usize, polarity: PolarityMode) -> f64 {
        polarity.adjust(self.scores[[k, t]])
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.scores
    }
}
