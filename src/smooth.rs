//! Temporal smoothing of a label sequence.
//!
//! Windowed energy minimisation after Pascual-Marqui et al. (1995),
//! written in terms of correlations.  For sample `t` and candidate map `k`
//!
//! ```text
//! cost(t, k) = GFP²(t) · (1 − s·|s|) / (2σ²)  −  λ · N_k(t)
//! ```
//!
//! where `s` is the polarity-adjusted correlation, `N_k(t)` counts the
//! samples of `[t−W, t+W]` (clipped to the epoch, `t` excluded) labeled `k`
//! by the previous iteration, and `σ²` is the mean residual
//! `GFP²·(1 − s·|s|)` over labeled samples.  Each iteration relabels every
//! sample from the previous iteration's labels; iterations stop when `σ²`
//! settles, nothing changes, or the cap is hit.
//!
//! Undefined samples are reclaimed when more than half of their window is
//! labeled, regardless of the labeling threshold.
use ndarray::ArrayView1;

use crate::config::{FittingConfig, PolarityMode};
use crate::correlation::ScoreTable;
use crate::error::FitError;
use crate::label::Label;
use crate::progress::Progress;
use crate::recording::Epoch;

const SIGMA2_FLOOR: f64 = 1e-30;

/// Smoother parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingParams {
    /// Half-window `W` in samples.
    pub half_window: usize,
    /// Strength `λ`.
    pub strength: f64,
    pub max_iterations: usize,
    /// Relative `σ²` change that counts as converged.
    pub tolerance: f64,
}

impl SmoothingParams {
    pub fn from_config(cfg: &FittingConfig) -> Self {
        Self {
            half_window: cfg.smoothing_half_window,
            strength: cfg.smoothing_strength,
            max_iterations: cfg.smoothing_max_iterations,
            tolerance: cfg.smoothing_tolerance,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.half_window > 0 && self.strength > 0.0 && self.max_iterations > 0
    }
}

/// What one smoothing run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SmoothingOutcome {
    pub iterations: usize,
    pub converged: bool,
    /// Samples whose label differs from the input.
    pub relabeled: usize,
}

/// Per-map label counts inside the sliding window.
struct WindowCounts {
    per_map: Vec<usize>,
    labeled: usize,
}

impl WindowCounts {
    fn new(n_maps: usize) -> Self {
        Self { per_map: vec![0; n_maps], labeled: 0 }
    }

    fn add(&mut self, label: Label) {
        if let Some(k) = label {
            self.per_map[k] += 1;
            self.labeled += 1;
        }
    }

    fn remove(&mut self, label: Label) {
        if let Some(k) = label {
            self.per_map[k] -= 1;
            self.labeled -= 1;
        }
    }
}

/// Smooth `labels[epoch.from..=epoch.to]` in place.
pub fn smooth_labels(
    scores: &ScoreTable,
    gfp: ArrayView1<'_, f32>,
    epoch: &Epoch,
    polarity: PolarityMode,
    params: &SmoothingParams,
    labels: &mut [Label],
    progress: &dyn Progress,
) -> Result<SmoothingOutcome, FitError> {
    if !params.is_enabled() || epoch.is_empty() || epoch.maps.is_empty() {
        return Ok(SmoothingOutcome { converged: true, ..Default::default() });
    }

    let (a, b) = (epoch.from, epoch.to);
    let n = b - a + 1;
    let w = params.half_window;
    let lambda = params.strength;

    let gfp2: Vec<f64> = (a..=b).map(|t| (gfp[t] as f64).powi(2)).collect();
    let residual = |i: usize, k: usize| {
        let s = scores.adjusted(k, a + i, polarity);
        gfp2[i] * (1.0 - s * s.abs())
    };
    let variance = |seq: &[Label]| -> Option<f64> {
        let (sum, count) = seq
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.map(|k| residual(i, k)))
            .fold((0.0, 0usize), |(s, c), r| (s + r, c + 1));
        (count > 0).then(|| sum / count as f64)
    };

    let original: Vec<Label> = labels[a..=b].to_vec();
    let Some(mut sigma2) = variance(&original) else {
        // nothing labeled, nothing to grow from
        return Ok(SmoothingOutcome { converged: true, ..Default::default() });
    };

    let mut prev = original.clone();
    let mut next = original.clone();
    let mut outcome = SmoothingOutcome::default();

    for iter in 1..=params.max_iterations {
        outcome.iterations = iter;
        let denom = 2.0 * sigma2.max(SIGMA2_FLOOR);

        let mut window = WindowCounts::new(scores.n_maps());
        for &l in &prev[..=w.min(n - 1)] {
            window.add(l);
        }

        for i in 0..n {
            if progress.is_cancelled() {
                return Err(FitError::Cancelled);
            }
            if i > 0 {
                if i + w < n {
                    window.add(prev[i + w]);
                }
                if i > w {
                    window.remove(prev[i - w - 1]);
                }
            }

            let lo = i.saturating_sub(w);
            let hi = (i + w).min(n - 1);
            let neighbours = hi - lo;
            let own = prev[i];
            let labeled_neighbours = window.labeled - usize::from(own.is_some());

            if own.is_none() && 2 * labeled_neighbours <= neighbours {
                next[i] = None;
                continue;
            }

            let mut best: Option<(usize, f64)> = None;
            for &k in &epoch.maps {
                let n_k = window.per_map[k] - usize::from(own == Some(k));
                let cost = residual(i, k) / denom - lambda * n_k as f64;
                if best.map_or(true, |(_, c)| cost < c) {
                    best = Some((k, cost));
                }
            }
            next[i] = best.map(|(k, _)| k);
        }

        let changed = prev.iter().zip(&next).filter(|(p, q)| p != q).count();
        std::mem::swap(&mut prev, &mut next);

        let new_sigma2 = variance(&prev).unwrap_or(0.0);
        let settled = (new_sigma2 - sigma2).abs() <= params.tolerance * new_sigma2;
        sigma2 = new_sigma2;

        if changed == 0 || settled {
            outcome.converged = true;
            break;
        }
    }

    outcome.relabeled = original.iter().zip(&prev).filter(|(p, q)| p != q).count();
    labels[a..=b].copy_from_slice(&prev);
    Ok(outcome)
}
