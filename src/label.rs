//! Template assignment.
//!
//! - Competitive: each sample gets the eligible template with the highest
//!   adjusted correlation (lowest index on ties), or Undefined when that
//!   correlation misses the threshold.
//! - Non-competitive: every eligible template is active on every sample of
//!   the epoch (optionally only where it reaches the threshold).
use ndarray::Array2;

use crate::config::PolarityMode;
use crate::correlation::ScoreTable;
use crate::recording::Epoch;

/// Template index, or `None` for Undefined.
pub type Label = Option<usize>;

/// Result of labeling one file.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// One label per sample.
    Exclusive(Vec<Label>),
    /// `[K, T]` activity mask: `mask[[k, t]]` is `true` when template `k`
    /// is evaluated at sample `t`.
    Concurrent(Array2<bool>),
}

impl Assignment {
    /// Label sequence, if this is a competitive assignment.
    pub fn labels(&self) -> Option<&[Label]> {
        match self {
            Self::Exclusive(labels) => Some(labels),
            Self::Concurrent(_) => None,
        }
    }

    /// Does template `k` occupy sample `t`?
    #[inline]
    pub fn occupies(&self, k: usize, t: usize) -> bool {
        match self {
            Self::Exclusive(labels) => labels[t] == Some(k),
            Self::Concurrent(mask) => mask[[k, t]],
        }
    }

    /// Is sample `t` labeled by any template?
    #[inline]
    pub fn is_labeled(&self, t: usize) -> bool {
        match self {
            Self::Exclusive(labels) => labels[t].is_some(),
            Self::Concurrent(mask) => mask.column(t).iter().any(|&a| a),
        }
    }
}

/// Best eligible template at sample `t` and its adjusted score.
///
/// Ties keep the lowest template index.  `None` if `maps` is empty.
#[inline]
pub fn best_label(
    scores: &ScoreTable,
    t: usize,
    maps: &[usize],
    polarity: PolarityMode,
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for &k in maps {
        let s = scores.adjusted(k, t, polarity);
        if best.map_or(true, |(_, b)| s > b) {
            best = Some((k, s));
        }
    }
    best
}

/// Competitive labeling of `epoch` into `labels` (indexed by absolute
/// sample).  Returns the number of labeled samples.
pub fn label_competitive(
    scores: &ScoreTable,
    epoch: &Epoch,
    polarity: PolarityMode,
    threshold: Option<f64>,
    labels: &mut [Label],
) -> usize {
    let mut n_labeled = 0;
    for t in epoch.from..=epoch.to {
        labels[t] = match best_label(scores, t, &epoch.maps, polarity) {
            Some((k, s)) if threshold.map_or(true, |th| s >= th) => {
                n_labeled += 1;
                Some(k)
            }
            _ => None,
        };
    }
    n_labeled
}

/// Non-competitive activity of `epoch` into `mask` (`[K, T]`).
pub fn label_concurrent(
    scores: &ScoreTable,
    epoch: &Epoch,
    polarity: PolarityMode,
    threshold: Option<f64>,
    mask: &mut Array2<bool>,
) {
    for &k in &epoch.maps {
        for t in epoch.from..=epoch.to {
            mask[[k, t]] = threshold.map_or(true, |th| scores.adjusted(k, t, polarity) >= th);
        }
    }
}
