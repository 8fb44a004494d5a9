//! Bad-interval exclusion.
//!
//! Runs after smoothing and rejection so that neighbouring good data can
//! never win back an artifact.  Every bad sample becomes Undefined; a
//! segment whose bad fraction exceeds `tolerance` is dropped entirely.
use ndarray::Array2;

use crate::label::Label;
use crate::recording::{Epoch, Interval};
use crate::segment::extract_segments;

/// Per-sample bad flags over `[0, n_times)`.
pub fn bad_sample_mask(bad: &[Interval], n_times: usize) -> Vec<bool> {
    let mut mask = vec![false; n_times];
    for iv in bad {
        if iv.from >= n_times {
            continue;
        }
        mask[iv.from..=iv.to.min(n_times - 1)].fill(true);
    }
    mask
}

/// Mask `labels[epoch.from..=epoch.to]`.  Returns how many samples were
/// turned Undefined.
pub fn mask_bad_intervals(
    labels: &mut [Label],
    bad: &[bool],
    epoch: &Epoch,
    tolerance: f64,
) -> usize {
    let mut masked = 0;
    for seg in extract_segments(labels, epoch.from, epoch.to) {
        if seg.label.is_none() {
            continue;
        }
        let n_bad = bad[seg.from..=seg.to].iter().filter(|&&b| b).count();
        if n_bad == 0 {
            continue;
        }
        let drop_all = n_bad as f64 / seg.len() as f64 > tolerance;
        for t in seg.from..=seg.to {
            if drop_all || bad[t] {
                labels[t] = None;
                masked += 1;
            }
        }
    }
    masked
}

/// Non-competitive variant: bad samples are inactive for every template.
pub fn mask_concurrent(mask: &mut Array2<bool>, bad: &[bool], epoch: &Epoch) {
    for t in (epoch.from..=epoch.to).filter(|&t| bad[t]) {
        mask.column_mut(t).fill(false);
    }
}
