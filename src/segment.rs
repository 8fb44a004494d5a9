//! Segment extraction.
//!
//! A segment is a maximal run of one label value, Undefined included.
//! Extracting `[from, to]` yields segments that tile the range exactly.
use serde::{Deserialize, Serialize};

use crate::label::Label;
use crate::recording::Epoch;

/// Maximal run of identical labels, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub from: usize,
    pub to: usize,
    pub label: Label,
}

impl Segment {
    pub fn new(from: usize, to: usize, label: Label) -> Self {
        Self { from, to, label }
    }

    /// Number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.to + 1 - self.from
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.to < self.from
    }
}

/// Split `labels[from..=to]` into maximal runs.  Empty when `from > to`.
pub fn extract_segments(labels: &[Label], from: usize, to: usize) -> Vec<Segment> {
    let mut out = Vec::new();
    if from > to {
        return out;
    }

    let mut start = from;
    for t in from + 1..=to {
        if labels[t] != labels[start] {
            out.push(Segment::new(start, t - 1, labels[start]));
            start = t;
        }
    }
    out.push(Segment::new(start, to, labels[start]));
    out
}

/// Non-competitive segments: one per eligible template spanning the
/// epoch.
pub fn concurrent_segments(epoch: &Epoch) -> Vec<Segment> {
    epoch.maps.iter().map(|&k| Segment::new(epoch.from, epoch.to, Some(k))).collect()
}
