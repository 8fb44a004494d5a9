//! Small-segment rejection.
//!
//! Segments shorter than `min_size` samples are handed to their neighbours.
//! The segments of one epoch live in an index-linked list and short ones
//! sit in a min-heap keyed by `(length, onset)`; each iteration pops the
//! shortest live entry and resolves it:
//!
//! - both neighbours defined with the same label: the three segments merge;
//! - both defined, different labels: the segment is cut at the point that
//!   maximises the summed correlation of the left map before the cut and
//!   the right map after it;
//! - one defined neighbour: it takes the whole segment;
//! - only Undefined neighbours: the segment becomes Undefined.
//!
//! The neighbours' maps are accepted whatever their correlation, so the
//! labeling threshold is relaxed inside rejected segments.  Neighbours only
//! ever grow, so every iteration removes at least one segment; the
//! iteration cap bounds the loop regardless.  A segment alone in its epoch
//! has no neighbour and is left in place.
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::config::{FittingConfig, PolarityMode};
use crate::correlation::ScoreTable;
use crate::error::FitError;
use crate::label::Label;
use crate::progress::Progress;
use crate::recording::Epoch;
use crate::segment::extract_segments;

/// Rejection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectionParams {
    /// Segments strictly shorter than this are rejected.
    pub min_size: usize,
    /// Also reject short Undefined segments.
    pub reject_undefined: bool,
    pub max_iterations: usize,
}

impl RejectionParams {
    pub fn from_config(cfg: &FittingConfig) -> Self {
        Self {
            min_size: cfg.reject_size,
            reject_undefined: cfg.reject_undefined,
            max_iterations: cfg.reject_max_iterations,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.min_size > 1
    }
}

/// What one rejection run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RejectionOutcome {
    pub iterations: usize,
    /// `false` when the iteration cap stopped the loop.
    pub converged: bool,
    /// Segments removed.
    pub absorbed: usize,
    /// Short segments still present (cap hit, or no neighbour to take them).
    pub remaining: usize,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    from: usize,
    to: usize,
    label: Label,
    prev: Option<usize>,
    next: Option<usize>,
    alive: bool,
}

impl Node {
    fn len(&self) -> usize {
        self.to + 1 - self.from
    }
}

struct SegmentList {
    nodes: Vec<Node>,
    /// Nodes unlinked so far.
    removed: usize,
}

impl SegmentList {
    fn build(labels: &[Label], from: usize, to: usize) -> Self {
        let segs = extract_segments(labels, from, to);
        let n = segs.len();
        let nodes = segs
            .iter()
            .enumerate()
            .map(|(i, s)| Node {
                from: s.from,
                to: s.to,
                label: s.label,
                prev: i.checked_sub(1),
                next: (i + 1 < n).then_some(i + 1),
                alive: true,
            })
            .collect();
        Self { nodes, removed: 0 }
    }

    fn unlink(&mut self, id: usize) {
        let Node { prev, next, .. } = self.nodes[id];
        if let Some(p) = prev {
            self.nodes[p].next = next;
        }
        if let Some(q) = next {
            self.nodes[q].prev = prev;
        }
        self.nodes[id].alive = false;
        self.removed += 1;
    }

    /// Fold the following segment into `id` when they share a label.
    fn merge_next(&mut self, id: usize) -> bool {
        match self.nodes[id].next {
            Some(q) if self.nodes[q].label == self.nodes[id].label => {
                self.nodes[id].to = self.nodes[q].to;
                self.unlink(q);
                true
            }
            _ => false,
        }
    }
}

/// Remove segments shorter than `params.min_size` from
/// `labels[epoch.from..=epoch.to]`.
pub fn reject_small_segments(
    scores: &ScoreTable,
    epoch: &Epoch,
    polarity: PolarityMode,
    params: &RejectionParams,
    labels: &mut [Label],
    progress: &dyn Progress,
) -> Result<RejectionOutcome, FitError> {
    if !params.is_enabled() || epoch.is_empty() {
        return Ok(RejectionOutcome { converged: true, ..Default::default() });
    }

    let mut list = SegmentList::build(labels, epoch.from, epoch.to);
    let is_short = |n: &Node| {
        n.alive && n.len() < params.min_size && (n.label.is_some() || params.reject_undefined)
    };

    let mut heap = BinaryHeap::new();
    for (id, node) in list.nodes.iter().enumerate() {
        if is_short(node) {
            heap.push(Reverse((node.len(), node.from, id)));
        }
    }

    let mut outcome = RejectionOutcome { converged: true, ..Default::default() };
    while let Some(Reverse((len, _, id))) = heap.pop() {
        let node = list.nodes[id];
        if !node.alive || node.len() != len || !is_short(&node) {
            continue;
        }
        if outcome.iterations == params.max_iterations {
            outcome.converged = false;
            break;
        }
        if progress.is_cancelled() {
            return Err(FitError::Cancelled);
        }
        outcome.iterations += 1;

        let grown = resolve(&mut list, id, scores, polarity, labels);

        for g in grown.into_iter().flatten() {
            let n = list.nodes[g];
            if is_short(&n) {
                heap.push(Reverse((n.len(), n.from, g)));
            }
        }
    }

    outcome.absorbed = list.removed;
    outcome.remaining = list.nodes.iter().filter(|&n| is_short(n)).count();
    Ok(outcome)
}

/// Resolve short segment `id`.  Returns the segments that grew.
fn resolve(
    list: &mut SegmentList,
    id: usize,
    scores: &ScoreTable,
    polarity: PolarityMode,
    labels: &mut [Label],
) -> [Option<usize>; 2] {
    let node = list.nodes[id];
    let defined = |o: Option<usize>, list: &SegmentList| o.filter(|&j| list.nodes[j].label.is_some());
    let left = defined(node.prev, &*list);
    let right = defined(node.next, &*list);

    match (left, right) {
        (None, None) => {
            if node.label.is_none() || (node.prev.is_none() && node.next.is_none()) {
                return [None, None];
            }
            // only Undefined around: drop to Undefined and join them
            labels[node.from..=node.to].fill(None);
            list.nodes[id].label = None;
            let mut keep = id;
            if let Some(p) = node.prev {
                list.merge_next(p);
                keep = p;
            }
            list.merge_next(keep);
            [Some(keep), None]
        }
        (Some(j), None) | (None, Some(j)) => {
            let label = list.nodes[j].label;
            labels[node.from..=node.to].fill(label);
            list.nodes[j].from = list.nodes[j].from.min(node.from);
            list.nodes[j].to = list.nodes[j].to.max(node.to);
            list.unlink(id);
            [Some(j), None]
        }
        (Some(i), Some(j)) if list.nodes[i].label == list.nodes[j].label => {
            labels[node.from..=node.to].fill(list.nodes[i].label);
            list.nodes[i].to = node.to;
            list.unlink(id);
            list.merge_next(i);
            [Some(i), None]
        }
        (Some(i), Some(j)) => {
            let (li, lj) = (list.nodes[i].label, list.nodes[j].label);
            let cut = best_cut(scores, polarity, node.from, node.to, li, lj);
            labels[node.from..cut].fill(li);
            labels[cut..=node.to].fill(lj);
            list.nodes[i].to = cut.max(node.from) - 1;
            list.nodes[j].from = cut;
            list.unlink(id);
            [Some(i), Some(j)]
        }
    }
}

/// Cut `c ∈ [from, to + 1]` maximising Σ score(left) over `[from, c)` plus
/// Σ score(right) over `[c, to]`.  The earliest maximum wins.
fn best_cut(
    scores: &ScoreTable,
    polarity: PolarityMode,
    from: usize,
    to: usize,
    left: Label,
    right: Label,
) -> usize {
    let score = |l: Label, t: usize| l.map_or(0.0, |k| scores.adjusted(k, t, polarity));
    let mut gain = 0.0;
    let mut best = (from, 0.0);
    for t in from..=to {
        gain += score(left, t) - score(right, t);
        if gain > best.1 {
            best = (t + 1, gain);
        }
    }
    best.0
}
