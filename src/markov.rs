//! Markov chains over segment sequences.
//!
//! For each condition and each lag `k = 1..N`, [`MarkovCounts`] counts how
//! often a segment labeled `a` is followed `k` segments later by one
//! labeled `b`.  Sequences never cross epoch boundaries, and both labels
//! must be eligible in the epoch.  State index `K` is the Undefined bucket;
//! it takes part only when Undefined transitions are enabled.
//!
//! [`MarkovTables`] turns counts into observed and expected (independence)
//! joint probabilities and transition matrices.  At lag 1 two consecutive
//! segments can never share a label, so the expected tables exclude
//! self-transitions there:
//!
//! ```text
//! k = 1:  E[a→b] = p_a·p_b / (1 − Σ p_i²)   (a ≠ b),  0 on the diagonal
//!         T[a→b] = p_b / (1 − p_a)           (a ≠ b)
//! k > 1:  E[a→b] = p_a·p_b,                  T[a→b] = p_b
//! ```
use ndarray::{s, Array2, Array4};

use crate::error::FitError;
use crate::label::Label;
use crate::pipeline::FittedFile;

/// Raw transition and occurrence counts of one subject group.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkovCounts {
    /// `[C, N, K+1, K+1]`: condition, lag − 1, from, to.
    pub transitions: Array4<f64>,
    /// `[C, K+1]`: segments per state, for the expected marginals.
    pub occurrences: Array2<f64>,
    pub include_undefined: bool,
}

impl MarkovCounts {
    pub fn new(n_conditions: usize, n_steps: usize, n_maps: usize, include_undefined: bool) -> Self {
        let n_states = n_maps + 1;
        Self {
            transitions: Array4::zeros((n_conditions, n_steps, n_states, n_states)),
            occurrences: Array2::zeros((n_conditions, n_states)),
            include_undefined,
        }
    }

    pub fn n_conditions(&self) -> usize {
        self.transitions.dim().0
    }

    pub fn n_steps(&self) -> usize {
        self.transitions.dim().1
    }

    /// Number of states, Undefined included.
    pub fn n_states(&self) -> usize {
        self.transitions.dim().2
    }

    /// State index of a label.
    #[inline]
    pub fn state(&self, label: Label) -> usize {
        label.unwrap_or(self.n_states() - 1)
    }

    /// Count the segment sequences of `file` as condition `condition`.
    pub fn accumulate(&mut self, condition: usize, file: &FittedFile) {
        for epoch in &file.epochs {
            let states: Vec<Option<usize>> = file
                .segments
                .iter()
                .filter(|seg| seg.from >= epoch.from && seg.to <= epoch.to)
                .map(|seg| match seg.label {
                    Some(k) if epoch.is_eligible(k) => Some(self.state(Some(k))),
                    Some(_) => None,
                    None => self.include_undefined.then(|| self.state(None)),
                })
                .collect();
            self.count_states(condition, &states);
        }
    }

    /// Count one epoch's state sequence; `None` entries take part in no
    /// pair but still occupy a position.
    fn count_states(&mut self, condition: usize, states: &[Option<usize>]) {
        let n_steps = self.n_steps();
        for (i, &b) in states.iter().enumerate() {
            let Some(b) = b else { continue };
            self.occurrences[[condition, b]] += 1.0;
            for lag in 1..=n_steps.min(i) {
                if let Some(a) = states[i - lag] {
                    self.transitions[[condition, lag - 1, a, b]] += 1.0;
                }
            }
        }
    }

    /// Add `other` into `self` (group totals across subjects).
    pub fn merge(&mut self, other: &Self) -> Result<(), FitError> {
        if self.transitions.dim() != other.transitions.dim() {
            return Err(FitError::InvalidParameter(format!(
                "cannot merge Markov counts of shape {:?} into {:?}",
                other.transitions.dim(),
                self.transitions.dim()
            )));
        }
        self.transitions += &other.transitions;
        self.occurrences += &other.occurrences;
        Ok(())
    }

    pub fn tables(&self) -> MarkovTables {
        MarkovTables::from_counts(self)
    }
}

/// Probability tables, each `[C, N, K+1, K+1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkovTables {
    pub observed_joint: Array4<f64>,
    pub expected_joint: Array4<f64>,
    /// Row-normalised counts; rows of states that never occur are zero.
    pub observed_transition: Array4<f64>,
    pub expected_transition: Array4<f64>,
}

impl MarkovTables {
    pub fn from_counts(counts: &MarkovCounts) -> Self {
        let dim = counts.transitions.dim();
        let (n_cond, n_steps, n_states, _) = dim;
        let mut observed_joint = Array4::zeros(dim);
        let mut expected_joint = Array4::zeros(dim);
        let mut observed_transition = Array4::zeros(dim);
        let mut expected_transition = Array4::zeros(dim);

        for c in 0..n_cond {
            let occ = counts.occurrences.row(c);
            let n_occ = occ.sum();
            let p: Vec<f64> = occ.iter().map(|&o| if n_occ > 0.0 { o / n_occ } else { 0.0 }).collect();
            let sum_p2: f64 = p.iter().map(|v| v * v).sum();

            for step in 0..n_steps {
                let obs = counts.transitions.slice(s![c, step, .., ..]);
                let total = obs.sum();

                for a in 0..n_states {
                    let row_total: f64 = obs.row(a).sum();
                    for b in 0..n_states {
                        let n_ab = obs[[a, b]];
                        if total > 0.0 {
                            observed_joint[[c, step, a, b]] = n_ab / total;
                        }
                        if row_total > 0.0 {
                            observed_transition[[c, step, a, b]] = n_ab / row_total;
                        }

                        let (joint, trans) = if step == 0 {
                            if a == b {
                                (0.0, 0.0)
                            } else {
                                (
                                    if sum_p2 < 1.0 { p[a] * p[b] / (1.0 - sum_p2) } else { 0.0 },
                                    if p[a] > 0.0 && p[a] < 1.0 { p[b] / (1.0 - p[a]) } else { 0.0 },
                                )
                            }
                        } else {
                            (p[a] * p[b], if p[a] > 0.0 { p[b] } else { 0.0 })
                        };
                        expected_joint[[c, step, a, b]] = joint;
                        expected_transition[[c, step, a, b]] = trans;
                    }
                }
            }
        }

        Self { observed_joint, expected_joint, observed_transition, expected_transition }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn counts_from(seq: &[Label], n_maps: usize, n_steps: usize, undefined: bool) -> MarkovCounts {
        let mut m = MarkovCounts::new(1, n_steps, n_maps, undefined);
        let states: Vec<Option<usize>> = seq
            .iter()
            .map(|&l| (l.is_some() || undefined).then(|| m.state(l)))
            .collect();
        m.count_states(0, &states);
        m
    }

    #[test]
    fn lag_one_and_two_counts() {
        let m = counts_from(&[Some(0), Some(1), Some(0), Some(2)], 3, 2, false);
        assert_eq!(m.transitions[[0, 0, 0, 1]], 1.0);
        assert_eq!(m.transitions[[0, 0, 1, 0]], 1.0);
        assert_eq!(m.transitions[[0, 0, 0, 2]], 1.0);
        assert_eq!(m.transitions[[0, 1, 0, 0]], 1.0);
        assert_eq!(m.transitions[[0, 1, 1, 2]], 1.0);
        assert_eq!(m.transitions.slice(s![0, 0, .., ..]).sum(), 3.0);
        assert_eq!(m.transitions.slice(s![0, 1, .., ..]).sum(), 2.0);
    }

    #[test]
    fn undefined_breaks_pairs_unless_enabled() {
        let seq = [Some(0), None, Some(1)];
        let m = counts_from(&seq, 2, 2, false);
        assert_eq!(m.transitions.slice(s![0, 0, .., ..]).sum(), 0.0);
        assert_eq!(m.transitions[[0, 1, 0, 1]], 1.0);

        let m = counts_from(&seq, 2, 1, true);
        assert_eq!(m.transitions[[0, 0, 0, 2]], 1.0);
        assert_eq!(m.transitions[[0, 0, 2, 1]], 1.0);
    }

    #[test]
    fn rows_are_normalised() {
        let seq: Vec<Label> = [0, 1, 2, 0, 2, 1, 0, 1, 0, 2].iter().map(|&k| Some(k)).collect();
        let t = counts_from(&seq, 3, 3, false).tables();
        for step in 0..3 {
            for a in 0..4 {
                let row: f64 = t.observed_transition.slice(s![0, step, a, ..]).sum();
                assert!(row == 0.0 || (row - 1.0).abs() < 1e-12, "step {step} row {a}: {row}");
            }
            assert_abs_diff_eq!(t.observed_joint.slice(s![0, step, .., ..]).sum(), 1.0, epsilon = 1e-12);
        }
        // Undefined never occurs: its row is zero.
        assert_eq!(t.observed_transition.slice(s![0, 0, 3, ..]).sum(), 0.0);
    }

    #[test]
    fn expected_tables_exclude_self_at_lag_one() {
        let seq: Vec<Label> = [0, 1, 0, 1, 2, 0].iter().map(|&k| Some(k)).collect();
        let t = counts_from(&seq, 3, 2, false).tables();
        // p = (3/6, 2/6, 1/6)
        for a in 0..3 {
            assert_eq!(t.expected_joint[[0, 0, a, a]], 0.0);
            assert_eq!(t.expected_transition[[0, 0, a, a]], 0.0);
            assert_abs_diff_eq!(t.expected_transition.slice(s![0, 0, a, ..]).sum(), 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(t.expected_transition.slice(s![0, 1, a, ..]).sum(), 1.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(t.expected_joint.slice(s![0, 0, .., ..]).sum(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(t.expected_joint.slice(s![0, 1, .., ..]).sum(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(t.expected_joint[[0, 1, 0, 0]], 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(t.expected_transition[[0, 0, 0, 1]], (2.0 / 6.0) / 0.5, epsilon = 1e-12);
    }

    #[test]
    fn merge_sums_and_checks_shape() {
        let seq: Vec<Label> = vec![Some(0), Some(1), Some(0)];
        let mut a = counts_from(&seq, 2, 1, false);
        let b = counts_from(&seq, 2, 1, false);
        a.merge(&b).unwrap();
        assert_eq!(a.transitions[[0, 0, 0, 1]], 2.0);
        assert_eq!(a.occurrences[[0, 0]], 4.0);

        let other = MarkovCounts::new(1, 2, 2, false);
        assert!(a.merge(&other).is_err());
    }
}
