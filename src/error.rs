//! Failure reasons and non-fatal warnings.
//!
//! Configuration problems are detected before any stage runs and reported
//! as a [`FitError`].  Conditions that still leave a consistent result
//! (a rejection loop hitting its cap, smoothing not settling) are returned
//! alongside the result as [`FitWarning`]s.
use thiserror::Error;

/// Why a fitting call refused to produce output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("template set is empty")]
    EmptyTemplateSet,

    #[error("recording '{0}' has no samples")]
    EmptyRecording(String),

    #[error("recording '{name}' has {data} values per sample, templates have {templates}")]
    ChannelMismatch { name: String, data: usize, templates: usize },

    #[error("recording '{name}' and the template set use different atom types")]
    AtomMismatch { name: String },

    #[error("recording '{name}' has {gfp} GFP values for {samples} samples")]
    GfpLength { name: String, gfp: usize, samples: usize },

    #[error("epoch [{from}, {to}] is empty or outside [0, {n_times})")]
    InvalidEpoch { from: usize, to: usize, n_times: usize },

    #[error("epochs [{a_from}, {a_to}] and [{b_from}, {b_to}] overlap")]
    OverlappingEpochs { a_from: usize, a_to: usize, b_from: usize, b_to: usize },

    #[error("template index {index} out of range (K = {n_maps})")]
    InvalidTemplateIndex { index: usize, n_maps: usize },

    #[error("bad interval [{from}, {to}] is reversed")]
    InvalidInterval { from: usize, to: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("subject '{subject}' has {got} conditions, expected {expected}")]
    ConditionCountMismatch { subject: String, got: usize, expected: usize },

    #[error("processing cancelled")]
    Cancelled,
}

/// A condition worth reporting that did not prevent a result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitWarning {
    /// The small-segment work-list hit its iteration cap; `remaining`
    /// short segments were left in place.
    #[error("{file}: segment rejection stopped after {iterations} iterations with {remaining} short segments left")]
    RejectionNotConverged { file: String, iterations: usize, remaining: usize },
    /// The smoother stopped at its iteration cap before `σ²` settled.
    #[error("{file}: smoothing did not converge in {iterations} iterations")]
    SmoothingNotConverged { file: String, iterations: usize },
}
