//! Fitting configuration.
//!
//! [`FittingConfig`] holds every tunable parameter of the back-fitting
//! pipeline.  The defaults describe a plain competitive fit: polarity
//! ignored, no threshold, no smoothing, no rejection, no Markov tables.
use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// How the sign of a correlation is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolarityMode {
    /// Use the signed correlation.  An inverted map is a bad match.
    Direct,
    /// Use `|r|`.  A map and its inversion are equally good matches
    /// (spontaneous EEG).
    Evaluate,
}

impl PolarityMode {
    /// Apply the polarity rule to a signed correlation.
    #[inline]
    pub fn adjust(self, r: f64) -> f64 {
        match self {
            Self::Direct => r,
            Self::Evaluate => r.abs(),
        }
    }
}

/// Whether samples are assigned exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelingMode {
    /// Winner-take-all: one template (or Undefined) per sample.
    Competitive,
    /// Every eligible template is evaluated on every sample.
    NonCompetitive,
}

/// Configuration for the full back-fitting pipeline.
///
/// All fields are `pub` so you can construct one with struct-update syntax:
///
/// ```
/// use backfit::FittingConfig;
///
/// let cfg = FittingConfig {
///     min_correlation:       Some(0.5),
///     smoothing_half_window: 3,
///     smoothing_strength:    10.0,
///     reject_size:           3,
///     ..FittingConfig::default()
/// };
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FittingConfig {
    /// Polarity rule applied to every correlation.
    ///
    /// Default: [`PolarityMode::Evaluate`].
    pub polarity: PolarityMode,

    /// Competitive (exclusive) or non-competitive labeling.
    ///
    /// In non-competitive mode smoothing, rejection and Markov modeling
    /// are skipped, and each template gets one segment per epoch.
    ///
    /// Default: [`LabelingMode::Competitive`].
    pub mode: LabelingMode,

    /// Minimum adjusted correlation for a sample to be labeled.
    ///
    /// Must lie in `[-1, 1]`.  Default: `None` (every sample is labeled).
    pub min_correlation: Option<f64>,

    /// Smoothing half-window `W` in samples.  `0` disables smoothing.
    ///
    /// Default: `0`.
    pub smoothing_half_window: usize,

    /// Smoothing strength `λ`.  Values `<= 0` disable smoothing.
    ///
    /// Default: `10.0`.
    pub smoothing_strength: f64,

    /// Iteration cap for the smoother.
    ///
    /// Default: `100`.
    pub smoothing_max_iterations: usize,

    /// Relative change of the residual variance below which smoothing
    /// is considered converged.
    ///
    /// Default: `1e-6`.
    pub smoothing_tolerance: f64,

    /// Segments shorter than this many samples are absorbed by their
    /// neighbours.  `0` or `1` disables rejection.
    ///
    /// Default: `0`.
    pub reject_size: usize,

    /// Also absorb short Undefined segments.
    ///
    /// Default: `false` (Undefined runs of any length are kept).
    pub reject_undefined: bool,

    /// Iteration cap for the rejection work-list.
    ///
    /// Default: `100_000`.
    pub reject_max_iterations: usize,

    /// Bad-interval policy.  `None` ignores bad markers entirely.
    ///
    /// `Some(t)` masks every bad sample, and drops a whole segment to
    /// Undefined when more than the fraction `t` of it overlaps bad
    /// intervals.  `Some(1.0)` masks only the bad samples themselves.
    ///
    /// Default: `None`.
    pub bad_interval_tolerance: Option<f64>,

    /// Number of step-ahead lags for Markov tables.  `0` disables them.
    ///
    /// Default: `0`.
    pub markov_steps: usize,

    /// Count transitions from and to Undefined segments.
    ///
    /// Default: `false`.
    pub markov_undefined: bool,

    /// Largest segment length (in samples) with its own histogram bin;
    /// longer segments land in the last bin.  `0` disables histograms.
    ///
    /// Default: `0`.
    pub histogram_max: usize,
}

impl Default for FittingConfig {
    fn default() -> Self {
        Self {
            polarity: PolarityMode::Evaluate,
            mode: LabelingMode::Competitive,
            min_correlation: None,
            smoothing_half_window: 0,
            smoothing_strength: 10.0,
            smoothing_max_iterations: 100,
            smoothing_tolerance: 1e-6,
            reject_size: 0,
            reject_undefined: false,
            reject_max_iterations: 100_000,
            bad_interval_tolerance: None,
            markov_steps: 0,
            markov_undefined: false,
            histogram_max: 0,
        }
    }
}

impl FittingConfig {
    /// Check parameter ranges.  Called by every pipeline entry point.
    pub fn validate(&self) -> Result<(), FitError> {
        if let Some(t) = self.min_correlation {
            if !(-1.0..=1.0).contains(&t) {
                return Err(FitError::InvalidParameter(format!(
                    "min_correlation {t} outside [-1, 1]"
                )));
            }
        }
        if !self.smoothing_strength.is_finite() {
            return Err(FitError::InvalidParameter("smoothing_strength is not finite".into()));
        }
        if !(self.smoothing_tolerance >= 0.0) {
            return Err(FitError::InvalidParameter(format!(
                "smoothing_tolerance {} must be >= 0",
                self.smoothing_tolerance
            )));
        }
        if let Some(t) = self.bad_interval_tolerance {
            if !(0.0..=1.0).contains(&t) {
                return Err(FitError::InvalidParameter(format!(
                    "bad_interval_tolerance {t} outside [0, 1]"
                )));
            }
        }
        Ok(())
    }

    /// `true` when the smoother has any effect.
    pub fn smoothing_enabled(&self) -> bool {
        self.mode == LabelingMode::Competitive
            && self.smoothing_half_window > 0
            && self.smoothing_strength > 0.0
    }

    /// `true` when small-segment rejection has any effect.
    pub fn rejection_enabled(&self) -> bool {
        self.mode == LabelingMode::Competitive && self.reject_size > 1
    }

    /// `true` when Markov tables are computed.
    pub fn markov_enabled(&self) -> bool {
        self.mode == LabelingMode::Competitive && self.markov_steps > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid_and_plain() {
        let cfg = FittingConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(!cfg.smoothing_enabled());
        assert!(!cfg.rejection_enabled());
        assert!(!cfg.markov_enabled());
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let cfg = FittingConfig { min_correlation: Some(1.5), ..FittingConfig::default() };
        assert!(matches!(cfg.validate(), Err(FitError::InvalidParameter(_))));
    }

    #[test]
    fn non_competitive_disables_sequence_stages() {
        let cfg = FittingConfig {
            mode: LabelingMode::NonCompetitive,
            smoothing_half_window: 3,
            reject_size: 4,
            markov_steps: 2,
            ..FittingConfig::default()
        };
        assert!(!cfg.smoothing_enabled());
        assert!(!cfg.rejection_enabled());
        assert!(!cfg.markov_enabled());
    }

    #[test]
    fn polarity_adjust() {
        assert_eq!(PolarityMode::Direct.adjust(-0.4), -0.4);
        assert_eq!(PolarityMode::Evaluate.adjust(-0.4), 0.4);
    }

    #[test]
    fn config_loads_from_partial_json() {
        let cfg: FittingConfig =
            serde_json::from_str(r#"{ "polarity": "direct", "markov_steps": 3 }"#).unwrap();
        assert_eq!(cfg.polarity, PolarityMode::Direct);
        assert_eq!(cfg.markov_steps, 3);
        assert_eq!(cfg.reject_max_iterations, 100_000);
    }
}
