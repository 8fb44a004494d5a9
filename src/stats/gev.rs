//! Shared GEV denominator.
//!
//! GEV is normalised by the total power of every labeled sample of a
//! subject, across all of its conditions.  The denominator is therefore
//! gathered in a first pass over all fitted files of the subject, and only
//! then are per-label GEV values computed.
use crate::pipeline::FittedFile;

/// Σ GFP² over labeled samples of one statistical unit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GevDenominator {
    total_power: f64,
}

impl GevDenominator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Denominator of a whole subject.
    pub fn from_files<'a>(files: impl IntoIterator<Item = &'a FittedFile>) -> Self {
        let mut d = Self::new();
        for f in files {
            d.accumulate(f);
        }
        d
    }

    pub fn accumulate(&mut self, file: &FittedFile) {
        self.total_power += file
            .labeled_mask()
            .iter()
            .enumerate()
            .filter(|(_, &l)| l)
            .map(|(t, _)| (file.gfp[t] as f64).powi(2))
            .sum::<f64>();
    }

    pub fn total_power(&self) -> f64 {
        self.total_power
    }

    /// `numerator / total`, missing when there is no labeled power.
    pub fn ratio(&self, numerator: f64) -> Option<f64> {
        (self.total_power > 0.0).then(|| numerator / self.total_power)
    }
}
