/// Shared helpers: synthetic recordings with exactly known correlations.
///
/// Templates are rows 1..=K of the 8 × 8 Hadamard matrix.  Those rows are
/// zero-mean and mutually orthogonal, so a sample built as
/// `s·e_k + sqrt(1 − s²)·e_7` correlates `s` with template `k` and `0`
/// with every other template.
use backfit::{AtomType, Recording, TemplateSet};
use ndarray::{Array1, Array2};

pub const N_CHANNELS: usize = 8;
/// Hadamard row kept out of every template set.
const SPARE_ROW: usize = 7;

/// Unit-norm Hadamard row `i`.
pub fn hadamard_row(i: usize) -> Array1<f32> {
    let norm = (N_CHANNELS as f32).sqrt();
    (0..N_CHANNELS)
        .map(|j| if (i & j).count_ones() % 2 == 0 { 1.0 / norm } else { -1.0 / norm })
        .collect()
}

/// `k` scalar templates (`k <= 6`).
pub fn templates(k: usize) -> TemplateSet {
    assert!(k < SPARE_ROW);
    let mut maps = Array2::zeros((k, N_CHANNELS));
    for i in 0..k {
        maps.row_mut(i).assign(&hadamard_row(i + 1));
    }
    TemplateSet::new(maps, AtomType::Scalar)
}

/// One sample with correlation `s` to template `k` (0 to the others),
/// scaled by `amplitude`.  `None` correlates 0 with every template.
pub fn sample(k: Option<usize>, s: f64, amplitude: f32) -> Array1<f32> {
    let spare = hadamard_row(SPARE_ROW);
    let x = match k {
        Some(k) => {
            let c = (1.0 - s * s).max(0.0).sqrt() as f32;
            hadamard_row(k + 1) * s as f32 + &spare * c
        }
        None => spare,
    };
    x * amplitude
}

/// A run of `len` samples of [`sample`].
#[derive(Debug, Clone, Copy)]
pub struct Run {
    pub map: Option<usize>,
    pub score: f64,
    pub len: usize,
}

#[allow(unused)]
pub fn run(map: usize, score: f64, len: usize) -> Run {
    Run { map: Some(map), score, len }
}

/// Concatenate runs into a recording with unit amplitude.
#[allow(unused)]
pub fn recording(name: &str, runs: &[Run], sfreq: f64) -> Recording {
    let amplitudes: Vec<f32> = vec![1.0; runs.iter().map(|r| r.len).sum()];
    recording_with_amplitude(name, runs, &amplitudes, sfreq)
}

/// Concatenate runs, scaling sample `t` by `amplitudes[t]`.
pub fn recording_with_amplitude(name: &str, runs: &[Run], amplitudes: &[f32], sfreq: f64) -> Recording {
    let n_times: usize = runs.iter().map(|r| r.len).sum();
    assert_eq!(amplitudes.len(), n_times);
    let mut data = Array2::zeros((N_CHANNELS, n_times));
    let mut t = 0;
    for r in runs {
        for _ in 0..r.len {
            data.column_mut(t).assign(&sample(r.map, r.score, amplitudes[t]));
            t += 1;
        }
    }
    Recording::new(name, data, sfreq, AtomType::Scalar)
}

/// Labels of a competitive fit.
#[allow(unused)]
pub fn labels_of(file: &backfit::FittedFile) -> Vec<Option<usize>> {
    file.labels().expect("competitive fit").to_vec()
}
