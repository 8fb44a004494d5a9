//! # backfit — template back-fitting and microstate segmentation in pure Rust
//!
//! `backfit` assigns every time sample of a preprocessed EEG recording (or
//! of a source-space reconstruction, three current components per solution
//! point) to one of `K` fixed template maps, cleans the resulting label
//! sequence, cuts it into segments and computes per-label statistics and
//! Markov transition tables.
//!
//! _No Python, no BLAS, no C libraries — pure Rust + [ndarray](https://crates.io/crates/ndarray)._
//!
//! ## Pipeline overview
//!
//! ```text
//! Recording [D, T]  +  TemplateSet [K, D]
//!   │
//!   ├─ correlation            signed correlation of every map × sample → [K, T]
//!   ├─ label                  argmax over eligible maps (or all active), threshold → Undefined
//!   ├─ smooth                 windowed energy minimisation (optional)
//!   ├─ reject                 short segments absorbed by their neighbours (optional)
//!   ├─ mask                   bad intervals → Undefined (optional)
//!   └─ segment                maximal runs per epoch
//!        │                                                   ── phase 1, per file
//!        ├─ stats::GevDenominator   Σ GFP² over every condition of the subject
//!        ├─ stats                   per-label tables (coverage, GEV, durations, …)
//!        └─ markov                  [C, N, K+1, K+1] transition tables
//!                                                            ── phase 2, per subject
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use backfit::{fit_subject, FittingConfig, NoProgress, Subject};
//! use backfit::io::{load_recording, load_templates};
//! use std::path::Path;
//!
//! let templates = load_templates(Path::new("templates.safetensors")).unwrap();
//! let rest = load_recording(Path::new("rest.safetensors"), templates.n_maps()).unwrap();
//! let task = load_recording(Path::new("task.safetensors"), templates.n_maps()).unwrap();
//!
//! let cfg = FittingConfig {
//!     min_correlation: Some(0.5),
//!     reject_size:     3,
//!     markov_steps:    1,
//!     ..FittingConfig::default()
//! };
//! let subject = Subject { name: "s01".into(), conditions: vec![rest, task] };
//! let fit = fit_subject(&subject, &templates, &cfg, &NoProgress).unwrap();
//!
//! for file in &fit.files {
//!     for map in &file.statistics.maps {
//!         println!("{} map {:?}: coverage {:?} %", file.statistics.name, map.label, map.time_coverage);
//!     }
//! }
//! ```
//!
//! ## Running individual steps
//!
//! Each stage is also exposed as a standalone function working on one
//! epoch of a label buffer:
//!
//! ```no_run
//! use backfit::{AtomType, Epoch, PolarityMode, Recording, ScoreTable, TemplateSet};
//! use backfit::{extract_segments, label_competitive, reject_small_segments, NoProgress, RejectionParams};
//! use ndarray::Array2;
//!
//! let templates = TemplateSet::new(Array2::zeros((4, 32)), AtomType::Scalar);
//! let rec = Recording::new("r", Array2::zeros((32, 1000)), 250.0, AtomType::Scalar);
//! let scores = ScoreTable::compute(&rec, &templates);
//!
//! let epoch = Epoch::whole(rec.n_times(), templates.n_maps());
//! let mut labels = vec![None; rec.n_times()];
//! label_competitive(&scores, &epoch, PolarityMode::Evaluate, Some(0.5), &mut labels);
//!
//! let params = RejectionParams { min_size: 3, reject_undefined: false, max_iterations: 10_000 };
//! reject_small_segments(&scores, &epoch, PolarityMode::Evaluate, &params, &mut labels, &NoProgress).unwrap();
//!
//! let segments = extract_segments(&labels, epoch.from, epoch.to);
//! ```

pub mod config;
pub mod correlation;
pub mod error;
pub mod io;
pub mod label;
pub mod markov;
pub mod mask;
pub mod pipeline;
pub mod progress;
pub mod recording;
pub mod reject;
pub mod segment;
pub mod smooth;
pub mod stats;

// ── Crate-root re-exports ─────────────────────────────────────────────────
//
// Everything a downstream user is likely to need is available directly as
// `backfit::Foo` without having to know the internal module layout.

// config
pub use config::{FittingConfig, LabelingMode, PolarityMode};

// correlation
pub use correlation::{correlation, normalize_map, ScoreTable};

// error
pub use error::{FitError, FitWarning};

// label
pub use label::{best_label, label_competitive, label_concurrent, Assignment, Label};

// markov
pub use markov::{MarkovCounts, MarkovTables};

// mask
pub use mask::{bad_sample_mask, mask_bad_intervals, mask_concurrent};

// pipeline — file / subject / group entry points
pub use pipeline::{
    fit_file, fit_subject, fit_subjects,
    FileFit, FittedFile, GroupFit, Subject, SubjectFit,
};

// progress
pub use progress::{CancelFlag, NoProgress, Progress, Stage};

// recording
pub use recording::{compute_gfp, AtomType, Epoch, Interval, Recording, TemplateSet};

// reject
pub use reject::{reject_small_segments, RejectionOutcome, RejectionParams};

// segment
pub use segment::{concurrent_segments, extract_segments, Segment};

// smooth
pub use smooth::{smooth_labels, SmoothingOutcome, SmoothingParams};

// stats
pub use stats::{
    duration_histogram, file_statistics, geometric_mean,
    FileStatistics, GevDenominator, LabelStats, TimeUnit, Variable,
};
