//! Progress reporting and cooperative cancellation.
//!
//! The pipeline calls [`Progress::report`] at coarse milestones and polls
//! [`Progress::is_cancelled`] inside its long loops.  Both have no-op
//! defaults, so `&NoProgress` or a plain closure is enough.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Pipeline milestone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Starting subject `index` (0-based) of a batch; always 0 from
    /// [`fit_subject`](crate::fit_subject).
    Subject { index: usize, name: String },
    Labeling { file: String },
    Smoothing { file: String },
    Rejection { file: String },
    Masking { file: String },
    Statistics { file: String },
    Markov,
}

/// Receiver for milestones and source of the cancellation flag.
pub trait Progress {
    fn report(&self, _stage: Stage) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Reports nothing, never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {}

impl<F: Fn(Stage)> Progress for F {
    fn report(&self, stage: Stage) {
        self(stage);
    }
}

/// Shared cancellation flag.  Clone it, hand one copy to the pipeline and
/// call [`CancelFlag::cancel`] on another.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl Progress for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
