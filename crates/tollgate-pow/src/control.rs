//! Cooperative cancellation and progress reporting for long-running loops.
//!
//! Every hot loop (chain, leaves, Merkle folding, hashcash attempts, openings,
//! MHG pages) calls [`Control::tick`] once per iteration. The cancellation
//! token is checked on every call; progress is emitted only on the configured
//! cadence.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tollgate_types::progress::{Phase, Progress};
use tollgate_types::DEFAULT_YIELD_EVERY;

use crate::{PowError, Result};

/// Receiver of advisory progress events.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: Progress);
}

impl<F> ProgressSink for F
where
    F: Fn(Progress) + Send + Sync,
{
    fn report(&self, progress: Progress) {
        self(progress)
    }
}

/// Per-computation cancellation token, progress sink and reporting cadence.
#[derive(Clone)]
pub struct Control {
    cancel: CancellationToken,
    sink: Option<Arc<dyn ProgressSink>>,
    yield_every: u32,
    progress_every: u32,
}

impl Control {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            sink: None,
            yield_every: DEFAULT_YIELD_EVERY,
            progress_every: DEFAULT_YIELD_EVERY,
        }
    }

    /// A control that is never cancelled and reports nowhere.
    pub fn detached() -> Self {
        Self::new(CancellationToken::new())
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set the reporting cadence. Zero is treated as one.
    pub fn with_cadence(mut self, yield_every: u32, progress_every: u32) -> Self {
        self.yield_every = yield_every.max(1);
        self.progress_every = progress_every.max(1);
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail with [`PowError::Aborted`] if cancellation was requested.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PowError::Aborted);
        }
        Ok(())
    }

    /// Checkpoint, then report `done` if it falls on both the yield and the
    /// progress cadence.
    pub fn tick(&self, phase: Phase, done: u32, total: u32, attempt: u32) -> Result<()> {
        self.checkpoint()?;
        if done % self.yield_every == 0 && done % self.progress_every == 0 {
            self.emit(Progress::new(phase, done, total, attempt));
        }
        Ok(())
    }

    /// Report unconditionally.
    pub fn emit(&self, progress: Progress) {
        if let Some(sink) = &self.sink {
            sink.report(progress);
        }
    }
}

impl fmt::Debug for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Control")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("has_sink", &self.sink.is_some())
            .field("yield_every", &self.yield_every)
            .field("progress_every", &self.progress_every)
            .finish()
    }
}
