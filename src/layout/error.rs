/// The [`LayoutError`] result type.
pub type LayoutResult<T> = Result<T, LayoutError>;

/// Outcomes that abort a layout pass. The caller discards any in-flight geometry.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// A caller broke an argument contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// An internal invariant was violated; this is a bug in the engine.
    #[error("inconsistent layout state: {0}")]
    Internal(String),
    /// The progress monitor asked the computation to stop.
    #[error("layout cancelled")]
    Cancelled,
}

impl LayoutError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Polled at checkpoints of a long-running layout.
pub trait ProgressMonitor {
    fn keep_going(&self) -> bool;
}

/// Monitor that never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysContinue;

impl ProgressMonitor for AlwaysContinue {
    fn keep_going(&self) -> bool {
        true
    }
}

pub(crate) fn checkpoint(monitor: &dyn ProgressMonitor, stage: &str) -> LayoutResult<()> {
    if monitor.keep_going() {
        Ok(())
    } else {
        tracing::info!(stage, "layout cancelled by monitor");
        Err(LayoutError::Cancelled)
    }
}
