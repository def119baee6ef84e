/// Error type for work executed by the engine.
///
/// Clone so that a memoized failure can be handed to every observer of a
/// [`Handle`](crate::Handle).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Task failed: {0}")]
    TaskFailed(String),
    #[error("Task panicked: {0}")]
    Panicked(String),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
    #[error("Result already taken from handle")]
    Consumed,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Worker pool error: {0}")]
    Pool(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::TaskFailed(msg.into())
    }

    pub(crate) fn poisoned<E: std::fmt::Display>(what: &str, err: E) -> Self {
        Self::LockPoisoned(format!("{}: {}", what, err))
    }
}
