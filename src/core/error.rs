use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Change feed failed: {0}")]
    FeedFailed(String),

    #[error("Change feed terminated")]
    FeedTerminated,

    #[error("Bucket insertion failed: {0}")]
    BucketInsert(String),

    #[error("Audit sink write failed: {0}")]
    SinkWrite(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PipelineError {
    /// Errors that stop the listener loop. Everything else is logged and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FeedFailed(_) | Self::FeedTerminated)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl<T> From<std::sync::PoisonError<T>> for PipelineError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(PipelineError::FeedTerminated.is_fatal());
        assert!(PipelineError::FeedFailed("socket closed".into()).is_fatal());
        assert!(!PipelineError::SinkWrite("disk full".into()).is_fatal());
        assert!(!PipelineError::BucketInsert("full".into()).is_fatal());
    }

    #[test]
    fn test_poison_error_maps_to_lock_error() {
        let lock = std::sync::Arc::new(std::sync::Mutex::new(0));
        let poisoned = lock.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoned.lock().unwrap();
            panic!("poison");
        })
        .join();

        let err: PipelineError = lock.lock().unwrap_err().into();
        assert!(matches!(err, PipelineError::LockError(_)));
    }
}
