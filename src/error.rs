/// Errors surfaced by the recommendation engine.
///
/// `NotFound` and `Malformed` are absorbed inside the engine as expected
/// data sparsity. They are built where the absence or bad record is seen
/// and logged there; no engine operation returns them.
#[derive(thiserror::Error, Debug)]
pub enum RecError {
    #[error("No authenticated user for this request")]
    Unauthenticated,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Malformed data: {0}")]
    Malformed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl RecError {
    pub fn upstream(context: &str, err: impl std::fmt::Display) -> Self {
        RecError::UpstreamUnavailable(format!("{}: {}", context, err))
    }

    pub fn timed_out(context: &str) -> Self {
        RecError::UpstreamUnavailable(format!("{}: timed out", context))
    }
}

pub type RecResult<T> = Result<T, RecError>;
