use thiserror::Error;

/// Failures scoped to one camera session. None of them are fatal; toggling the
/// camera again starts from a clean state.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("camera stream ended unexpectedly")]
    CaptureEnded,
    #[error("pose analysis is unavailable after a worker failure")]
    AnalysisUnavailable,
    #[error("unsupported feedback endpoint {0}")]
    InvalidEndpoint(String),
    #[error("feedback channel failed: {0}")]
    Channel(String),
}

#[derive(Debug, Error)]
#[error("unknown activity `{0}`")]
pub struct ActivityParseError(pub String);
