//! Error helpers.

use std::fmt;

use worker::Response;

/// Error helper type.
#[derive(Debug)]
pub enum CmError {
    /// [`worker::Error`]
    WorkerError(worker::Error),
    /// Requested entity does not exist.
    NotFound(String),
    /// Caller sent an invalid request.
    BadRequest(String),
    /// Non-retryable, non-success response while fetching a match's detail.
    Upstream {
        /// Match being fetched.
        match_id: String,
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },
    /// Riot API request got no usable response (connection failure, timeout, bad body).
    Transport(String),
    /// Generic internal server error.
    InternalServerError(String),
}
impl CmError {
    /// HTTP status code for responding with this error.
    pub fn status_code(&self) -> u16 {
        match self {
            CmError::NotFound(_) => 404,
            CmError::BadRequest(_) => 400,
            CmError::Upstream { .. } | CmError::Transport(_) => 502,
            CmError::WorkerError(_) | CmError::InternalServerError(_) => 500,
        }
    }

    /// Converts into a JSON `{"error": ...}` response.
    pub fn into_response(self) -> worker::Result<Response> {
        let status = self.status_code();
        if 500 <= status {
            log::error!("Responding with error: {}", self);
        }
        Ok(Response::from_json(&serde_json::json!({ "error": self.to_string() }))?
            .with_status(status))
    }
}
impl fmt::Display for CmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmError::WorkerError(e) => write!(f, "Worker error: {}", e),
            CmError::NotFound(msg) | CmError::BadRequest(msg) => f.write_str(msg),
            CmError::Upstream {
                match_id,
                status,
                body,
            } => write!(f, "Fetch match {} failed {}: {}", match_id, status, body),
            CmError::Transport(msg) => write!(f, "Riot API request failed: {}", msg),
            CmError::InternalServerError(msg) => f.write_str(msg),
        }
    }
}
impl std::error::Error for CmError {}
impl From<worker::Error> for CmError {
    fn from(value: worker::Error) -> Self {
        Self::WorkerError(value)
    }
}
impl From<CmError> for worker::Error {
    fn from(value: CmError) -> Self {
        match value {
            CmError::WorkerError(e) => e,
            other => worker::Error::RustError(other.to_string()),
        }
    }
}
