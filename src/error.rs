use std::time::Duration;

/// Failure talking to the code-generation model.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("GOOGLE_API_KEY is not set")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model rejected the request ({status}): {message}")]
    BadRequest { status: u16, message: String },
    #[error("API key is invalid or lacks access ({status})")]
    Unauthorized { status: u16 },
    #[error("quota or rate limit exceeded. Try again later.")]
    Quota,
    #[error("model server error ({0}). The API may be temporarily unavailable.")]
    Server(u16),
    #[error("unexpected response status {0}")]
    Status(u16),
    #[error("malformed stream payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("model returned an error: {0}")]
    Model(String),
}

impl GenerateError {
    /// Map a non-success HTTP status to an error. `body` is the response text,
    /// used only where the API puts a useful message in it.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            400 | 404 => Self::BadRequest {
                status,
                message: body.trim().to_string(),
            },
            401 | 403 => Self::Unauthorized { status },
            429 => Self::Quota,
            s if s >= 500 => Self::Server(s),
            s => Self::Status(s),
        }
    }
}

/// Failure preparing, running or collecting a generated script.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("failed to create scratch directory: {0}")]
    TempDir(#[source] std::io::Error),
    #[error("failed to create media directory: {0}")]
    MediaDir(#[source] std::io::Error),
    #[error("failed to write script: {0}")]
    WriteScript(#[source] std::io::Error),
    #[error("failed to start interpreter '{interpreter}': {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for interpreter: {0}")]
    Wait(#[source] std::io::Error),
    #[error("timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            GenerateError::from_status(401, ""),
            GenerateError::Unauthorized { status: 401 }
        ));
        assert!(matches!(
            GenerateError::from_status(403, ""),
            GenerateError::Unauthorized { status: 403 }
        ));
        assert!(matches!(
            GenerateError::from_status(429, ""),
            GenerateError::Quota
        ));
        assert!(matches!(
            GenerateError::from_status(503, ""),
            GenerateError::Server(503)
        ));
        assert!(matches!(
            GenerateError::from_status(418, ""),
            GenerateError::Status(418)
        ));
    }

    #[test]
    fn bad_request_keeps_body() {
        let err = GenerateError::from_status(400, "  API key not valid  ");
        assert_eq!(
            err.to_string(),
            "model rejected the request (400): API key not valid"
        );
    }

    #[test]
    fn timeout_message_names_seconds() {
        let err = ExecuteError::Timeout(Duration::from_secs(120));
        assert_eq!(err.to_string(), "timed out after 120 seconds");
    }
}
