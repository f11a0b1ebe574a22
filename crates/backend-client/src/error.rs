use thiserror::Error;

/// Everything that can go wrong talking to the analytics backend.
///
/// Downstream consumers only ever see the rendered message; the variants exist
/// for logging and metrics labels.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("backend responded with HTTP {status} for {endpoint}")]
    Http { endpoint: &'static str, status: u16 },
    #[error("malformed backend payload: {0}")]
    Malformed(String),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl PollError {
    /// Stable label used for the `outcome` metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            PollError::Unreachable(_) => "unreachable",
            PollError::Http { .. } => "http",
            PollError::Malformed(_) => "malformed",
            PollError::Client(_) => "client",
        }
    }

    /// Human readable message handed to the store on failure.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl From<reqwest::Error> for PollError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PollError::Malformed(err.to_string())
        } else {
            PollError::Unreachable(err.to_string())
        }
    }
}
