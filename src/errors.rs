use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid asset request: {0}")]
    InvalidRequest(String),

    #[error("image provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("storage upload failed ({status}): {body}")]
    Upload { status: u16, body: String },

    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },

    #[error("image encoding failed: {0}")]
    Encode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Other(String),
}

impl PipelineError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(value: anyhow::Error) -> Self {
        Self::InvalidConfig(format!("{value:#}"))
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Other(format!("blocking task failed: {value}"))
    }
}

/// Failure of a single generation shot. Non-fatal while another shot can
/// still succeed.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{backend} returned status {status}: {body}")]
    Status {
        backend: String,
        status: u16,
        body: String,
    },

    #[error("{backend} response missing field: {field}")]
    MissingField {
        backend: String,
        field: &'static str,
    },

    #[error("{backend} image decode failed: {detail}")]
    Decode { backend: String, detail: String },

    #[error("{backend} request timed out after {seconds}s")]
    Timeout { backend: String, seconds: u64 },

    #[error("{backend} request failed: {source}")]
    Transport {
        backend: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ProviderError {
    pub fn decode(backend: &str, detail: impl Into<String>) -> Self {
        Self::Decode {
            backend: backend.to_string(),
            detail: detail.into(),
        }
    }

    pub fn missing_field(backend: &str, field: &'static str) -> Self {
        Self::MissingField {
            backend: backend.to_string(),
            field,
        }
    }

    /// Upstream HTTP status, when the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
