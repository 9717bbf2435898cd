use thiserror::Error;

/// Failure of a single weather lookup. Never retried by the aggregator.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {provider} failed: {source}")]
    Network {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} request failed with status {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("failed to decode {provider} response: {source}")]
    Decoding {
        provider: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Coarse classification exposed to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    NetworkFailed,
    DecodingFailed,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Network { .. } | FetchError::Status { .. } => FetchErrorKind::NetworkFailed,
            FetchError::Decoding { .. } => FetchErrorKind::DecodingFailed,
        }
    }
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchErrorKind::NetworkFailed => f.write_str("network failed"),
            FetchErrorKind::DecodingFailed => f.write_str("decoding failed"),
        }
    }
}
