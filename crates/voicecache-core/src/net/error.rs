use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Unsupported method: {0}")]
    InvalidMethod(String),

    #[error("Fetch failed: {0}")]
    Failed(String),
}

impl FetchError {
    /// Split timeouts out of generic transport errors.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            let url = err
                .url()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "unknown url".to_string());
            FetchError::Timeout(url)
        } else {
            FetchError::Network(err)
        }
    }
}
