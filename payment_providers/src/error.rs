use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("The request to the provider timed out")]
    Timeout,
    #[error("Could not reach the provider: {0}")]
    Transport(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Request rejected by provider. Error {status}. {message}")]
    Rejected { status: u16, message: String },
}

impl From<reqwest::Error> for ProviderApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::JsonError(e.to_string())
        } else {
            // reqwest errors include the URL, never the auth headers
            Self::Transport(e.to_string())
        }
    }
}
