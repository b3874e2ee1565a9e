use thiserror::Error;

#[derive(Error, Debug)]
pub enum PilothouseError {
    #[error("Browser not found. Install Chrome, Chromium, Brave, or Edge.")]
    BrowserNotFound,

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("CDP connection failed: {0}")]
    CdpConnectionFailed(String),

    #[error("CDP error: {0}")]
    CdpError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No active {0}")]
    NoActiveResource(&'static str),

    #[error("Index {index} out of range (have {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("JavaScript execution failed: {0}")]
    JavaScriptError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PilothouseError>;
