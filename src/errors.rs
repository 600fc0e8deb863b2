use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation attempted before `connect()`.
    #[error("Not connected to the target application")]
    NotConnected,

    /// Locator resolution exhausted all tiers, or a wait timed out.
    #[error("Element not found after {elapsed_ms}ms")]
    NotFound { elapsed_ms: u64 },

    /// No adapter could service the requested action.
    #[error("No automation backend available: {0}")]
    BackendUnavailable(String),

    /// External-process call unanswered within the bridge timeout.
    #[error("Bridge call #{id} ({method}) timed out")]
    BridgeTimeout { id: u64, method: String },

    /// Vision-model HTTP call failed or returned unusable content.
    #[error("Vision provider error: {0}")]
    Provider(String),

    /// Structured response could not be decoded by any parse strategy.
    #[error("Response parse failure: {0}")]
    ParseFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

pub type ProbeResult<T> = Result<T, ProbeError>;
