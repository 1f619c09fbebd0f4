use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Insufficient balance for {address}: has {balance} {voucher}, requested {requested}")]
    InsufficientBalance {
        address: String,
        voucher: String,
        balance: u64,
        requested: u64,
    },
    #[error("Malformed record at key {key}: {reason}")]
    MalformedRecord { key: String, reason: String },
    #[error("Short random read: expected {expected} bytes, got {actual}")]
    ShortRandomRead { expected: usize, actual: usize },
    #[error("Store error: {0}")]
    Store(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("No handler registered for event tag: {0}")]
    UnhandledEvent(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to parse url: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Failed to parse response: {0}")]
    ResponseParsingFailed(String),
    #[error("API error: {description}")]
    Api {
        description: String,
        error_code: Option<String>,
    },
}

impl Error {
    /// Creates a new NotFound error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates a new AlreadyExists error
    pub fn already_exists<S: Into<String>>(message: S) -> Self {
        Self::AlreadyExists(message.into())
    }

    /// Creates a new InvalidInput error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Creates a new MalformedRecord error for the given store key
    pub fn malformed<K: AsRef<[u8]>, S: Into<String>>(key: K, reason: S) -> Self {
        Self::MalformedRecord {
            key: String::from_utf8_lossy(key.as_ref()).into_owned(),
            reason: reason.into(),
        }
    }

    /// Creates a new Store error
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }

    /// Returns true if a transport retry could succeed where this attempt failed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Reqwest(e) => e.is_timeout() || e.is_connect(),
            Error::RequestFailed(_) => true,
            _ => false,
        }
    }
}
