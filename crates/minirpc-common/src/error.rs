use thiserror::Error;

/// Boxed error type used for causes coming from external collaborators
/// (transports, registries).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Application status codes carried in envelopes and in the reserved
/// `statuscode` header.
pub mod code {
    /// The call succeeded
    pub const OK: i32 = 0;
    /// An error that carries no more specific code
    pub const UNKNOWN: i32 = 1;
    /// The request payload could not be decoded
    pub const BAD_REQUEST: i32 = 400;
    /// No route is registered for the requested path
    pub const NOT_FOUND: i32 = 404;
    /// The request body exceeded the configured limit
    pub const PAYLOAD_TOO_LARGE: i32 = 413;
    /// The handler failed in an unexpected way
    pub const INTERNAL: i32 = 500;
    /// No endpoint could be reached
    pub const UNAVAILABLE: i32 = 503;
    /// The call did not finish before its deadline
    pub const DEADLINE_EXCEEDED: i32 = 504;

    /// Message paired with [`OK`] in envelopes and status headers
    pub const SUCCESS_MSG: &str = "success";
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("no endpoint")]
    NoEndpoint,

    #[error("{method} {url} failed: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("{url} did not respond within {timeout_ms}ms")]
    DeadlineExceeded { url: String, timeout_ms: u64 },

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("got unexpected code: expected {expected}, got {actual} ({message})")]
    UnexpectedCode {
        expected: i32,
        actual: i32,
        message: String,
    },

    #[error("{message}")]
    Status { code: i32, message: String },

    #[error("not found: {path}")]
    NotFound { path: String },

    #[error("duplicate path register: {0}")]
    DuplicateRoute(String),

    #[error("invalid service descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("failed to resolve {service}: {source}")]
    Discovery {
        service: String,
        #[source]
        source: BoxError,
    },

    #[error("metadata entry {0:?} cannot be sent as a header")]
    InvalidMetadata(String),

    #[error("handler panicked: {0}")]
    Panic(String),

    #[error("request body too large (max {0} bytes)")]
    BodyTooLarge(usize),

    #[error("envelope carried no data")]
    MissingData,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RpcError {
    /// Creates an application error with an explicit status code.
    pub fn status(code: i32, message: impl Into<String>) -> Self {
        RpcError::Status {
            code,
            message: message.into(),
        }
    }

    /// Creates a discovery error for `service` from any cause.
    pub fn discovery(service: impl Into<String>, source: impl Into<BoxError>) -> Self {
        RpcError::Discovery {
            service: service.into(),
            source: source.into(),
        }
    }

    /// Returns the application status code this error travels with.
    pub fn code(&self) -> i32 {
        match self {
            RpcError::NoEndpoint | RpcError::Transport { .. } => code::UNAVAILABLE,
            RpcError::DeadlineExceeded { .. } => code::DEADLINE_EXCEEDED,
            RpcError::Codec(_) | RpcError::InvalidMetadata(_) => code::BAD_REQUEST,
            RpcError::UnexpectedCode { actual, .. } => *actual,
            RpcError::Status { code, .. } => *code,
            RpcError::NotFound { .. } => code::NOT_FOUND,
            RpcError::BodyTooLarge(_) => code::PAYLOAD_TOO_LARGE,
            RpcError::DuplicateRoute(_)
            | RpcError::InvalidDescriptor(_)
            | RpcError::Discovery { .. }
            | RpcError::Panic(_)
            | RpcError::MissingData
            | RpcError::Io(_) => code::INTERNAL,
        }
    }

    /// Checks if an error is worth retrying against another endpoint.
    ///
    /// Retryable errors are failures to reach an endpoint at all; a stale
    /// endpoint picked just before it was removed shows up here too.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RpcError::NoEndpoint | RpcError::Transport { .. } | RpcError::DeadlineExceeded { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
