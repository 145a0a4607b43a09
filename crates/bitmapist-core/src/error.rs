//! Error types for bitmapist operations.
//!
//! Every fallible call in the workspace returns [`BitmapistResult`]. Variants
//! carry a structured [`ErrorCode`] so callers can branch on the failure kind
//! without matching on message text.

use thiserror::Error;

/// Result type alias for bitmapist operations.
pub type BitmapistResult<T> = Result<T, BitmapistError>;

/// Main error type for all bitmapist operations.
#[derive(Error, Debug)]
pub enum BitmapistError {
    /// A transaction was started while another one is still open.
    #[error("Transaction already started")]
    AlreadyOpenTransaction,

    /// Commit was requested with no open transaction.
    #[error("Transaction not started")]
    NoOpenTransaction,

    /// Calendar fields do not describe a real period.
    #[error("Invalid period coordinate: {message}")]
    InvalidPeriod { message: String, code: ErrorCode },

    /// Input validation failed (operand lists, event names).
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        suggestion: Option<String>,
    },

    /// The backing store could not be reached.
    #[error("Store unavailable: {message}")]
    StoreUnavailable {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A store round-trip did not complete in time.
    #[error("Store timeout: {message}")]
    StoreTimeout {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The store rejected a command.
    #[error("Store error: {message}")]
    Store {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Store provider not compiled in.
    #[error("Provider not supported: {provider}")]
    UnsupportedProvider { provider: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Transactions (TXN_xxx)
    TxnAlreadyOpen,
    TxnNotOpen,

    // Periods (PER_xxx)
    PerInvalidMonth,
    PerInvalidWeek,
    PerInvalidDay,
    PerInvalidHour,
    PerOutOfRange,

    // Validation (VAL_xxx)
    ValInvalidInput,
    ValEmptyOperands,
    ValOperandCount,

    // Store (STO_xxx)
    StoConnectionFailed,
    StoTimeout,
    StoOperationFailed,

    // Configuration (CFG_xxx)
    CfgInvalid,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TxnAlreadyOpen => "TXN_001",
            ErrorCode::TxnNotOpen => "TXN_002",
            ErrorCode::PerInvalidMonth => "PER_001",
            ErrorCode::PerInvalidWeek => "PER_002",
            ErrorCode::PerInvalidDay => "PER_003",
            ErrorCode::PerInvalidHour => "PER_004",
            ErrorCode::PerOutOfRange => "PER_005",
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValEmptyOperands => "VAL_002",
            ErrorCode::ValOperandCount => "VAL_003",
            ErrorCode::StoConnectionFailed => "STO_001",
            ErrorCode::StoTimeout => "STO_002",
            ErrorCode::StoOperationFailed => "STO_003",
            ErrorCode::CfgInvalid => "CFG_001",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl BitmapistError {
    /// Create an invalid period error.
    pub fn invalid_period(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::InvalidPeriod {
            message: message.into(),
            code,
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            suggestion: None,
        }
    }

    /// Create a validation error with a specific code and suggestion.
    pub fn validation_with_suggestion(
        code: ErrorCode,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            code,
            suggestion: Some(suggestion.into()),
        }
    }

    /// Create a store error for a rejected command.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            code: ErrorCode::StoOperationFailed,
            source: None,
        }
    }

    /// Create a store-unavailable error.
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
            code: ErrorCode::StoConnectionFailed,
            source: None,
        }
    }

    /// Create a store timeout error.
    pub fn store_timeout(message: impl Into<String>) -> Self {
        Self::StoreTimeout {
            message: message.into(),
            code: ErrorCode::StoTimeout,
            source: None,
        }
    }

    /// Attach the underlying driver error to a store error.
    pub fn with_source(self, err: impl std::error::Error + Send + Sync + 'static) -> Self {
        match self {
            Self::Store { message, code, .. } => Self::Store {
                message,
                code,
                source: Some(Box::new(err)),
            },
            Self::StoreUnavailable { message, code, .. } => Self::StoreUnavailable {
                message,
                code,
                source: Some(Box::new(err)),
            },
            Self::StoreTimeout { message, code, .. } => Self::StoreTimeout {
                message,
                code,
                source: Some(Box::new(err)),
            },
            other => other,
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyOpenTransaction => ErrorCode::TxnAlreadyOpen,
            Self::NoOpenTransaction => ErrorCode::TxnNotOpen,
            Self::InvalidPeriod { code, .. } => *code,
            Self::Validation { code, .. } => *code,
            Self::StoreUnavailable { code, .. } => *code,
            Self::StoreTimeout { code, .. } => *code,
            Self::Store { code, .. } => *code,
            Self::Configuration(_) | Self::UnsupportedProvider { .. } => ErrorCode::CfgInvalid,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether retrying the whole batch may succeed.
    ///
    /// Bit writes and combine commands are idempotent for identical inputs,
    /// so transient store failures are safe to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. } | Self::StoreTimeout { .. })
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::AlreadyOpenTransaction => Some("Commit or abort the open transaction first"),
            Self::NoOpenTransaction => Some("Call begin() before commit()"),
            Self::Validation { suggestion, .. } => suggestion.as_deref(),
            Self::StoreUnavailable { .. } => Some("Please check your store connection settings"),
            Self::StoreTimeout { .. } => Some("Retry the batch; writes are idempotent"),
            _ => None,
        }
    }
}
