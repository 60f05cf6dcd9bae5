//! Error types raised while building schemas and reconciling objects.

use crate::errors::ErrorCode;
use thiserror::Error;

/// Misconfigured object-type metadata. Raised when a schema is built, never
/// while a reconciliation is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema '{schema}' declares no identity attribute")]
    NoIdentity { schema: String },

    #[error("schema '{schema}': attribute '{attribute}' is declared more than once")]
    DuplicateAttribute { schema: String, attribute: String },

    #[error(
        "schema '{schema}': identity attribute '{attribute}' is list-valued but cannot be used to search"
    )]
    UnsearchableListIdentity { schema: String, attribute: String },

    #[error("schema '{schema}': enable attribute '{attribute}' {reason}")]
    InvalidEnableAttribute {
        schema: String,
        attribute: String,
        reason: String,
    },

    #[error("schema '{schema}': attribute '{attribute}' {reason}")]
    InvalidRoute {
        schema: String,
        attribute: String,
        reason: String,
    },

    #[error(
        "schema '{schema}': method '{method}' receives positional values from both '{first}' and '{second}'"
    )]
    ConflictingPositionalRoute {
        schema: String,
        method: String,
        first: String,
        second: String,
    },

    #[error("schema '{schema}': method table entry '{entry}' is empty")]
    MissingMethod { schema: String, entry: String },

    #[error("unknown object type '{0}'")]
    UnknownType(String),
}

/// Failure of a single `ensure()` call.
///
/// Every variant aborts the reconciliation at the step where it occurred.
/// Calls already issued are not rolled back.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Connection, TLS, timeout or unreadable body.
    #[error("transport failure during {method}: {message}")]
    Transport {
        method: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The service answered with an error envelope or a non-success status.
    #[error("{method} failed{}: {message}", code.map(|c| format!(" (code {c})")).unwrap_or_default())]
    RemoteFault {
        method: String,
        code: Option<i64>,
        message: String,
    },

    /// The requested state cannot be expressed against this schema.
    #[error("invalid value for '{attribute}': {message}")]
    Validation { attribute: String, message: String },
}

impl ReconcileError {
    pub fn transport(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            method: method.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_with_source<E>(method: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            method: method.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn fault(method: impl Into<String>, code: Option<i64>, message: impl Into<String>) -> Self {
        Self::RemoteFault {
            method: method.into(),
            code,
            message: message.into(),
        }
    }

    pub fn validation(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Name of the remote method involved, when the failure came from a call.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Transport { method, .. } | Self::RemoteFault { method, .. } => Some(method),
            _ => None,
        }
    }

    /// Catalog code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Schema(SchemaError::UnknownType(_)) => ErrorCode::SchemaUnknownType,
            Self::Schema(_) => ErrorCode::SchemaInvalid,
            Self::Transport { method, .. } if method == "login" => ErrorCode::TransportLoginFailed,
            Self::Transport { .. } => ErrorCode::TransportRequestFailed,
            Self::RemoteFault { method, .. } if method == "login" => ErrorCode::RemoteLoginRejected,
            Self::RemoteFault { code: Some(c), .. } if (400..600).contains(c) => {
                ErrorCode::RemoteHttpStatus
            }
            Self::RemoteFault { .. } => ErrorCode::RemoteFault,
            Self::Validation { .. } => ErrorCode::ValidationInvalidValue,
        }
    }
}

pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
