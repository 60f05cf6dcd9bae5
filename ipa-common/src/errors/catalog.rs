//! Error Catalog for ipactl
//!
//! Every failure the library or the CLI can surface maps to one entry here:
//! - A unique code (IPA-E001 through IPA-E599)
//! - A human-readable message
//! - Remediation steps
//!
//! # Error Code Ranges
//!
//! | Range      | Category    | Description                               |
//! |------------|-------------|-------------------------------------------|
//! | E001-E099  | Config      | Configuration files, env vars, task files |
//! | E100-E199  | Transport   | Connection, TLS, timeouts, bad bodies     |
//! | E200-E299  | Remote      | Faults reported by the directory service  |
//! | E300-E399  | Schema      | Object-type metadata                      |
//! | E400-E499  | Validation  | Requested state rejected before a call    |
//! | E500-E599  | Internal    | Internal/unexpected errors                |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // Config (E001-E099)
    /// Configuration file not found
    ConfigNotFound,
    /// Configuration file could not be read
    ConfigReadError,
    /// Configuration file is not valid TOML
    ConfigParseError,
    /// A configuration value is out of range
    ConfigInvalidValue,
    /// An environment override could not be parsed
    ConfigEnvError,
    /// No password was configured
    ConfigMissingPassword,
    /// Task file could not be read
    TaskReadError,
    /// Task file could not be parsed
    TaskParseError,

    // Transport (E100-E199)
    /// Login request never reached the service
    TransportLoginFailed,
    /// JSON-RPC request never completed
    TransportRequestFailed,

    // Remote (E200-E299)
    /// The service refused the credentials
    RemoteLoginRejected,
    /// The service answered with a non-success HTTP status
    RemoteHttpStatus,
    /// The service returned an error envelope
    RemoteFault,

    // Schema (E300-E399)
    /// Object-type metadata is inconsistent
    SchemaInvalid,
    /// Requested object type is not registered
    SchemaUnknownType,

    // Validation (E400-E499)
    /// Requested state is invalid for this object type
    ValidationInvalidValue,
    /// Text filter name or arguments are invalid
    ValidationFilterError,

    // Internal (E500-E599)
    /// Logging could not be initialized
    InternalLoggingError,
    /// Result could not be serialized
    InternalSerializationError,
}

impl ErrorCode {
    /// Returns the numeric portion of the code.
    #[must_use]
    pub const fn code_number(&self) -> u16 {
        match self {
            Self::ConfigNotFound => 1,
            Self::ConfigReadError => 2,
            Self::ConfigParseError => 3,
            Self::ConfigInvalidValue => 4,
            Self::ConfigEnvError => 5,
            Self::ConfigMissingPassword => 6,
            Self::TaskReadError => 7,
            Self::TaskParseError => 8,

            Self::TransportLoginFailed => 100,
            Self::TransportRequestFailed => 101,

            Self::RemoteLoginRejected => 200,
            Self::RemoteHttpStatus => 201,
            Self::RemoteFault => 202,

            Self::SchemaInvalid => 300,
            Self::SchemaUnknownType => 301,

            Self::ValidationInvalidValue => 400,
            Self::ValidationFilterError => 401,

            Self::InternalLoggingError => 500,
            Self::InternalSerializationError => 501,
        }
    }

    /// Returns the formatted error code string (e.g., "IPA-E001").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("IPA-E{:03}", self.code_number())
    }

    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self.code_number() {
            1..=99 => ErrorCategory::Config,
            100..=199 => ErrorCategory::Transport,
            200..=299 => ErrorCategory::Remote,
            300..=399 => ErrorCategory::Schema,
            400..=499 => ErrorCategory::Validation,
            _ => ErrorCategory::Internal,
        }
    }

    /// Returns the full error entry with all metadata.
    #[must_use]
    pub fn entry(&self) -> ErrorEntry {
        ErrorEntry {
            code: self.code_string(),
            category: self.category(),
            message: self.message().to_string(),
            remediation: self
                .remediation()
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            detail: None,
        }
    }

    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::ConfigNotFound => "Configuration file not found",
            Self::ConfigReadError => "Configuration file could not be read",
            Self::ConfigParseError => "Configuration file is not valid TOML",
            Self::ConfigInvalidValue => "Configuration value is invalid",
            Self::ConfigEnvError => "Environment override could not be parsed",
            Self::ConfigMissingPassword => "No password configured for the directory account",
            Self::TaskReadError => "Task file could not be read",
            Self::TaskParseError => "Task file could not be parsed",

            Self::TransportLoginFailed => "Could not reach the directory server to log in",
            Self::TransportRequestFailed => "Request to the directory server did not complete",

            Self::RemoteLoginRejected => "Directory server rejected the login",
            Self::RemoteHttpStatus => "Directory server answered with an error status",
            Self::RemoteFault => "Directory server reported an error",

            Self::SchemaInvalid => "Object type metadata is inconsistent",
            Self::SchemaUnknownType => "Unknown object type",

            Self::ValidationInvalidValue => "Requested state is invalid for this object type",
            Self::ValidationFilterError => "Text filter could not be applied",

            Self::InternalLoggingError => "Logging could not be initialized",
            Self::InternalSerializationError => "Result could not be serialized",
        }
    }

    #[must_use]
    pub const fn remediation(&self) -> &'static [&'static str] {
        match self {
            Self::ConfigNotFound => &[
                "Pass --config with the path of an existing file",
                "Or omit --config to use built-in defaults and IPA_* environment variables",
            ],
            Self::ConfigReadError => &[
                "Check the file permissions",
                "Check that the path points to a regular file",
            ],
            Self::ConfigParseError => &[
                "Run 'ipactl config show' to see which file is loaded",
                "Fix the TOML syntax reported in the error detail",
            ],
            Self::ConfigInvalidValue => &[
                "protocol must be 'http' or 'https'",
                "timeout_secs must be between 1 and 3600",
            ],
            Self::ConfigEnvError => &[
                "Check the IPA_* environment variables named in the error detail",
                "Booleans accept 1/0, true/false, yes/no, on/off",
            ],
            Self::ConfigMissingPassword => &[
                "Set IPA_PASS",
                "Or set auth.password or auth.password_file in the config file",
            ],
            Self::TaskReadError => &["Check the task file path and permissions"],
            Self::TaskParseError => &[
                "Task files are TOML or JSON with 'type', 'state' and 'params'",
                "Run 'ipactl task-schema' for the full format",
            ],

            Self::TransportLoginFailed => &[
                "Check that the server host and port are reachable",
                "Set validate_certs = false only for servers with self-signed certificates",
            ],
            Self::TransportRequestFailed => &[
                "Re-run the task; reconciliation is safe to repeat",
                "Raise server.timeout_secs for slow servers",
            ],

            Self::RemoteLoginRejected => &[
                "Check the user name and password",
                "Check that the account is not locked",
            ],
            Self::RemoteHttpStatus => &[
                "Check the server logs for the failing request",
                "Re-run with -v to see the request body",
            ],
            Self::RemoteFault => &[
                "Read the message reported by the server",
                "Calls issued before the failure were not rolled back; re-run to converge",
            ],

            Self::SchemaInvalid => &["Fix the object type declaration named in the error detail"],
            Self::SchemaUnknownType => &["Run 'ipactl schema' to list the known object types"],

            Self::ValidationInvalidValue => &[
                "Run 'ipactl schema <type>' to see the attributes and their types",
                "enabled/disabled states require an object type with an enable attribute",
            ],
            Self::ValidationFilterError => &[
                "Run 'ipactl filter --list' to see the available filters",
                "format_map placeholders are {} or {0}",
            ],

            Self::InternalLoggingError => &[
                "Check that the log file directory is writable",
                "Unset IPA_LOG_FILE to log to stderr only",
            ],
            Self::InternalSerializationError => &["Report this as a bug with the -v output"],
        }
    }

    /// Returns all error codes.
    #[must_use]
    pub const fn all() -> &'static [ErrorCode] {
        &[
            Self::ConfigNotFound,
            Self::ConfigReadError,
            Self::ConfigParseError,
            Self::ConfigInvalidValue,
            Self::ConfigEnvError,
            Self::ConfigMissingPassword,
            Self::TaskReadError,
            Self::TaskParseError,
            Self::TransportLoginFailed,
            Self::TransportRequestFailed,
            Self::RemoteLoginRejected,
            Self::RemoteHttpStatus,
            Self::RemoteFault,
            Self::SchemaInvalid,
            Self::SchemaUnknownType,
            Self::ValidationInvalidValue,
            Self::ValidationFilterError,
            Self::InternalLoggingError,
            Self::InternalSerializationError,
        ]
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code_string(), self.message())
    }
}

/// Error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Configuration and task file errors (E001-E099)
    Config,
    /// Connection and request transport errors (E100-E199)
    Transport,
    /// Faults reported by the directory service (E200-E299)
    Remote,
    /// Object-type metadata errors (E300-E399)
    Schema,
    /// Requested state rejected before any mutating call (E400-E499)
    Validation,
    /// Internal/unexpected errors (E500-E599)
    Internal,
}

impl ErrorCategory {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Config => "Configuration",
            Self::Transport => "Transport",
            Self::Remote => "Remote",
            Self::Schema => "Schema",
            Self::Validation => "Validation",
            Self::Internal => "Internal",
        }
    }

    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Config => "Configuration file, environment and task file issues",
            Self::Transport => "Connection, TLS and timeout issues talking to the server",
            Self::Remote => "Errors reported by the directory server",
            Self::Schema => "Inconsistent object type declarations",
            Self::Validation => "Requested state that cannot be applied to the object type",
            Self::Internal => "Internal errors that may indicate bugs",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Complete error entry with all metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Error code string (e.g., "IPA-E001")
    pub code: String,
    pub category: ErrorCategory,
    /// Human-readable error message
    pub message: String,
    /// Steps to remediate the error
    pub remediation: Vec<String>,
    /// The concrete error text for this occurrence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorEntry {
    /// Attach the concrete error text for this occurrence.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Formats the error for display with full remediation steps.
    #[must_use]
    pub fn format_full(&self) -> String {
        let mut output = format!("[{}] {}\n", self.code, self.message);

        if let Some(detail) = &self.detail {
            output.push_str(&format!("  {detail}\n"));
        }
        output.push('\n');

        if !self.remediation.is_empty() {
            output.push_str("Remediation steps:\n");
            for (i, step) in self.remediation.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, step));
            }
        }

        output
    }

    /// Formats the error as a single line.
    #[must_use]
    pub fn format_brief(&self) -> String {
        format!("[{}] {}", self.code, self.message)
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_brief())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_numbers_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for code in ErrorCode::all() {
            assert!(
                seen.insert(code.code_number()),
                "duplicate code number for {code:?}"
            );
        }
    }

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::ConfigNotFound.code_string(), "IPA-E001");
        assert_eq!(ErrorCode::TransportRequestFailed.code_string(), "IPA-E101");
        assert_eq!(ErrorCode::RemoteFault.code_string(), "IPA-E202");
        assert_eq!(ErrorCode::InternalSerializationError.code_string(), "IPA-E501");
    }

    #[test]
    fn test_all_errors_have_message_and_remediation() {
        for code in ErrorCode::all() {
            assert!(!code.message().is_empty(), "{code:?} has no message");
            assert!(!code.remediation().is_empty(), "{code:?} has no remediation");
        }
    }

    #[test]
    fn test_category_ranges() {
        for code in ErrorCode::all() {
            let num = code.code_number();
            match code.category() {
                ErrorCategory::Config => assert!(num < 100, "{code:?}"),
                ErrorCategory::Transport => assert!((100..200).contains(&num), "{code:?}"),
                ErrorCategory::Remote => assert!((200..300).contains(&num), "{code:?}"),
                ErrorCategory::Schema => assert!((300..400).contains(&num), "{code:?}"),
                ErrorCategory::Validation => assert!((400..500).contains(&num), "{code:?}"),
                ErrorCategory::Internal => assert!(num >= 500, "{code:?}"),
            }
        }
    }

    #[test]
    fn test_error_entry_serialization() {
        let entry = ErrorCode::ConfigMissingPassword.entry();
        let json = serde_json::to_string(&entry).expect("serialization failed");
        assert!(json.contains("IPA-E006"));
        assert!(json.contains("config"));
        assert!(!json.contains("detail"));

        let parsed: ErrorEntry = serde_json::from_str(&json).expect("deserialization failed");
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::RemoteLoginRejected).unwrap();
        assert_eq!(json, "\"REMOTE_LOGIN_REJECTED\"");
    }

    #[test]
    fn test_format_full_includes_detail_and_steps() {
        let formatted = ErrorCode::RemoteFault
            .entry()
            .with_detail("group_add_member failed (code 4001): no such entry")
            .format_full();

        assert!(formatted.starts_with("[IPA-E202] Directory server reported an error\n"));
        assert!(formatted.contains("no such entry"));
        assert!(formatted.contains("Remediation steps:"));
        assert!(formatted.contains("  1. "));
    }

    #[test]
    fn test_format_brief() {
        assert_eq!(
            ErrorCode::SchemaUnknownType.entry().format_brief(),
            "[IPA-E301] Unknown object type"
        );
        assert_eq!(format!("{}", ErrorCategory::Remote), "Remote");
    }
}
