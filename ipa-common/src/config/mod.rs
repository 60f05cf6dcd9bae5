//! Client configuration for talking to the directory service.
//!
//! Values are layered: built-in defaults, then the TOML config file, then
//! `IPA_*` environment variables. Every effective value remembers where it
//! came from so `ipactl config show` can explain itself.

pub mod env;
pub mod source;

pub use env::{EnvError, EnvOverrides, expand_path};
pub use source::{ConfigSource, Sourced};

use crate::errors::ErrorCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const DEFAULT_HOST: &str = "ipa.example.com";
const DEFAULT_USER: &str = "admin";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors raised while assembling a [`ClientConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("invalid environment overrides: {}", format_env_errors(.0))]
    Env(Vec<EnvError>),

    #[error("no password configured (set auth.password, auth.password_file or IPA_PASS)")]
    MissingPassword,
}

fn format_env_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::ConfigNotFound,
            Self::Read { .. } => ErrorCode::ConfigReadError,
            Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::InvalidValue { .. } => ErrorCode::ConfigInvalidValue,
            Self::Env(_) => ErrorCode::ConfigEnvError,
            Self::MissingPassword => ErrorCode::ConfigMissingPassword,
        }
    }
}

/// URL scheme used to reach the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    #[default]
    Https,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub validate_certs: bool,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: Protocol::Https.default_port(),
            protocol: Protocol::Https,
            validate_certs: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_file: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user: DEFAULT_USER.to_string(),
            password: None,
            password_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Connection settings for one directory server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub general: GeneralConfig,
}

/// Effective configuration plus the origin of each value.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedConfig {
    pub config: ClientConfig,
    /// Path of the file that was read, if any.
    pub file: Option<PathBuf>,
    /// Keyed by dotted field name, e.g. `server.host`.
    pub sources: BTreeMap<&'static str, ConfigSource>,
}

const FIELDS: &[(&str, &str, &str)] = &[
    ("server", "host", "server.host"),
    ("server", "port", "server.port"),
    ("server", "protocol", "server.protocol"),
    ("server", "validate_certs", "server.validate_certs"),
    ("server", "timeout_secs", "server.timeout_secs"),
    ("auth", "user", "auth.user"),
    ("auth", "password", "auth.password"),
    ("auth", "password_file", "auth.password_file"),
    ("general", "log_level", "general.log_level"),
];

/// Default config file location (`$XDG_CONFIG_HOME/ipactl/config.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ipactl").join("config.toml"))
}

impl ClientConfig {
    /// Parse a config document.
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load defaults, the config file and environment overrides.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
        let (file, explicit) = match path {
            Some(p) => (Some(p.to_path_buf()), true),
            None => (default_config_path(), false),
        };

        let mut sources: BTreeMap<&'static str, ConfigSource> = FIELDS
            .iter()
            .map(|(_, _, name)| (*name, ConfigSource::Default))
            .collect();

        let mut config = ClientConfig::default();
        let mut loaded_file = None;
        if let Some(file) = file {
            if file.exists() {
                let text = std::fs::read_to_string(&file).map_err(|source| ConfigError::Read {
                    path: file.clone(),
                    source,
                })?;
                config = Self::from_toml(&text, &file)?;
                mark_file_sources(&text, &file, &mut sources);
                debug!(path = %file.display(), "loaded config file");
                loaded_file = Some(file);
            } else if explicit {
                return Err(ConfigError::NotFound { path: file });
            }
        }

        config.apply_env(&mut sources)?;
        config.validate()?;
        Ok(LoadedConfig {
            config,
            file: loaded_file,
            sources,
        })
    }

    /// Overlay `IPA_*` environment variables.
    pub fn apply_env(
        &mut self,
        sources: &mut BTreeMap<&'static str, ConfigSource>,
    ) -> Result<(), ConfigError> {
        let mut overrides = EnvOverrides::new();

        let host = overrides.text("HOST", &self.server.host);
        let protocol = overrides.choice("PROT", self.server.protocol.as_str(), &["http", "https"]);
        let port = overrides.port("PORT", self.server.port);
        let validate_certs = overrides.flag("VALIDATE_CERTS", self.server.validate_certs);
        let timeout = overrides.bounded("TIMEOUT_SECS", self.server.timeout_secs, 1, 3600);
        let user = overrides.text("USER", &self.auth.user);
        let password = overrides.optional_text("PASS");
        let password_file = overrides.optional_path("PASS_FILE");
        let log_level = overrides.log_level("LOG_LEVEL", &self.general.log_level);
        overrides.finish().map_err(ConfigError::Env)?;

        let mut note = |name: &'static str, explicit: bool| {
            if explicit {
                sources.insert(name, ConfigSource::Environment);
            }
        };
        note("server.host", !host.is_default());
        note("server.protocol", !protocol.is_default());
        note("server.port", !port.is_default());
        note("server.validate_certs", !validate_certs.is_default());
        note("server.timeout_secs", !timeout.is_default());
        note("auth.user", !user.is_default());
        note("auth.password", !password.is_default());
        note("auth.password_file", !password_file.is_default());
        note("general.log_level", !log_level.is_default());

        // Switching scheme without naming a port moves to that scheme's port.
        let protocol_value = if protocol.value == "http" {
            Protocol::Http
        } else {
            Protocol::Https
        };
        if !protocol.is_default()
            && port.is_default()
            && self.server.port == self.server.protocol.default_port()
        {
            self.server.port = protocol_value.default_port();
        } else {
            self.server.port = port.value;
        }
        self.server.protocol = protocol_value;
        self.server.host = host.value;
        self.server.validate_certs = validate_certs.value;
        self.server.timeout_secs = timeout.value;
        self.auth.user = user.value;
        if !password.is_default() {
            self.auth.password = password.value;
        }
        if !password_file.is_default() {
            self.auth.password_file = password_file.value;
        }
        self.general.log_level = log_level.value;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "server.host",
                reason: "must not be empty".to_string(),
            });
        }
        if self.server.host.contains('/') {
            return Err(ConfigError::InvalidValue {
                field: "server.host",
                reason: "expected a host name, not a URL".to_string(),
            });
        }
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port",
                reason: "must be between 1 and 65535".to_string(),
            });
        }
        if self.server.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.timeout_secs",
                reason: "must be positive".to_string(),
            });
        }
        if self.auth.user.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "auth.user",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// `<proto>://<host>[:port]`, the port only when it is not the scheme default.
    pub fn base_url(&self) -> String {
        let protocol = self.server.protocol;
        if self.server.port == protocol.default_port() {
            format!("{}://{}", protocol, self.server.host)
        } else {
            format!("{}://{}:{}", protocol, self.server.host, self.server.port)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_secs)
    }

    /// Resolve the password from the inline value or `password_file`.
    pub fn password(&self) -> Result<String, ConfigError> {
        if let Some(password) = &self.auth.password {
            return Ok(password.clone());
        }
        let Some(file) = &self.auth.password_file else {
            return Err(ConfigError::MissingPassword);
        };
        let path = expand_path(&file.to_string_lossy());
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let password = text.trim_end_matches(['\r', '\n']).to_string();
        if password.is_empty() {
            return Err(ConfigError::MissingPassword);
        }
        Ok(password)
    }

    /// Copy suitable for display, with the inline password masked.
    pub fn redacted(&self) -> ClientConfig {
        let mut copy = self.clone();
        if copy.auth.password.is_some() {
            copy.auth.password = Some(crate::util::MASK.to_string());
        }
        copy
    }
}

fn mark_file_sources(text: &str, path: &Path, sources: &mut BTreeMap<&'static str, ConfigSource>) {
    let Ok(table) = text.parse::<toml::Table>() else {
        return;
    };
    for (section, key, name) in FIELDS {
        let present = table
            .get(*section)
            .and_then(|s| s.as_table())
            .is_some_and(|s| s.contains_key(*key));
        if present {
            sources.insert(*name, ConfigSource::File(path.to_path_buf()));
        }
    }
}

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use std::io::Write;

    const ALL_VARS: &[&str] = &[
        "IPA_HOST",
        "IPA_PORT",
        "IPA_PROT",
        "IPA_USER",
        "IPA_PASS",
        "IPA_PASS_FILE",
        "IPA_VALIDATE_CERTS",
        "IPA_TIMEOUT_SECS",
        "IPA_LOG_LEVEL",
    ];

    fn clear_env() {
        for var in ALL_VARS {
            // SAFETY: env access is serialized by env_test_lock
            unsafe { std::env::remove_var(var) };
        }
    }

    fn set_env(key: &str, value: &str) {
        // SAFETY: env access is serialized by env_test_lock
        unsafe { std::env::set_var(key, value) };
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::default();
        assert_eq!(config.server.host, "ipa.example.com");
        assert_eq!(config.server.port, 443);
        assert_eq!(config.server.protocol, Protocol::Https);
        assert!(config.server.validate_certs);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.auth.user, "admin");
        assert_eq!(config.base_url(), "https://ipa.example.com");
    }

    #[test]
    fn base_url_includes_non_default_port() {
        let mut config = ClientConfig::default();
        config.server.port = 8443;
        assert_eq!(config.base_url(), "https://ipa.example.com:8443");
        config.server.protocol = Protocol::Http;
        config.server.port = 80;
        assert_eq!(config.base_url(), "http://ipa.example.com");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let path = Path::new("config.toml");
        let config = ClientConfig::from_toml(
            "[server]\nhost = \"ipa1.corp.test\"\n[auth]\npassword = \"pw\"\n",
            path,
        )
        .unwrap();
        assert_eq!(config.server.host, "ipa1.corp.test");
        assert_eq!(config.server.port, 443);
        assert_eq!(config.auth.user, "admin");
        assert_eq!(config.password().unwrap(), "pw");
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let err = ClientConfig::from_toml("[server\nhost=", Path::new("bad.toml")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigParseError);
    }

    #[test]
    fn explicit_missing_file_is_not_found() {
        let _guard = env_test_lock();
        clear_env();
        let err = ClientConfig::load(Some(Path::new("/nonexistent/ipactl.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
        assert_eq!(err.code(), ErrorCode::ConfigNotFound);
    }

    #[test]
    fn env_overrides_file_and_tracks_sources() {
        let _guard = env_test_lock();
        clear_env();
        let file = write_config("[server]\nhost = \"from-file\"\ntimeout_secs = 5\n");
        set_env("IPA_HOST", "from-env");
        set_env("IPA_PASS", "secret");

        let loaded = ClientConfig::load(Some(file.path())).unwrap();
        assert_eq!(loaded.config.server.host, "from-env");
        assert_eq!(loaded.config.server.timeout_secs, 5);
        assert_eq!(loaded.config.auth.password.as_deref(), Some("secret"));
        assert_eq!(loaded.sources["server.host"], ConfigSource::Environment);
        assert_eq!(
            loaded.sources["server.timeout_secs"],
            ConfigSource::File(file.path().to_path_buf())
        );
        assert_eq!(loaded.sources["server.port"], ConfigSource::Default);

        clear_env();
    }

    #[test]
    fn switching_protocol_moves_default_port() {
        let _guard = env_test_lock();
        clear_env();
        set_env("IPA_PROT", "http");
        let mut config = ClientConfig::default();
        config.apply_env(&mut BTreeMap::new()).unwrap();
        assert_eq!(config.server.protocol, Protocol::Http);
        assert_eq!(config.server.port, 80);
        assert_eq!(config.base_url(), "http://ipa.example.com");
        clear_env();
    }

    #[test]
    fn all_env_errors_are_collected() {
        let _guard = env_test_lock();
        clear_env();
        set_env("IPA_PORT", "not-a-port");
        set_env("IPA_VALIDATE_CERTS", "sometimes");
        let mut config = ClientConfig::default();
        match config.apply_env(&mut BTreeMap::new()) {
            Err(ConfigError::Env(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected env errors, got {other:?}"),
        }
        clear_env();
    }

    #[test]
    fn password_file_is_trimmed() {
        let file = write_config("hunter2\n");
        let mut config = ClientConfig::default();
        config.auth.password_file = Some(file.path().to_path_buf());
        assert_eq!(config.password().unwrap(), "hunter2");
    }

    #[test]
    fn missing_password_is_reported() {
        let err = ClientConfig::default().password().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigMissingPassword);
    }

    #[test]
    fn redacted_hides_inline_password() {
        let mut config = ClientConfig::default();
        config.auth.password = Some("hunter2".into());
        let shown = toml::to_string(&config.redacted()).unwrap();
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn validate_rejects_url_as_host() {
        let mut config = ClientConfig::default();
        config.server.host = "https://ipa.example.com".into();
        assert_eq!(
            config.validate().unwrap_err().code(),
            ErrorCode::ConfigInvalidValue
        );
    }
}
