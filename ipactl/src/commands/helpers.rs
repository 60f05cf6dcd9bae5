//! Shared helper functions for ipactl commands.

use crate::task::TaskError;
use anyhow::{Context as _, Result};
use ipa_common::config::EnvError;
use ipa_common::filters::FilterError;
use ipa_common::logging::LoggingError;
use ipa_common::{
    AttrValue, ClientConfig, ConfigError, ErrorCode, ErrorEntry, HttpSession, LoadedConfig,
    ReconcileError, SchemaError,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Global options every command sees.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub config_path: Option<PathBuf>,
    pub verbose: bool,
}

impl Context {
    pub fn load_config(&self) -> Result<LoadedConfig, ConfigError> {
        ClientConfig::load(self.config_path.as_deref())
    }

    /// Load the configuration and log in.
    pub fn connect(&self) -> Result<HttpSession> {
        let loaded = self.load_config()?;
        let password = loaded.config.password()?;
        Ok(HttpSession::connect(&loaded.config, &password)?)
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{text}");
    Ok(())
}

/// Parse `key=value` arguments. A repeated key collects its values into a
/// list; a single `key=` is an explicit empty value.
pub fn parse_assignments(args: &[String]) -> Result<BTreeMap<String, AttrValue>, ReconcileError> {
    let mut raw: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for arg in args {
        let Some((key, value)) = arg.split_once('=') else {
            return Err(ReconcileError::validation(arg, "expected key=value"));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ReconcileError::validation(arg, "empty key"));
        }
        raw.entry(key.to_string()).or_default().push(value.to_string());
    }
    Ok(raw
        .into_iter()
        .map(|(key, mut values)| {
            let value = if values.len() == 1 {
                AttrValue::from(values.remove(0))
            } else {
                AttrValue::from(values)
            };
            (key, value)
        })
        .collect())
}

/// Catalog code for the first recognized error in the chain.
pub fn error_code(err: &anyhow::Error) -> ErrorCode {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ReconcileError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<SchemaError>() {
            return ReconcileError::from(e.clone()).code();
        }
        if let Some(e) = cause.downcast_ref::<ConfigError>() {
            return e.code();
        }
        if cause.downcast_ref::<EnvError>().is_some() {
            return ErrorCode::ConfigEnvError;
        }
        if let Some(e) = cause.downcast_ref::<TaskError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<FilterError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<LoggingError>() {
            return e.code();
        }
    }
    ErrorCode::InternalSerializationError
}

/// Catalog entry for a failed command, with the concrete error attached.
pub fn error_entry(err: &anyhow::Error) -> ErrorEntry {
    error_code(err).entry().with_detail(format!("{err:#}"))
}
