//! `IPA_*` environment overrides.
//!
//! Every lookup yields a [`Sourced`] value naming the variable it came from.
//! Malformed values keep the fallback and are collected, so one run reports
//! every bad variable at once.

use super::source::Sourced;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

const PREFIX: &str = "IPA_";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    #[error("{var}='{value}' is not {expected}")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    #[error("{var}={value} is outside {min}..={max}")]
    OutOfRange {
        var: String,
        value: u64,
        min: u64,
        max: u64,
    },
}

/// Reads `IPA_<NAME>` variables, each against a fallback taken from the
/// configuration layer below it.
#[derive(Debug, Default)]
pub struct EnvOverrides {
    errors: Vec<EnvError>,
}

impl EnvOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unset variables yield `fallback`. Set ones go through `parse`; a parse
    /// failure is recorded and also yields `fallback`.
    fn read<T>(
        &mut self,
        name: &str,
        fallback: T,
        parse: impl FnOnce(&str, String) -> Result<T, EnvError>,
    ) -> Sourced<T> {
        let var = format!("{PREFIX}{name}");
        let Ok(raw) = env::var(&var) else {
            return Sourced::default_value(fallback);
        };
        match parse(&var, raw) {
            Ok(value) => Sourced::from_env(value, var),
            Err(err) => {
                self.errors.push(err);
                Sourced::default_value(fallback)
            }
        }
    }

    pub fn text(&mut self, name: &str, fallback: &str) -> Sourced<String> {
        self.read(name, fallback.to_string(), |_, raw| Ok(raw))
    }

    /// Empty counts as explicitly unset.
    pub fn optional_text(&mut self, name: &str) -> Sourced<Option<String>> {
        self.read(name, None, |_, raw| Ok(Some(raw).filter(|v| !v.is_empty())))
    }

    pub fn optional_path(&mut self, name: &str) -> Sourced<Option<PathBuf>> {
        self.read(name, None, |_, raw| {
            Ok(Some(raw).filter(|v| !v.is_empty()).map(|v| expand_path(&v)))
        })
    }

    /// Lowercased, and must be one of `choices`.
    pub fn choice(&mut self, name: &str, fallback: &str, choices: &[&str]) -> Sourced<String> {
        self.read(name, fallback.to_string(), |var, raw| {
            let lower = raw.to_lowercase();
            if choices.contains(&lower.as_str()) {
                Ok(lower)
            } else {
                Err(invalid(var, raw, format!("one of {}", choices.join("/"))))
            }
        })
    }

    pub fn flag(&mut self, name: &str, fallback: bool) -> Sourced<bool> {
        self.read(name, fallback, |var, raw| {
            parse_flag(&raw).ok_or_else(|| invalid(var, raw, "a boolean".into()))
        })
    }

    pub fn bounded(&mut self, name: &str, fallback: u64, min: u64, max: u64) -> Sourced<u64> {
        self.read(name, fallback, |var, raw| {
            let value: u64 = raw
                .trim()
                .parse()
                .map_err(|_| invalid(var, raw.clone(), "an unsigned integer".into()))?;
            if (min..=max).contains(&value) {
                Ok(value)
            } else {
                Err(EnvError::OutOfRange {
                    var: var.to_string(),
                    value,
                    min,
                    max,
                })
            }
        })
    }

    pub fn port(&mut self, name: &str, fallback: u16) -> Sourced<u16> {
        self.bounded(name, u64::from(fallback), 1, u64::from(u16::MAX))
            .map(|n| u16::try_from(n).unwrap_or(fallback))
    }

    pub fn log_level(&mut self, name: &str, fallback: &str) -> Sourced<String> {
        self.read(name, fallback.to_string(), |var, raw| {
            parse_log_level_string(&raw)
                .map(str::to_string)
                .ok_or_else(|| invalid(var, raw, "a log level (trace..error, off)".into()))
        })
    }

    /// Errors collected so far, or `Ok` when every variable parsed.
    pub fn finish(self) -> Result<(), Vec<EnvError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

fn invalid(var: &str, value: String, expected: String) -> EnvError {
    EnvError::InvalidValue {
        var: var.to_string(),
        expected,
        value,
    }
}

/// Expand a leading `~` and `$VAR` references; unexpandable input is kept as-is.
pub fn expand_path(value: &str) -> PathBuf {
    match shellexpand::full(value) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(value),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_log_level_string(value: &str) -> Option<&'static str> {
    const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];
    let wanted = value.trim();
    LEVELS.into_iter().find(|level| level.eq_ignore_ascii_case(wanted))
}
