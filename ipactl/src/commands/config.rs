//! `ipactl config show`: the effective configuration and where each value
//! came from.

use super::helpers::{Context, print_json};
use anyhow::Result;
use ipa_common::{ClientConfig, ConfigSource, LoadedConfig};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct ShowOutput {
    file: Option<PathBuf>,
    base_url: String,
    config: ClientConfig,
    sources: BTreeMap<&'static str, ConfigSource>,
}

pub fn show(ctx: &Context, json: bool) -> Result<()> {
    let loaded = ctx.load_config()?;
    if json {
        return print_json(&ShowOutput {
            file: loaded.file.clone(),
            base_url: loaded.config.base_url(),
            config: loaded.config.redacted(),
            sources: loaded.sources,
        });
    }
    for line in render_lines(&loaded) {
        println!("{line}");
    }
    Ok(())
}

/// `key = value  (source)` for every known field, password masked.
fn render_lines(loaded: &LoadedConfig) -> Vec<String> {
    let values = serde_json::to_value(loaded.config.redacted()).unwrap_or(Value::Null);
    let mut lines = vec![match &loaded.file {
        Some(path) => format!("# config file: {}", path.display()),
        None => "# config file: none (defaults and environment only)".to_string(),
    }];
    lines.push(format!("# base url: {}", loaded.config.base_url()));
    for (field, source) in &loaded.sources {
        let value = field
            .split_once('.')
            .and_then(|(section, key)| values.get(section)?.get(key))
            .filter(|v| !v.is_null())
            .map_or_else(|| "(unset)".to_string(), Value::to_string);
        lines.push(format!("{field} = {value}  ({source})"));
    }
    lines
}
