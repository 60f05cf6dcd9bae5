//! Task files: one object's desired state, in TOML or JSON.
//!
//! ```toml
//! type = "group"
//! state = "present"
//!
//! [params]
//! cn = "ops"
//! member_user = ["alice", "bob"]
//! ```
//!
//! `params` mixes identity and attributes and is split by the schema;
//! `identity` and `attributes` may be given separately instead.

use ipa_common::{AttrValue, DesiredState, ErrorCode, ObjectSchema, TargetState};
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("cannot read task file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid task file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

impl TaskError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } => ErrorCode::TaskReadError,
            Self::Parse { .. } => ErrorCode::TaskParseError,
        }
    }
}

/// Contents of a task file.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TaskFile {
    /// Object type name, e.g. `group` or `dnsrecord`.
    #[serde(rename = "type")]
    pub object_type: String,
    /// Requested end state.
    #[serde(default)]
    pub state: TargetState,
    /// Identity and attribute values together.
    #[serde(default)]
    pub params: BTreeMap<String, AttrValue>,
    /// Identity values, when not given through `params`.
    #[serde(default)]
    pub identity: BTreeMap<String, AttrValue>,
    /// Attribute values, when not given through `params`.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
    /// Report what would change without changing it.
    #[serde(default)]
    pub check: bool,
}

impl TaskFile {
    /// Read a task, choosing the format from the extension (`.json` or TOML).
    pub fn load(path: &Path) -> Result<Self, TaskError> {
        let text = std::fs::read_to_string(path).map_err(|source| TaskError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        Self::parse(&text, is_json).map_err(|message| TaskError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn parse(text: &str, is_json: bool) -> Result<Self, String> {
        let task: Self = if is_json {
            serde_json::from_str(text).map_err(|e| e.to_string())?
        } else {
            toml::from_str(text).map_err(|e| e.to_string())?
        };
        if !task.params.is_empty() && !(task.identity.is_empty() && task.attributes.is_empty()) {
            return Err("use either 'params' or 'identity'/'attributes', not both".to_string());
        }
        Ok(task)
    }

    /// The desired state against `schema`; `check` forces a dry run.
    pub fn desired_state(&self, schema: &ObjectSchema, check: bool) -> DesiredState {
        let mut desired = if self.params.is_empty() {
            DesiredState {
                identity: self.identity.clone(),
                attributes: self.attributes.clone(),
                state: self.state,
                dry_run: false,
            }
        } else {
            DesiredState::from_params(schema, self.params.clone(), self.state)
        };
        desired.dry_run = self.check || check;
        desired
    }
}

/// JSON Schema describing task files.
pub fn task_json_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(TaskFile)
}
