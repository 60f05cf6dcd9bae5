//! `ipactl ensure`: reconcile one object described by a task file.

use super::helpers::{Context, print_json};
use crate::task::TaskFile;
use anyhow::Result;
use ipa_common::{EnsureOutcome, JsonRpcGateway, Reconciler, Registry};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::info;

pub fn run(ctx: &Context, task_path: &Path, check: bool) -> Result<()> {
    let task = TaskFile::load(task_path)?;
    let registry = Registry::builtin()?;
    let schema = registry.get(&task.object_type)?;
    let desired = task.desired_state(schema, check);
    info!(
        object_type = schema.name(),
        state = %desired.state,
        dry_run = desired.dry_run,
        task = %task_path.display(),
        "ensuring object"
    );

    let gateway = JsonRpcGateway::new(ctx.connect()?);
    let reconciler = Reconciler::new(schema, &gateway).with_verbose_trace(ctx.verbose);
    let outcome = reconciler.ensure(&desired)?;
    print_json(&render_outcome(&outcome))
}

/// `{changed, <type>: object}`, plus the planned calls in check mode.
pub fn render_outcome(outcome: &EnsureOutcome) -> Value {
    let mut out = Map::new();
    out.insert("changed".to_string(), Value::Bool(outcome.changed));
    out.insert(
        outcome.object_type.clone(),
        outcome.object.clone().into_value(),
    );
    if outcome.dry_run {
        let planned = outcome
            .calls
            .iter()
            .map(|call| serde_json::json!({ "method": call.method, "params": call.params() }))
            .collect();
        out.insert("planned".to_string(), Value::Array(planned));
    }
    Value::Object(out)
}
