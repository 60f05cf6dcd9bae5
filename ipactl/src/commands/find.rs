//! `ipactl find`: show the current state of one object.

use super::helpers::{Context, parse_assignments, print_json};
use anyhow::Result;
use ipa_common::{
    DesiredState, JsonRpcGateway, ObjectSchema, Reconciler, Registry, RemoteObject,
    ReconcileError, RemoteObjectGateway, TargetState,
};
use serde_json::json;

pub fn run(ctx: &Context, object_type: &str, args: &[String]) -> Result<()> {
    let registry = Registry::builtin()?;
    let schema = registry.get(object_type)?;
    let desired = identity_request(schema, args)?;

    let gateway = JsonRpcGateway::new(ctx.connect()?);
    let identity = Reconciler::new(schema, &gateway).validate(&desired)?;
    let object = gateway.find(schema, &identity)?;
    print_json(&render(schema, object))
}

/// Build a request carrying only identity values; anything else is refused
/// before connecting.
fn identity_request(schema: &ObjectSchema, args: &[String]) -> Result<DesiredState> {
    let mut desired = DesiredState::new(TargetState::Present);
    for (key, value) in parse_assignments(args)? {
        if !schema.is_identity(&key) {
            return Err(ReconcileError::validation(
                &key,
                format!(
                    "not an identity key of '{}' (expected {})",
                    schema.name(),
                    schema.identity_keys().join(", ")
                ),
            )
            .into());
        }
        desired = desired.with_identity(key, value);
    }
    Ok(desired)
}

fn render(schema: &ObjectSchema, object: RemoteObject) -> serde_json::Value {
    json!({
        "found": !object.is_empty(),
        schema.name(): object.into_value(),
    })
}
