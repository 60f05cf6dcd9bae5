//! Remote object gateway: named calls in, normalized objects out.
//!
//! The gateway sits on top of an [`RpcTransport`] (the HTTP session in
//! production, an in-memory fake in tests) and owns the response-shape rules:
//! error envelopes become [`ReconcileError::RemoteFault`], nested `result`
//! envelopes are unwrapped, list results are filtered down to one object,
//! and attribute cardinality is coerced to what the schema declares.

use crate::error::ReconcileError;
use crate::schema::ObjectSchema;
use crate::types::{Identity, RemoteCall, RemoteObject};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, trace};

/// Sends one JSON-RPC request and returns the decoded response body.
///
/// Implementations report connection problems as
/// [`ReconcileError::Transport`] and non-success HTTP statuses as
/// [`ReconcileError::RemoteFault`]. Error envelopes inside a successful body
/// are left for the gateway to inspect.
pub trait RpcTransport {
    fn post(&self, method: &str, params: Value) -> Result<Value, ReconcileError>;
}

impl<T: RpcTransport + ?Sized> RpcTransport for &T {
    fn post(&self, method: &str, params: Value) -> Result<Value, ReconcileError> {
        (**self).post(method, params)
    }
}

impl<T: RpcTransport + ?Sized> RpcTransport for Arc<T> {
    fn post(&self, method: &str, params: Value) -> Result<Value, ReconcileError> {
        (**self).post(method, params)
    }
}

impl<T: RpcTransport + ?Sized> RpcTransport for Box<T> {
    fn post(&self, method: &str, params: Value) -> Result<Value, ReconcileError> {
        (**self).post(method, params)
    }
}

/// Find and invoke operations used by the reconciler.
pub trait RemoteObjectGateway {
    /// Fetch the current object. No match is an empty object, not an error.
    fn find(&self, schema: &ObjectSchema, identity: &Identity)
    -> Result<RemoteObject, ReconcileError>;

    /// Issue a (possibly mutating) call and return the object it reports.
    fn invoke(&self, schema: &ObjectSchema, call: &RemoteCall)
    -> Result<RemoteObject, ReconcileError>;
}

/// Builds the `find` request for an identity.
pub fn find_call(schema: &ObjectSchema, identity: &Identity) -> RemoteCall {
    let mut item = Map::new();
    item.insert("all".to_string(), Value::Bool(true));
    item.extend(schema.find_keywords(identity));
    item.extend(schema.find_args().clone());
    RemoteCall::new(&schema.methods().find, schema.positional(identity, true)).with_item(item)
}

/// JSON-RPC implementation of [`RemoteObjectGateway`].
#[derive(Debug, Clone)]
pub struct JsonRpcGateway<T> {
    transport: T,
}

impl<T: RpcTransport> JsonRpcGateway<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn call(
        &self,
        schema: &ObjectSchema,
        call: &RemoteCall,
        filter: Option<&dyn Fn(&Value) -> bool>,
        identity: &Identity,
    ) -> Result<RemoteObject, ReconcileError> {
        let body = self.transport.post(&call.method, call.params())?;
        check_envelope(&call.method, &body)?;
        let object = normalize_response(schema, body, filter, identity);
        trace!(method = %call.method, keys = object.as_map().len(), "normalized response");
        Ok(object)
    }
}

impl<T: RpcTransport> RemoteObjectGateway for JsonRpcGateway<T> {
    fn find(
        &self,
        schema: &ObjectSchema,
        identity: &Identity,
    ) -> Result<RemoteObject, ReconcileError> {
        let call = find_call(schema, identity);
        let object = match schema.find_predicate() {
            Some(predicate) => {
                let f = predicate.func();
                let keep = |candidate: &Value| f(schema, identity, candidate);
                self.call(schema, &call, Some(&keep), identity)?
            }
            None => self.call(schema, &call, None, identity)?,
        };
        debug!(
            object_type = schema.name(),
            found = !object.is_empty(),
            "find complete"
        );
        Ok(object)
    }

    fn invoke(
        &self,
        schema: &ObjectSchema,
        call: &RemoteCall,
    ) -> Result<RemoteObject, ReconcileError> {
        self.call(schema, call, None, &identity_from_call(schema, call))
    }
}

/// Rebuild the identity map from a call's leading positional values, for
/// response hooks that need it.
fn identity_from_call(schema: &ObjectSchema, call: &RemoteCall) -> Identity {
    schema
        .identity_keys()
        .into_iter()
        .zip(call.positional.iter())
        .filter_map(|(key, raw)| {
            schema
                .normalize(key, unwrap_wrapped(raw))
                .ok()
                .map(|v| (key.to_string(), v))
        })
        .collect()
}

fn unwrap_wrapped(raw: &Value) -> &Value {
    match raw {
        Value::Object(map) if map.len() == 1 => map.values().next().unwrap_or(raw),
        other => other,
    }
}

/// Turn a non-null `error` member into a remote fault.
pub fn check_envelope(method: &str, body: &Value) -> Result<(), ReconcileError> {
    match body.get("error") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Object(err)) => {
            let code = err.get("code").and_then(Value::as_i64);
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(err.clone()).to_string());
            Err(ReconcileError::fault(method, code, message))
        }
        Some(Value::String(message)) => Err(ReconcileError::fault(method, None, message.clone())),
        Some(other) => Err(ReconcileError::fault(method, None, other.to_string())),
    }
}

/// Apply the response normalization rules to a decoded body.
///
/// 1. `{result: {result: X}}` yields `X`; `{result: X}` yields `X`.
/// 2. A list is filtered with `filter`, then the last element is kept (or
///    the empty object when nothing survives).
/// 3. Schema attributes are coerced: one-element lists become scalars for
///    scalar attributes, bare values become lists for list attributes.
/// 4. The schema's response hook, if any, runs last.
pub fn normalize_response(
    schema: &ObjectSchema,
    body: Value,
    filter: Option<&dyn Fn(&Value) -> bool>,
    identity: &Identity,
) -> RemoteObject {
    let result = match body {
        Value::Object(mut envelope) => match envelope.remove("result") {
            Some(Value::Object(mut inner)) if inner.contains_key("result") => {
                inner.remove("result").unwrap_or(Value::Null)
            }
            Some(other) => other,
            None => Value::Null,
        },
        _ => Value::Null,
    };

    let selected = match result {
        Value::Array(items) => items
            .into_iter()
            .filter(|item| filter.is_none_or(|keep| keep(item)))
            .next_back()
            .unwrap_or(Value::Null),
        other => other,
    };

    let mut object = RemoteObject::from_value(selected);
    coerce_cardinality(schema, &mut object);
    if let Some(hook) = schema.response_hook() {
        (hook.func())(&mut object, identity);
    }
    object
}

/// Reshape schema attributes to their declared cardinality.
pub fn coerce_cardinality(schema: &ObjectSchema, object: &mut RemoteObject) {
    for spec in schema.attributes() {
        let Some(value) = object.get_mut(spec.response_key()) else {
            continue;
        };
        match value {
            Value::Array(items) if !spec.is_list() && items.len() == 1 => {
                let only = items.remove(0);
                *value = only;
            }
            Value::Array(_) | Value::Null => {}
            _ if spec.is_list() => {
                let only = value.take();
                *value = Value::Array(vec![only]);
            }
            _ => {}
        }
    }
}
