//! In-memory directory service for tests.
//!
//! [`FakeDirectory`] implements [`RpcTransport`] and answers calls the way the
//! real service does: results inside `{"result": ..., "error": null}`,
//! attribute values as lists, base64 and DNS-name values wrapped, substring
//! matching in find, and error envelopes for duplicates, missing entries,
//! empty modifications and repeated enable/disable. It needs no network and
//! records every call it receives.

use crate::builtin::Registry;
use crate::error::{ReconcileError, SchemaError};
use crate::gateway::RpcTransport;
use crate::schema::{AttributeSpec, Creation, Encoding, ObjectSchema, RouteStyle};
use crate::types::RemoteObject;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Item keys that never name an attribute.
const CONTROL_KEYS: &[&str] = &["all", "raw", "rights", "no_members", "version", "del_all"];

/// One call received by the fake.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedCall {
    pub method: String,
    pub params: Value,
}

impl RecordedCall {
    pub fn positional(&self) -> &[Value] {
        self.params
            .get(0)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn item(&self) -> Option<&Map<String, Value>> {
        self.params.get(1).and_then(Value::as_object)
    }
}

#[derive(Debug, Clone)]
enum Injected {
    Fault { code: i64, message: String },
    Transport(String),
}

/// Error envelope content.
#[derive(Debug)]
struct Fault {
    code: i64,
    name: &'static str,
    message: String,
}

impl Fault {
    fn new(code: i64, name: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            name,
            message: message.into(),
        }
    }

    fn not_found(schema: &ObjectSchema, identity: &[String]) -> Self {
        Self::new(
            4001,
            "NotFound",
            format!("{}: {} not found", primary_key(identity), schema.name()),
        )
    }
}

type Reply = Result<Value, Fault>;

#[derive(Debug, Clone)]
struct Entry {
    /// Identity values in schema order.
    identity: Vec<String>,
    /// Stored attributes keyed by response key; every value is a list.
    attrs: Map<String, Value>,
}

impl Entry {
    fn new(schema: &ObjectSchema, identity: Vec<String>) -> Self {
        let mut attrs = Map::new();
        for (spec, value) in identity_specs(schema).zip(&identity) {
            attrs.insert(
                spec.response_key().to_string(),
                Value::Array(vec![Value::String(value.clone())]),
            );
        }
        Self { identity, attrs }
    }

    fn matches(&self, identity: &[String]) -> bool {
        self.identity.len() == identity.len()
            && self
                .identity
                .iter()
                .zip(identity)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

#[derive(Debug, Default)]
struct FakeState {
    objects: BTreeMap<String, Vec<Entry>>,
    calls: Vec<RecordedCall>,
    faults: BTreeMap<String, Injected>,
}

/// What a method does to the schema it belongs to.
enum Op<'s> {
    Find,
    Add,
    Modify,
    Remove,
    SetEnabled(bool),
    ListAdd(Vec<&'s AttributeSpec>),
    ListRemove(Vec<&'s AttributeSpec>),
}

/// In-memory stand-in for the directory's JSON-RPC endpoint.
#[derive(Debug)]
pub struct FakeDirectory {
    registry: Registry,
    state: Mutex<FakeState>,
}

impl FakeDirectory {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            state: Mutex::new(FakeState::default()),
        }
    }

    /// A fake serving every built-in object type.
    pub fn builtin() -> Result<Self, SchemaError> {
        Ok(Self::new(Registry::builtin()?))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store an object directly. Keys may be attribute names or response
    /// keys; values may be scalars or lists.
    pub fn seed(&self, object_type: &str, object: Value) -> Result<(), ReconcileError> {
        let schema = self.registry.get(object_type)?;
        let Value::Object(fields) = object else {
            return Err(ReconcileError::validation(object_type, "seed object must be a map"));
        };

        let mut identity = Vec::new();
        for spec in identity_specs(schema) {
            let raw = fields
                .get(&spec.name)
                .or_else(|| fields.get(spec.response_key()))
                .ok_or_else(|| ReconcileError::validation(&spec.name, "identity value is required"))?;
            let first = match unwrap_incoming(raw) {
                Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
                other => other,
            };
            identity.push(plain_string(&first));
        }

        let mut entry = Entry::new(schema, identity);
        for (key, value) in fields {
            let stored_key = schema
                .attribute(&key)
                .map(|spec| spec.response_key().to_string())
                .unwrap_or(key);
            entry.attrs.insert(stored_key, as_list(unwrap_incoming(&value)));
        }

        let mut state = self.state();
        let entries = state.objects.entry(object_type.to_string()).or_default();
        entries.retain(|e| !e.matches(&entry.identity));
        entries.push(entry);
        Ok(())
    }

    /// Stored attributes of one object, unwrapped, as the fake keeps them.
    pub fn object(&self, object_type: &str, identity: &[&str]) -> Option<Value> {
        let identity: Vec<String> = identity.iter().map(|s| s.to_string()).collect();
        self.state()
            .objects
            .get(object_type)?
            .iter()
            .find(|e| e.matches(&identity))
            .map(|e| Value::Object(e.attrs.clone()))
    }

    pub fn count(&self, object_type: &str) -> usize {
        self.state().objects.get(object_type).map_or(0, Vec::len)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.state().calls.iter().map(|c| c.method.clone()).collect()
    }

    /// Methods received other than lookups.
    pub fn mutating_methods(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter(|c| !c.method.ends_with("_find") && !c.method.ends_with("_show"))
            .map(|c| c.method.clone())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Answer every later call to `method` with an error envelope.
    pub fn fail_on(&self, method: &str, code: i64, message: &str) {
        self.state().faults.insert(
            method.to_string(),
            Injected::Fault {
                code,
                message: message.to_string(),
            },
        );
    }

    /// Fail every later call to `method` before it reaches the service.
    pub fn fail_transport_on(&self, method: &str, message: &str) {
        self.state()
            .faults
            .insert(method.to_string(), Injected::Transport(message.to_string()));
    }

    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    fn handle(&self, method: &str, params: &Value) -> Reply {
        let positional: Vec<Value> = params
            .get(0)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let item: Map<String, Value> = params
            .get(1)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let Some((schema, op)) = self
            .registry
            .iter()
            .find_map(|s| resolve(s, method, &positional, &item).map(|op| (s, op)))
        else {
            return Err(Fault::new(905, "CommandError", format!("unknown command '{method}'")));
        };

        let mut state = self.state();
        let entries = state.objects.entry(schema.name().to_string()).or_default();
        match op {
            Op::Find => Ok(find(schema, entries, &positional, &item)),
            Op::Add => add(schema, entries, &positional, &item),
            Op::Modify => modify(schema, entries, &positional, &item),
            Op::Remove => remove(schema, entries, &positional),
            Op::SetEnabled(enabled) => set_enabled(schema, entries, &positional, enabled),
            Op::ListAdd(specs) => list_add(schema, entries, &specs, &positional, &item),
            Op::ListRemove(specs) => list_remove(schema, entries, &specs, &positional, &item),
        }
    }
}

impl RpcTransport for FakeDirectory {
    fn post(&self, method: &str, params: Value) -> Result<Value, ReconcileError> {
        let injected = {
            let mut state = self.state();
            state.calls.push(RecordedCall {
                method: method.to_string(),
                params: params.clone(),
            });
            state.faults.get(method).cloned()
        };
        trace!(method, %params, "fake directory call");

        let reply = match injected {
            Some(Injected::Transport(message)) => {
                return Err(ReconcileError::transport(method, message));
            }
            Some(Injected::Fault { code, message }) => Err(Fault::new(code, "InjectedFault", message)),
            None => self.handle(method, &params),
        };

        Ok(match reply {
            Ok(result) => json!({"result": result, "error": null, "id": 0}),
            Err(fault) => json!({
                "result": null,
                "error": {"code": fault.code, "message": fault.message, "name": fault.name},
                "id": 0,
            }),
        })
    }
}

fn identity_specs(schema: &ObjectSchema) -> impl Iterator<Item = &AttributeSpec> {
    schema.attributes().iter().filter(|a| a.identity)
}

fn resolve<'s>(
    schema: &'s ObjectSchema,
    method: &str,
    positional: &[Value],
    item: &Map<String, Value>,
) -> Option<Op<'s>> {
    let methods = schema.methods();
    if method == methods.find {
        return Some(Op::Find);
    }
    if method == methods.enable && schema.enable().is_some() {
        return Some(Op::SetEnabled(true));
    }
    if method == methods.disable && schema.enable().is_some() {
        return Some(Op::SetEnabled(false));
    }

    let identity_len = identity_specs(schema).count();
    let routed = |adding: bool| -> Vec<&'s AttributeSpec> {
        schema
            .attributes()
            .iter()
            .filter(|a| {
                a.route.as_ref().is_some_and(|r| {
                    let routed = if adding { &r.add_method } else { &r.remove_method };
                    routed == method
                })
            })
            .collect()
    };
    let carries = |spec: &&AttributeSpec| match spec.route.as_ref().map(|r| (r.style, &r.param)) {
        Some((RouteStyle::Keyword, param)) => item.contains_key(param),
        Some((RouteStyle::Positional, _)) => positional.len() > identity_len,
        None => false,
    };

    let adds = routed(true);
    let removes = routed(false);
    if adds.iter().any(carries) {
        return Some(Op::ListAdd(adds));
    }
    if removes.iter().any(carries) {
        return Some(Op::ListRemove(removes));
    }
    if method == methods.add {
        return Some(Op::Add);
    }
    if method == methods.modify {
        return Some(Op::Modify);
    }
    if method == methods.remove {
        return Some(Op::Remove);
    }
    if !adds.is_empty() {
        return Some(Op::ListAdd(adds));
    }
    if !removes.is_empty() {
        return Some(Op::ListRemove(removes));
    }
    None
}

fn identity_of(schema: &ObjectSchema, positional: &[Value]) -> Result<Vec<String>, Fault> {
    let keys = schema.identity_keys();
    if let Some(missing) = keys.get(positional.len()) {
        return Err(Fault::new(3007, "RequirementError", format!("'{missing}' is required")));
    }
    Ok(positional[..keys.len()].iter().map(plain_string).collect())
}

fn primary_key(identity: &[String]) -> &str {
    identity.last().map(String::as_str).unwrap_or_default()
}

fn unwrap_incoming(value: &Value) -> Value {
    match value {
        Value::Object(map) if map.len() == 1 => map
            .get("__base64__")
            .or_else(|| map.get("__dns_name__"))
            .cloned()
            .unwrap_or_else(|| value.clone()),
        Value::Array(items) => Value::Array(items.iter().map(unwrap_incoming).collect()),
        other => other.clone(),
    }
}

fn plain_string(value: &Value) -> String {
    match unwrap_incoming(value) {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn as_list(value: Value) -> Value {
    match value {
        Value::Array(_) => value,
        Value::Null => Value::Array(Vec::new()),
        other => Value::Array(vec![other]),
    }
}

fn same_value(a: &Value, b: &Value) -> bool {
    a == b || plain_string(a).eq_ignore_ascii_case(&plain_string(b))
}

fn wrap(encoding: Encoding, value: &Value) -> Value {
    match encoding {
        Encoding::Plain => value.clone(),
        Encoding::Base64 => json!({"__base64__": value}),
        Encoding::DnsName => json!({"__dns_name__": value}),
    }
}

/// The entry as the service reports it.
fn render(schema: &ObjectSchema, entry: &Entry) -> Value {
    let mut out = Map::new();
    for (key, value) in &entry.attrs {
        let encoding = schema
            .attribute_by_response_key(key)
            .map(|spec| spec.encoding)
            .unwrap_or_default();
        let rendered = match value {
            Value::Array(items) => Value::Array(items.iter().map(|v| wrap(encoding, v)).collect()),
            other => wrap(encoding, other),
        };
        out.insert(key.clone(), rendered);
    }
    Value::Object(out)
}

fn push_values(attrs: &mut Map<String, Value>, key: &str, values: Value) -> usize {
    let slot = attrs
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = as_list(slot.take());
    }
    let Value::Array(existing) = slot else {
        return 0;
    };
    let mut added = 0;
    if let Value::Array(values) = as_list(values) {
        for value in values {
            if !existing.iter().any(|e| same_value(e, &value)) {
                existing.push(value);
                added += 1;
            }
        }
    }
    added
}

fn drop_values(attrs: &mut Map<String, Value>, key: &str, values: Value) -> usize {
    let Some(Value::Array(existing)) = attrs.get_mut(key) else {
        return 0;
    };
    let before = existing.len();
    if let Value::Array(values) = as_list(values) {
        existing.retain(|e| !values.iter().any(|v| same_value(e, v)));
    }
    let removed = before - existing.len();
    if existing.is_empty() {
        attrs.remove(key);
    }
    removed
}

/// Apply add/mod options to a copy of the stored attributes.
fn apply_item(
    schema: &ObjectSchema,
    attrs: &mut Map<String, Value>,
    item: &Map<String, Value>,
) -> Result<(), Fault> {
    for (key, value) in item {
        match key.as_str() {
            k if CONTROL_KEYS.contains(&k) => {}
            op @ ("addattr" | "delattr" | "setattr") => {
                for pair in as_list(value.clone()).as_array().into_iter().flatten() {
                    let pair = plain_string(pair);
                    let (attr, text) = pair.split_once('=').ok_or_else(|| {
                        Fault::new(3009, "ValidationError", format!("invalid '{op}': {pair}"))
                    })?;
                    let val = Value::String(text.to_string());
                    match op {
                        "addattr" => {
                            push_values(attrs, attr, val);
                        }
                        "delattr" => {
                            if drop_values(attrs, attr, val) == 0 {
                                return Err(Fault::new(
                                    3009,
                                    "ValidationError",
                                    format!("{attr} does not contain '{text}'"),
                                ));
                            }
                        }
                        _ => {
                            attrs.insert(attr.to_string(), as_list(val));
                        }
                    }
                }
            }
            name => {
                let spec = schema.attribute(name).ok_or_else(|| {
                    Fault::new(3005, "OptionError", format!("Unknown option: {name}"))
                })?;
                let value = unwrap_incoming(value);
                if value.is_null() {
                    attrs.remove(spec.response_key());
                } else {
                    attrs.insert(spec.response_key().to_string(), as_list(value));
                }
            }
        }
    }
    Ok(())
}

fn find(
    schema: &ObjectSchema,
    entries: &[Entry],
    positional: &[Value],
    item: &Map<String, Value>,
) -> Value {
    let mut args = positional.iter();
    let criteria: Vec<(usize, String)> = identity_specs(schema)
        .enumerate()
        .filter_map(|(i, spec)| {
            let value = if spec.find_keyword {
                item.get(&spec.name).map(plain_string)
            } else {
                args.next().map(plain_string)
            };
            value.map(|v| (i, v.to_ascii_lowercase()))
        })
        .collect();

    let found: Vec<Value> = entries
        .iter()
        .filter(|entry| {
            criteria.iter().all(|(i, wanted)| {
                entry
                    .identity
                    .get(*i)
                    .is_some_and(|have| have.to_ascii_lowercase().contains(wanted.as_str()))
            })
        })
        .map(|entry| render(schema, entry))
        .collect();

    json!({
        "count": found.len(),
        "truncated": false,
        "summary": format!("{} {} matched", found.len(), schema.name()),
        "result": found,
    })
}

fn add(
    schema: &ObjectSchema,
    entries: &mut Vec<Entry>,
    positional: &[Value],
    item: &Map<String, Value>,
) -> Reply {
    let identity = identity_of(schema, positional)?;
    if entries.iter().any(|e| e.matches(&identity)) {
        return Err(Fault::new(
            4002,
            "DuplicateEntry",
            format!(
                "{} with name \"{}\" already exists",
                schema.name(),
                primary_key(&identity)
            ),
        ));
    }
    let mut entry = Entry::new(schema, identity);
    apply_item(schema, &mut entry.attrs, item)?;
    let pk = primary_key(&entry.identity).to_string();
    let rendered = render(schema, &entry);
    entries.push(entry);
    Ok(json!({
        "result": rendered,
        "value": pk,
        "summary": format!("Added {} \"{pk}\"", schema.name()),
    }))
}

fn modify(
    schema: &ObjectSchema,
    entries: &mut [Entry],
    positional: &[Value],
    item: &Map<String, Value>,
) -> Reply {
    let identity = identity_of(schema, positional)?;
    let entry = entries
        .iter_mut()
        .find(|e| e.matches(&identity))
        .ok_or_else(|| Fault::not_found(schema, &identity))?;

    let mut attrs = entry.attrs.clone();
    apply_item(schema, &mut attrs, item)?;
    if attrs == entry.attrs {
        return Err(Fault::new(4202, "EmptyModlist", "no modifications to be performed"));
    }
    entry.attrs = attrs;
    Ok(json!({
        "result": render(schema, entry),
        "value": primary_key(&identity),
        "summary": format!("Modified {} \"{}\"", schema.name(), primary_key(&identity)),
    }))
}

fn remove(schema: &ObjectSchema, entries: &mut Vec<Entry>, positional: &[Value]) -> Reply {
    let identity = identity_of(schema, positional)?;
    let index = entries
        .iter()
        .position(|e| e.matches(&identity))
        .ok_or_else(|| Fault::not_found(schema, &identity))?;
    entries.remove(index);
    Ok(json!({
        "result": {"failed": []},
        "value": [primary_key(&identity)],
        "summary": format!("Deleted {} \"{}\"", schema.name(), primary_key(&identity)),
    }))
}

fn set_enabled(
    schema: &ObjectSchema,
    entries: &mut [Entry],
    positional: &[Value],
    enabled: bool,
) -> Reply {
    let identity = identity_of(schema, positional)?;
    let entry = entries
        .iter_mut()
        .find(|e| e.matches(&identity))
        .ok_or_else(|| Fault::not_found(schema, &identity))?;
    let Some(spec) = schema.enable() else {
        return Err(Fault::new(905, "CommandError", "object type cannot be enabled"));
    };

    let current = schema
        .is_enabled(&RemoteObject::from(entry.attrs.clone()))
        .unwrap_or(true);
    if current == enabled {
        let (code, name, state) = if enabled {
            (4204, "AlreadyActive", "enabled")
        } else {
            (4205, "AlreadyInactive", "disabled")
        };
        return Err(Fault::new(code, name, format!("This entry is already {state}")));
    }

    let key = schema
        .attribute(&spec.attribute)
        .map_or(spec.attribute.as_str(), AttributeSpec::response_key)
        .to_string();
    entry
        .attrs
        .insert(key, json!([spec.stored_value(enabled)]));
    let verb = if enabled { "Enabled" } else { "Disabled" };
    Ok(json!({
        "result": true,
        "value": primary_key(&identity),
        "summary": format!("{verb} {} \"{}\"", schema.name(), primary_key(&identity)),
    }))
}

/// Values a routed call carries for one attribute.
fn routed_values(
    spec: &AttributeSpec,
    positional: &[Value],
    item: &Map<String, Value>,
    identity_len: usize,
) -> Option<Value> {
    let route = spec.route.as_ref()?;
    let raw = match route.style {
        RouteStyle::Keyword => item.get(&route.param)?,
        RouteStyle::Positional => positional.get(identity_len)?,
    };
    Some(unwrap_incoming(raw))
}

fn list_add(
    schema: &ObjectSchema,
    entries: &mut Vec<Entry>,
    specs: &[&AttributeSpec],
    positional: &[Value],
    item: &Map<String, Value>,
) -> Reply {
    let identity = identity_of(schema, positional)?;
    let index = match entries.iter().position(|e| e.matches(&identity)) {
        Some(index) => index,
        None if schema.creation() == Creation::Implicit => {
            entries.push(Entry::new(schema, identity.clone()));
            entries.len() - 1
        }
        None => return Err(Fault::not_found(schema, &identity)),
    };
    let entry = &mut entries[index];

    let mut completed = 0;
    for spec in specs {
        if let Some(values) = routed_values(spec, positional, item, identity.len()) {
            completed += push_values(&mut entry.attrs, spec.response_key(), values);
        }
    }
    Ok(json!({
        "completed": completed,
        "failed": {},
        "result": render(schema, entry),
    }))
}

fn list_remove(
    schema: &ObjectSchema,
    entries: &mut Vec<Entry>,
    specs: &[&AttributeSpec],
    positional: &[Value],
    item: &Map<String, Value>,
) -> Reply {
    let identity = identity_of(schema, positional)?;
    let index = entries
        .iter()
        .position(|e| e.matches(&identity))
        .ok_or_else(|| Fault::not_found(schema, &identity))?;

    let mut completed = 0;
    {
        let entry = &mut entries[index];
        for spec in specs {
            if let Some(values) = routed_values(spec, positional, item, identity.len()) {
                completed += drop_values(&mut entry.attrs, spec.response_key(), values);
            }
        }
    }

    // Implicitly created objects disappear with their last list value.
    let emptied = schema.creation() == Creation::Implicit
        && !schema
            .attributes()
            .iter()
            .filter(|a| a.route.is_some())
            .any(|a| entries[index].attrs.contains_key(a.response_key()));
    if emptied {
        entries.remove(index);
        return Ok(json!({
            "result": {"failed": []},
            "value": [primary_key(&identity)],
            "summary": format!("Deleted {} \"{}\"", schema.name(), primary_key(&identity)),
        }));
    }

    Ok(json!({
        "completed": completed,
        "failed": {},
        "result": render(schema, &entries[index]),
    }))
}
