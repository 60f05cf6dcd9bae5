//! Drives one object from its current to its requested state.
//!
//! ```text
//! validate -> find -> { no-op (absent) | remove whole | apply changes } -> done
//! ```
//!
//! Applying changes issues, in order: one add/modify call for scalar
//! assignments (and creation), one enable/disable call, then one batched call
//! per list method with all additions before all removals. A fault aborts the
//! remaining calls; earlier calls are not rolled back.

use crate::diff::{self, ChangeSet};
use crate::error::ReconcileError;
use crate::gateway::RemoteObjectGateway;
use crate::schema::{Action, Creation, ObjectSchema, RouteStyle, encode_value};
use crate::trace::{RequestTrace, Stage};
use crate::types::{AttrValue, DesiredState, Identity, RemoteCall, RemoteObject, Scalar, TargetState};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Result of [`Reconciler::ensure`].
#[derive(Debug, Clone, PartialEq)]
pub struct EnsureOutcome {
    pub changed: bool,
    pub object_type: String,
    /// Last object the service returned, or the object as found.
    pub object: RemoteObject,
    /// Mutating calls issued, or that would have been issued under dry run.
    pub calls: Vec<RemoteCall>,
    pub dry_run: bool,
}

/// Serializes as `{"changed": bool, "<object type>": object}`.
impl Serialize for EnsureOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("changed", &self.changed)?;
        map.serialize_entry(&self.object_type, &self.object)?;
        map.end()
    }
}

/// Reconciles objects of one type through a gateway.
pub struct Reconciler<'a, G: ?Sized> {
    schema: &'a ObjectSchema,
    gateway: &'a G,
    verbose_trace: bool,
}

/// Calls issued so far in one `ensure`.
struct Run<'t> {
    dry_run: bool,
    calls: Vec<RemoteCall>,
    trace: &'t mut RequestTrace,
}

impl<'a, G: RemoteObjectGateway + ?Sized> Reconciler<'a, G> {
    pub fn new(schema: &'a ObjectSchema, gateway: &'a G) -> Self {
        Self {
            schema,
            gateway,
            verbose_trace: false,
        }
    }

    /// Also emit the request trace when reconciliation succeeds.
    #[must_use]
    pub fn with_verbose_trace(mut self, verbose: bool) -> Self {
        self.verbose_trace = verbose;
        self
    }

    pub fn schema(&self) -> &ObjectSchema {
        self.schema
    }

    pub fn ensure(&self, desired: &DesiredState) -> Result<EnsureOutcome, ReconcileError> {
        let mut trace = RequestTrace::new(self.schema.name());
        match self.ensure_traced(desired, &mut trace) {
            Ok(outcome) => {
                if self.verbose_trace {
                    trace.emit();
                }
                Ok(outcome)
            }
            Err(err) => {
                trace.record(Stage::Fault, err.method(), err.to_string());
                trace.emit_failure(&err);
                Err(err)
            }
        }
    }

    /// [`ensure`](Self::ensure) with a caller-owned trace.
    pub fn ensure_traced(
        &self,
        desired: &DesiredState,
        trace: &mut RequestTrace,
    ) -> Result<EnsureOutcome, ReconcileError> {
        let schema = self.schema;
        let identity = self.validate(desired)?;
        trace.record(Stage::Validate, None, format!("state={}", desired.state));

        let current = self.gateway.find(schema, &identity)?;
        trace.record(
            Stage::Find,
            Some(&schema.methods().find),
            if current.is_empty() { "not found" } else { "found" },
        );

        let mut run = Run {
            dry_run: desired.dry_run,
            calls: Vec::new(),
            trace,
        };

        if desired.state == TargetState::Absent {
            if current.is_empty() {
                return Ok(self.finish(run, RemoteObject::new()));
            }
            if !desired.has_list_attributes(schema) {
                let call = RemoteCall::new(&schema.methods().remove, schema.positional(&identity, false))
                    .with_item(schema.remove_args().clone());
                self.issue(call, &mut run)?;
                return Ok(self.finish(run, RemoteObject::new()));
            }
        }

        let action = if current.is_empty() {
            Action::Add
        } else {
            Action::Modify
        };
        if desired.state != TargetState::Absent {
            diff::check_applicability(&current, desired, schema, action)?;
        }

        let mut changes = diff::compute(&current, desired, schema, action)?;
        let enable_target = match (desired.state.forced_enable(), schema.enable()) {
            (Some(enabled), Some(spec)) => {
                changes.take_scalar(&spec.attribute);
                Some(enabled)
            }
            _ => None,
        };
        run.trace.record(
            Stage::Plan,
            None,
            format!(
                "action={action:?} scalars={} list_adds={} list_removes={}",
                changes.scalar_assignments.len(),
                changes.list_adds.len(),
                changes.list_removes.len()
            ),
        );
        debug!(object_type = schema.name(), ?action, ?changes, "computed changes");

        let mut baseline = current;
        let mut last: Option<RemoteObject> = None;

        if let Some(call) = primary_call(schema, &identity, action, &mut changes) {
            if let Some(response) = self.issue(call, &mut run)? {
                baseline = response.clone();
                last = Some(response);
            }
        }

        if let (Some(enabled), Some(spec)) = (enable_target, schema.enable()) {
            if schema.is_enabled(&baseline)? != enabled {
                let method = if enabled {
                    &schema.methods().enable
                } else {
                    &schema.methods().disable
                };
                let call = RemoteCall::new(method, schema.positional(&identity, false));
                if let Some(response) = self.issue(call, &mut run)? {
                    // Enable methods answer with a bare flag, not the object.
                    let object = if response.is_empty() {
                        let mut object = baseline.clone();
                        object.insert(
                            spec.attribute.clone(),
                            Value::Bool(spec.stored_value(enabled)),
                        );
                        object
                    } else {
                        response
                    };
                    last = Some(object);
                }
            }
        }

        for call in plan_list_calls(schema, &identity, &changes) {
            if let Some(response) = self.issue(call, &mut run)? {
                last = Some(response);
            }
        }

        Ok(self.finish(run, last.unwrap_or(baseline)))
    }

    /// Check a requested state before anything is sent; returns the
    /// normalized identity.
    pub fn validate(&self, desired: &DesiredState) -> Result<Identity, ReconcileError> {
        let schema = self.schema;
        for name in desired.identity.keys() {
            if !schema.is_identity(name) {
                return Err(ReconcileError::validation(
                    name,
                    format!("not an identity key of object type '{}'", schema.name()),
                ));
            }
        }

        let mut identity = Identity::new();
        for key in schema.identity_keys() {
            let value = desired
                .identity
                .get(key)
                .ok_or_else(|| ReconcileError::validation(key, "identity value is required"))?;
            let normalized = schema.normalize(key, &value.to_json())?;
            if matches!(normalized, AttrValue::Scalar(Scalar::Null)) {
                return Err(ReconcileError::validation(key, "identity value must not be empty"));
            }
            identity.insert(key.to_string(), normalized);
        }

        for (name, value) in &desired.attributes {
            let spec = schema.attribute(name).ok_or_else(|| {
                ReconcileError::validation(
                    name,
                    format!("not an attribute of object type '{}'", schema.name()),
                )
            })?;
            if spec.identity {
                return Err(ReconcileError::validation(
                    name,
                    "is an identity key and belongs in the identity",
                ));
            }
            if schema.is_enable_attribute(name) {
                return Err(ReconcileError::validation(
                    name,
                    "is controlled through the enabled and disabled states",
                ));
            }
            spec.normalize_value(&value.to_json())?;
        }

        if desired.state.forced_enable().is_some() && schema.enable().is_none() {
            return Err(ReconcileError::validation(
                "state",
                format!(
                    "object type '{}' has no enable attribute, so it cannot be {}",
                    schema.name(),
                    desired.state
                ),
            ));
        }
        Ok(identity)
    }

    fn issue(&self, call: RemoteCall, run: &mut Run<'_>) -> Result<Option<RemoteObject>, ReconcileError> {
        if run.dry_run {
            debug!(call = %call, "dry run, not sending");
            run.trace.record(Stage::Skipped, Some(&call.method), call.to_string());
            run.calls.push(call);
            return Ok(None);
        }
        run.trace.record(Stage::Call, Some(&call.method), call.to_string());
        let response = self.gateway.invoke(self.schema, &call)?;
        run.calls.push(call);
        Ok(Some(response))
    }

    fn finish(&self, run: Run<'_>, object: RemoteObject) -> EnsureOutcome {
        let changed = !run.calls.is_empty();
        run.trace.record(
            Stage::Done,
            None,
            format!("changed={changed} calls={}", run.calls.len()),
        );
        info!(
            object_type = self.schema.name(),
            changed,
            calls = run.calls.len(),
            dry_run = run.dry_run,
            "ensure complete"
        );
        EnsureOutcome {
            changed,
            object_type: self.schema.name().to_string(),
            object,
            calls: run.calls,
            dry_run: run.dry_run,
        }
    }
}

/// The add or modify call carrying scalar assignments, if one is needed.
///
/// Creating an explicitly created object always needs one. Unrouted list
/// additions ride along with a create; routed ones never do.
fn primary_call(
    schema: &ObjectSchema,
    identity: &Identity,
    action: Action,
    changes: &mut ChangeSet,
) -> Option<RemoteCall> {
    let creates = action == Action::Add && schema.creation() == Creation::Explicit;
    if changes.scalar_assignments.is_empty() && !creates {
        return None;
    }

    let mut item = Map::new();
    for (name, value) in std::mem::take(&mut changes.scalar_assignments) {
        if let Some(spec) = schema.attribute(&name) {
            item.insert(name, encode_value(spec, &AttrValue::Scalar(value)));
        }
    }
    if creates {
        let inline: Vec<String> = changes
            .list_adds
            .keys()
            .filter(|name| schema.attribute(name).is_some_and(|s| s.route.is_none()))
            .cloned()
            .collect();
        for name in inline {
            if let (Some(values), Some(spec)) = (changes.list_adds.remove(&name), schema.attribute(&name)) {
                item.insert(name, encode_value(spec, &AttrValue::List(values)));
            }
        }
    }
    item.insert("all".to_string(), Value::Bool(true));

    let method = match action {
        Action::Add => &schema.methods().add,
        _ => &schema.methods().modify,
    };
    Some(RemoteCall::new(method, schema.positional(identity, false)).with_item(item))
}

/// One batched call per list method: all additions, then all removals, each
/// phase ordered by method name.
pub fn plan_list_calls(schema: &ObjectSchema, identity: &Identity, changes: &ChangeSet) -> Vec<RemoteCall> {
    let mut calls = plan_phase(schema, identity, &changes.list_adds, true);
    calls.extend(plan_phase(schema, identity, &changes.list_removes, false));
    calls
}

fn plan_phase(
    schema: &ObjectSchema,
    identity: &Identity,
    lists: &BTreeMap<String, Vec<Scalar>>,
    adding: bool,
) -> Vec<RemoteCall> {
    let positional = schema.positional(identity, false);
    let mut routed: BTreeMap<String, RemoteCall> = BTreeMap::new();
    let mut generic: BTreeSet<String> = BTreeSet::new();

    for (name, values) in lists {
        let Some(spec) = schema.attribute(name) else {
            continue;
        };
        let Some(route) = &spec.route else {
            generic.extend(values.iter().map(|v| format!("{}={v}", spec.response_key())));
            continue;
        };
        let method = if adding {
            &route.add_method
        } else {
            &route.remove_method
        };
        let call = routed
            .entry(method.clone())
            .or_insert_with(|| RemoteCall::new(method, positional.clone()));
        let encoded = encode_value(spec, &AttrValue::List(values.clone()));
        match route.style {
            RouteStyle::Keyword => {
                call.item.insert(route.param.clone(), encoded);
            }
            RouteStyle::Positional => call.positional.push(encoded),
        }
    }

    if !generic.is_empty() {
        let key = if adding { "addattr" } else { "delattr" };
        let strings = generic.into_iter().map(Value::String).collect();
        let call = RemoteCall::new(&schema.methods().modify, positional)
            .arg(key, Value::Array(strings))
            .arg("all", Value::Bool(true));
        // A routed method may share the modify name only in odd schemas; merge.
        match routed.get_mut(&call.method) {
            Some(existing) => existing.item.extend(call.item),
            None => {
                routed.insert(call.method.clone(), call);
            }
        }
    }

    routed.into_values().collect()
}
