//! Difference between a current remote object and a requested state.
//!
//! Both sides are canonicalized through the schema first: identity keys and
//! attributes that do not apply to the action are dropped, values are
//! normalized and coerced. List attributes are then compared as sets and
//! scalar attributes by value. Every list in the result is sorted.

use crate::error::ReconcileError;
use crate::schema::{Action, ObjectSchema};
use crate::types::{AttrValue, DesiredState, RemoteObject, Scalar, TargetState};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Canonical attribute view: attribute name to normalized value.
pub type Canonical = BTreeMap<String, AttrValue>;

/// Changes needed to move an object from its current to its requested state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    /// Scalars to assign; [`Scalar::Null`] clears the attribute.
    pub scalar_assignments: BTreeMap<String, Scalar>,
    /// List values to add, per attribute.
    pub list_adds: BTreeMap<String, Vec<Scalar>>,
    /// List values to remove, per attribute.
    pub list_removes: BTreeMap<String, Vec<Scalar>>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.scalar_assignments.is_empty() && self.list_adds.is_empty() && self.list_removes.is_empty()
    }

    /// Take the enable attribute's assignment out of the scalar assignments.
    pub fn take_scalar(&mut self, attribute: &str) -> Option<Scalar> {
        self.scalar_assignments.remove(attribute)
    }
}

/// Canonicalize a current remote object for `action`.
///
/// Response keys are mapped back to attribute names; keys the schema does not
/// declare (`dn`, `objectclass`, ...) are ignored.
pub fn canonicalize_current(
    current: &RemoteObject,
    schema: &ObjectSchema,
    action: Action,
    include_enable: bool,
) -> Result<Canonical, ReconcileError> {
    let mut out = Canonical::new();
    for (key, raw) in current.iter() {
        let Some(spec) = schema.attribute_by_response_key(key) else {
            continue;
        };
        if spec.identity || !spec.applies_to(action) {
            continue;
        }
        if schema.is_enable_attribute(&spec.name) && !include_enable {
            continue;
        }
        out.insert(spec.name.clone(), spec.normalize_value(raw)?);
    }
    Ok(out)
}

/// Canonicalize the requested attributes for `action`.
pub fn canonicalize_desired(
    desired: &DesiredState,
    schema: &ObjectSchema,
    action: Action,
) -> Result<Canonical, ReconcileError> {
    let mut out = Canonical::new();
    for (name, value) in &desired.attributes {
        let spec = schema.attribute(name).ok_or_else(|| {
            ReconcileError::validation(
                name,
                format!("not an attribute of object type '{}'", schema.name()),
            )
        })?;
        if spec.identity || !spec.applies_to(action) || schema.is_enable_attribute(name) {
            continue;
        }
        out.insert(name.clone(), spec.normalize_value(&value.to_json())?);
    }
    Ok(out)
}

/// Compute the change set for `desired` against `current`.
pub fn compute(
    current: &RemoteObject,
    desired: &DesiredState,
    schema: &ObjectSchema,
    action: Action,
) -> Result<ChangeSet, ReconcileError> {
    let forced = desired.state.forced_enable().zip(schema.enable());
    let mut have = canonicalize_current(current, schema, action, forced.is_some())?;
    let mut want = canonicalize_desired(desired, schema, action)?;

    if let Some((enabled, enable)) = forced {
        want.insert(
            enable.attribute.clone(),
            AttrValue::Scalar(Scalar::Bool(enable.stored_value(enabled))),
        );
        let stored_when_missing = AttrValue::Scalar(Scalar::Bool(enable.stored_value(true)));
        match have.get(&enable.attribute) {
            None | Some(AttrValue::Scalar(Scalar::Null)) => {
                have.insert(enable.attribute.clone(), stored_when_missing);
            }
            Some(_) => {}
        }
    }

    let mut changes = ChangeSet::default();
    match desired.state {
        TargetState::Present | TargetState::Enabled | TargetState::Disabled => {
            additions(&have, &want, &mut changes);
        }
        TargetState::Exact => {
            additions(&have, &want, &mut changes);
            exact_removals(&have, &want, &mut changes);
        }
        TargetState::Absent => {
            for (name, wanted) in &want {
                let AttrValue::List(wanted) = wanted else { continue };
                let present = list_set(have.get(name));
                let removes: Vec<Scalar> = wanted
                    .iter()
                    .filter(|v| present.contains(*v))
                    .cloned()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                if !removes.is_empty() {
                    changes.list_removes.insert(name.clone(), removes);
                }
            }
        }
    }
    Ok(changes)
}

fn additions(have: &Canonical, want: &Canonical, changes: &mut ChangeSet) {
    for (name, wanted) in want {
        match wanted {
            AttrValue::List(values) => {
                let present = list_set(have.get(name));
                let adds: BTreeSet<Scalar> = values
                    .iter()
                    .filter(|v| !present.contains(*v))
                    .cloned()
                    .collect();
                if !adds.is_empty() {
                    changes
                        .list_adds
                        .insert(name.clone(), adds.into_iter().collect());
                }
            }
            AttrValue::Scalar(value) => {
                let current = match have.get(name) {
                    Some(AttrValue::Scalar(s)) => s,
                    _ => &Scalar::Null,
                };
                if current != value {
                    changes.scalar_assignments.insert(name.clone(), value.clone());
                }
            }
        }
    }
}

fn exact_removals(have: &Canonical, want: &Canonical, changes: &mut ChangeSet) {
    for (name, current) in have {
        match current {
            AttrValue::List(values) => {
                let wanted = list_set(want.get(name));
                let removes: BTreeSet<Scalar> = values
                    .iter()
                    .filter(|v| !wanted.contains(*v))
                    .cloned()
                    .collect();
                if !removes.is_empty() {
                    changes
                        .list_removes
                        .insert(name.clone(), removes.into_iter().collect());
                }
            }
            AttrValue::Scalar(value) => {
                if !value.is_null() && !want.contains_key(name) {
                    changes.scalar_assignments.insert(name.clone(), Scalar::Null);
                }
            }
        }
    }
}

fn list_set(value: Option<&AttrValue>) -> BTreeSet<&Scalar> {
    value.map(|v| v.values().iter().collect()).unwrap_or_default()
}

/// Reject requested values for attributes that cannot be written by `action`
/// when they differ from what the object already has.
///
/// Re-stating an unchangeable value that already matches is fine. Attributes
/// the service does not report (write-only ones such as passwords) are
/// skipped.
pub fn check_applicability(
    current: &RemoteObject,
    desired: &DesiredState,
    schema: &ObjectSchema,
    action: Action,
) -> Result<(), ReconcileError> {
    for (name, value) in &desired.attributes {
        let Some(spec) = schema.attribute(name) else {
            continue;
        };
        if spec.identity || spec.applies_to(action) || schema.is_enable_attribute(name) {
            continue;
        }
        let Some(raw) = current.get(spec.response_key()) else {
            continue;
        };
        let wanted = spec.normalize_value(&value.to_json())?;
        let have = spec.normalize_value(raw)?;
        let same = match (&wanted, &have) {
            (AttrValue::List(a), AttrValue::List(b)) => {
                a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
            }
            (a, b) => a == b,
        };
        if !same {
            return Err(ReconcileError::validation(
                name,
                format!("cannot be changed once the {} exists", schema.name()),
            ));
        }
    }
    Ok(())
}
