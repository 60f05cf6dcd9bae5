//! Static per-object-type attribute declarations.
//!
//! An [`ObjectSchema`] says, for one directory object type, which attributes
//! exist, whether they are scalar or list-valued, which actions they take part
//! in, which of them identify the object, and how their values are normalized
//! before comparison. Per-type quirks (renamed response keys, wrapped values,
//! dedicated list methods) are data or named hook functions on the schema.
//!
//! Schemas are built with [`ObjectSchema::builder`] and validated when built,
//! so a misdeclared type fails at startup rather than mid-reconciliation.

use crate::error::{ReconcileError, SchemaError};
use crate::types::{AttrValue, Identity, RemoteObject, Scalar};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// What a request intends to do with an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Add,
    Modify,
    Remove,
    Find,
}

impl Action {
    pub const ALL: [Action; 4] = [Self::Add, Self::Modify, Self::Remove, Self::Find];

    const fn bit(self) -> u8 {
        match self {
            Self::Add => 0b0001,
            Self::Modify => 0b0010,
            Self::Remove => 0b0100,
            Self::Find => 0b1000,
        }
    }
}

/// Set of actions an attribute applies to.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionSet(u8);

impl ActionSet {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self(0b1111);
    /// Default for managed attributes: written on create and update, removable.
    pub const MANAGED: Self = Self(0b0111);

    pub const fn of(actions: &[Action]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < actions.len() {
            bits |= actions[i].bit();
            i += 1;
        }
        Self(bits)
    }

    #[must_use]
    pub const fn with(self, action: Action) -> Self {
        Self(self.0 | action.bit())
    }

    pub const fn contains(self, action: Action) -> bool {
        self.0 & action.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Action> {
        Action::ALL.into_iter().filter(move |a| self.contains(*a))
    }
}

impl fmt::Debug for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for ActionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    Scalar,
    List,
}

/// Value type both sides are coerced to before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Str,
    Int,
    Bool,
}

/// How a value is written into a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Plain,
    /// `{"__base64__": value}`
    Base64,
    /// `{"__dns_name__": value}`
    DnsName,
}

impl Encoding {
    pub fn encode(self, value: &Scalar) -> Value {
        match self {
            _ if value.is_null() => Value::Null,
            Self::Plain => value.to_json(),
            Self::Base64 => wrap("__base64__", value),
            Self::DnsName => wrap("__dns_name__", value),
        }
    }
}

fn wrap(key: &str, value: &Scalar) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value.to_json());
    Value::Object(map)
}

/// Where routed list values go in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteStyle {
    /// `item[param] = [values]`
    Keyword,
    /// Appended as one extra positional element after the identity.
    Positional,
}

/// Dedicated remote methods for adding to and removing from a list attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListRoute {
    pub add_method: String,
    pub remove_method: String,
    pub param: String,
    pub style: RouteStyle,
}

/// A named pure function stored in a schema.
#[derive(Clone, Copy)]
pub struct Hook<F> {
    name: &'static str,
    func: F,
}

impl<F: Copy> Hook<F> {
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn func(&self) -> F {
        self.func
    }
}

impl<F> fmt::Debug for Hook<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hook({})", self.name)
    }
}

impl<F> Serialize for Hook<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

/// Maps one raw element to its comparable form, or explains why it can't.
pub type ValueNormalizer = Hook<fn(&Value) -> Result<Value, String>>;
/// Keeps only the find results that really are the requested object.
pub type FindPredicate = Hook<fn(&ObjectSchema, &Identity, &Value) -> bool>;
/// Rewrites a coerced response before anyone else sees it.
pub type ResponseHook = Hook<fn(&mut RemoteObject, &Identity)>;

/// One managed attribute of an object type.
#[derive(Debug, Clone, Serialize)]
pub struct AttributeSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_name: Option<String>,
    pub cardinality: Cardinality,
    pub kind: ValueKind,
    pub actions: ActionSet,
    pub identity: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub find_keyword: bool,
    pub encoding: Encoding,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalizer: Option<ValueNormalizer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<ListRoute>,
}

impl AttributeSpec {
    fn base(name: &str, cardinality: Cardinality) -> Self {
        Self {
            name: name.to_string(),
            remote_name: None,
            cardinality,
            kind: ValueKind::Str,
            actions: ActionSet::MANAGED,
            identity: false,
            find_keyword: false,
            encoding: Encoding::Plain,
            normalizer: None,
            route: None,
        }
    }

    pub fn scalar(name: &str) -> Self {
        Self::base(name, Cardinality::Scalar)
    }

    pub fn list(name: &str) -> Self {
        Self::base(name, Cardinality::List)
    }

    /// A scalar string identity key usable in every action.
    pub fn identity(name: &str) -> Self {
        Self {
            identity: true,
            actions: ActionSet::ALL,
            ..Self::base(name, Cardinality::Scalar)
        }
    }

    #[must_use]
    pub fn int(mut self) -> Self {
        self.kind = ValueKind::Int;
        self
    }

    #[must_use]
    pub fn bool(mut self) -> Self {
        self.kind = ValueKind::Bool;
        self
    }

    /// Key under which the service reports this attribute.
    #[must_use]
    pub fn remote(mut self, remote_name: &str) -> Self {
        self.remote_name = Some(remote_name.to_string());
        self
    }

    #[must_use]
    pub fn actions(mut self, actions: ActionSet) -> Self {
        self.actions = actions;
        self
    }

    #[must_use]
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    #[must_use]
    pub fn normalize(mut self, normalizer: ValueNormalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Pass this identity key as a keyword filter in find requests.
    #[must_use]
    pub fn find_keyword(mut self) -> Self {
        self.find_keyword = true;
        self
    }

    /// Route additions and removals through dedicated methods, passing the
    /// values as `item[param]`.
    #[must_use]
    pub fn routed(mut self, add_method: &str, remove_method: &str, param: &str) -> Self {
        self.route = Some(ListRoute {
            add_method: add_method.to_string(),
            remove_method: remove_method.to_string(),
            param: param.to_string(),
            style: RouteStyle::Keyword,
        });
        self
    }

    /// Route additions and removals through dedicated methods, passing the
    /// values as an extra positional element.
    #[must_use]
    pub fn routed_positional(mut self, add_method: &str, remove_method: &str) -> Self {
        self.route = Some(ListRoute {
            add_method: add_method.to_string(),
            remove_method: remove_method.to_string(),
            param: self.name.clone(),
            style: RouteStyle::Positional,
        });
        self
    }

    pub fn is_list(&self) -> bool {
        self.cardinality == Cardinality::List
    }

    pub fn applies_to(&self, action: Action) -> bool {
        self.actions.contains(action)
    }

    /// Key this attribute has in service responses.
    pub fn response_key(&self) -> &str {
        self.remote_name.as_deref().unwrap_or(&self.name)
    }

    /// Canonicalize one raw value (scalar, list, or wrapped) for this
    /// attribute: run the normalizer on each element, coerce each element to
    /// `kind`, then shape to the declared cardinality.
    pub fn normalize_value(&self, raw: &Value) -> Result<AttrValue, ReconcileError> {
        let elements: Vec<&Value> = match raw {
            Value::Array(items) => items.iter().collect(),
            Value::Null => Vec::new(),
            other => vec![other],
        };

        let mut scalars = Vec::with_capacity(elements.len());
        for element in elements {
            let normalized;
            let element = match &self.normalizer {
                Some(hook) => {
                    normalized = (hook.func())(element)
                        .map_err(|reason| ReconcileError::validation(&self.name, reason))?;
                    &normalized
                }
                None => element,
            };
            let scalar = coerce(self.kind, element)
                .map_err(|reason| ReconcileError::validation(&self.name, reason))?;
            if !scalar.is_null() {
                scalars.push(scalar);
            }
        }

        match self.cardinality {
            Cardinality::List => Ok(AttrValue::List(scalars)),
            Cardinality::Scalar => match scalars.len() {
                0 => Ok(AttrValue::Scalar(Scalar::Null)),
                1 => Ok(AttrValue::Scalar(scalars.remove(0))),
                n => Err(ReconcileError::validation(
                    &self.name,
                    format!("expected a single value, got {n}"),
                )),
            },
        }
    }
}

/// Coerce one JSON element to a scalar of the given kind.
fn coerce(kind: ValueKind, value: &Value) -> Result<Scalar, String> {
    match (kind, value) {
        (_, Value::Null) => Ok(Scalar::Null),
        (ValueKind::Str, Value::String(s)) => Ok(Scalar::Str(s.clone())),
        (ValueKind::Str, Value::Number(n)) => Ok(Scalar::Str(n.to_string())),
        (ValueKind::Str, Value::Bool(b)) => Ok(Scalar::Str(Scalar::Bool(*b).to_string())),
        (ValueKind::Int, Value::Number(n)) => n
            .as_i64()
            .map(Scalar::Int)
            .ok_or_else(|| format!("{n} is not an integer")),
        (ValueKind::Int, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Scalar::Int)
            .map_err(|_| format!("'{s}' is not an integer")),
        (ValueKind::Bool, Value::Bool(b)) => Ok(Scalar::Bool(*b)),
        (ValueKind::Bool, Value::String(s)) => parse_bool(s)
            .map(Scalar::Bool)
            .ok_or_else(|| format!("'{s}' is not a boolean")),
        (ValueKind::Bool, Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Scalar::Bool(false)),
            Some(1) => Ok(Scalar::Bool(true)),
            _ => Err(format!("{n} is not a boolean")),
        },
        (kind, other) => Err(format!("expected {}, got {other}", kind.describe())),
    }
}

impl ValueKind {
    fn describe(self) -> &'static str {
        match self {
            Self::Str => "a string",
            Self::Int => "an integer",
            Self::Bool => "a boolean",
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// The attribute that carries an object's enabled flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnableSpec {
    pub attribute: String,
    /// The attribute stores "disabled" rather than "enabled" (e.g. an account
    /// lock flag).
    pub inverted: bool,
}

impl EnableSpec {
    /// Attribute value that expresses `enabled`.
    pub fn stored_value(&self, enabled: bool) -> bool {
        enabled != self.inverted
    }
}

/// How an object first comes into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Creation {
    /// The add method creates it.
    #[default]
    Explicit,
    /// Its first list addition creates it; no separate add call.
    Implicit,
}

/// Remote method names for one object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodTable {
    pub add: String,
    pub modify: String,
    pub remove: String,
    pub find: String,
    pub enable: String,
    pub disable: String,
}

impl MethodTable {
    pub fn for_type(name: &str) -> Self {
        Self {
            add: format!("{name}_add"),
            modify: format!("{name}_mod"),
            remove: format!("{name}_del"),
            find: format!("{name}_find"),
            enable: format!("{name}_enable"),
            disable: format!("{name}_disable"),
        }
    }
}

/// Full declaration of one object type.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectSchema {
    name: String,
    methods: MethodTable,
    attributes: Vec<AttributeSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enable: Option<EnableSpec>,
    creation: Creation,
    #[serde(skip_serializing_if = "Map::is_empty")]
    find_args: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    remove_args: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    find_predicate: Option<FindPredicate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_hook: Option<ResponseHook>,
}

impl ObjectSchema {
    pub fn builder(name: &str) -> ObjectSchemaBuilder {
        ObjectSchemaBuilder {
            schema: ObjectSchema {
                name: name.to_string(),
                methods: MethodTable::for_type(name),
                attributes: Vec::new(),
                enable: None,
                creation: Creation::Explicit,
                find_args: Map::new(),
                remove_args: Map::new(),
                find_predicate: None,
                response_hook: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    pub fn attributes(&self) -> &[AttributeSpec] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Look up an attribute by the key the service uses in responses.
    pub fn attribute_by_response_key(&self, key: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|a| a.response_key() == key)
    }

    pub fn attributes_for(&self, action: Action) -> impl Iterator<Item = &AttributeSpec> {
        self.attributes.iter().filter(move |a| a.applies_to(action))
    }

    /// Identity attribute names in positional order.
    pub fn identity_keys(&self) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|a| a.identity)
            .map(|a| a.name.as_str())
            .collect()
    }

    pub fn is_identity(&self, name: &str) -> bool {
        self.attribute(name).is_some_and(|a| a.identity)
    }

    pub fn enable(&self) -> Option<&EnableSpec> {
        self.enable.as_ref()
    }

    pub fn is_enable_attribute(&self, name: &str) -> bool {
        self.enable.as_ref().is_some_and(|e| e.attribute == name)
    }

    pub fn creation(&self) -> Creation {
        self.creation
    }

    pub fn find_args(&self) -> &Map<String, Value> {
        &self.find_args
    }

    pub fn remove_args(&self) -> &Map<String, Value> {
        &self.remove_args
    }

    pub fn find_predicate(&self) -> Option<&FindPredicate> {
        self.find_predicate.as_ref()
    }

    pub fn response_hook(&self) -> Option<&ResponseHook> {
        self.response_hook.as_ref()
    }

    /// Canonicalize a raw value of the named attribute.
    pub fn normalize(&self, attribute: &str, raw: &Value) -> Result<AttrValue, ReconcileError> {
        let spec = self
            .attribute(attribute)
            .ok_or_else(|| unknown_attribute(self, attribute))?;
        spec.normalize_value(raw)
    }

    /// Whether a current object is enabled. A missing attribute means enabled.
    pub fn is_enabled(&self, current: &RemoteObject) -> Result<bool, ReconcileError> {
        let Some(enable) = &self.enable else {
            return Ok(true);
        };
        let spec = self
            .attribute(&enable.attribute)
            .ok_or_else(|| unknown_attribute(self, &enable.attribute))?;
        match current.get(spec.response_key()) {
            None => Ok(true),
            Some(raw) => match spec.normalize_value(raw)? {
                AttrValue::Scalar(Scalar::Bool(stored)) => Ok(stored != enable.inverted),
                _ => Ok(true),
            },
        }
    }

    /// Identity values in positional order, encoded for a request.
    ///
    /// With `for_find` set, identity keys marked `find_keyword` are left out.
    pub fn positional(&self, identity: &Identity, for_find: bool) -> Vec<Value> {
        self.attributes
            .iter()
            .filter(|a| a.identity && !(for_find && a.find_keyword))
            .filter_map(|a| identity.get(&a.name).map(|v| encode_value(a, v)))
            .collect()
    }

    /// Keyword filters for find built from `find_keyword` identity keys.
    pub fn find_keywords(&self, identity: &Identity) -> Map<String, Value> {
        self.attributes
            .iter()
            .filter(|a| a.identity && a.find_keyword)
            .filter_map(|a| {
                identity
                    .get(&a.name)
                    .map(|v| (a.name.clone(), encode_value(a, v)))
            })
            .collect()
    }
}

/// Encode an attribute value for a request using the attribute's encoding.
pub fn encode_value(spec: &AttributeSpec, value: &AttrValue) -> Value {
    match value {
        AttrValue::Scalar(s) => spec.encoding.encode(s),
        AttrValue::List(items) => {
            Value::Array(items.iter().map(|s| spec.encoding.encode(s)).collect())
        }
    }
}

fn unknown_attribute(schema: &ObjectSchema, attribute: &str) -> ReconcileError {
    ReconcileError::validation(
        attribute,
        format!("not an attribute of object type '{}'", schema.name),
    )
}

/// Builder for [`ObjectSchema`]; `build` validates the declaration.
#[derive(Debug)]
pub struct ObjectSchemaBuilder {
    schema: ObjectSchema,
}

impl ObjectSchemaBuilder {
    #[must_use]
    pub fn attribute(mut self, spec: AttributeSpec) -> Self {
        self.schema.attributes.push(spec);
        self
    }

    /// Declare the enable attribute. It must also be declared with
    /// [`attribute`](Self::attribute) as a scalar boolean.
    #[must_use]
    pub fn enable(mut self, attribute: &str, inverted: bool) -> Self {
        self.schema.enable = Some(EnableSpec {
            attribute: attribute.to_string(),
            inverted,
        });
        self
    }

    #[must_use]
    pub fn methods(mut self, f: impl FnOnce(&mut MethodTable)) -> Self {
        f(&mut self.schema.methods);
        self
    }

    #[must_use]
    pub fn creation(mut self, creation: Creation) -> Self {
        self.schema.creation = creation;
        self
    }

    #[must_use]
    pub fn find_arg(mut self, key: &str, value: Value) -> Self {
        self.schema.find_args.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn remove_arg(mut self, key: &str, value: Value) -> Self {
        self.schema.remove_args.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn find_predicate(mut self, predicate: FindPredicate) -> Self {
        self.schema.find_predicate = Some(predicate);
        self
    }

    #[must_use]
    pub fn response_hook(mut self, hook: ResponseHook) -> Self {
        self.schema.response_hook = Some(hook);
        self
    }

    pub fn build(self) -> Result<ObjectSchema, SchemaError> {
        let schema = self.schema;
        let name = || schema.name.clone();

        let mut seen = BTreeSet::new();
        for attr in &schema.attributes {
            if !seen.insert(attr.name.as_str()) {
                return Err(SchemaError::DuplicateAttribute {
                    schema: name(),
                    attribute: attr.name.clone(),
                });
            }
            if attr.identity && attr.is_list() && !attr.applies_to(Action::Find) {
                return Err(SchemaError::UnsearchableListIdentity {
                    schema: name(),
                    attribute: attr.name.clone(),
                });
            }
            if let Some(route) = &attr.route {
                let reason = if !attr.is_list() {
                    Some("has a list route but is not list-valued")
                } else if attr.identity {
                    Some("is an identity key and cannot be routed")
                } else if route.add_method.is_empty() || route.remove_method.is_empty() {
                    Some("has a list route with an empty method name")
                } else {
                    None
                };
                if let Some(reason) = reason {
                    return Err(SchemaError::InvalidRoute {
                        schema: name(),
                        attribute: attr.name.clone(),
                        reason: reason.to_string(),
                    });
                }
            }
        }

        if !schema.attributes.iter().any(|a| a.identity) {
            return Err(SchemaError::NoIdentity { schema: name() });
        }

        let mut positional_owner: BTreeMap<&str, &str> = BTreeMap::new();
        for attr in &schema.attributes {
            let Some(route) = &attr.route else { continue };
            if route.style != RouteStyle::Positional {
                continue;
            }
            for method in [&route.add_method, &route.remove_method] {
                if let Some(first) = positional_owner.insert(method, &attr.name) {
                    return Err(SchemaError::ConflictingPositionalRoute {
                        schema: name(),
                        method: method.clone(),
                        first: first.to_string(),
                        second: attr.name.clone(),
                    });
                }
            }
        }

        let methods = &schema.methods;
        for (entry, value) in [
            ("add", &methods.add),
            ("modify", &methods.modify),
            ("remove", &methods.remove),
            ("find", &methods.find),
        ] {
            if value.is_empty() {
                return Err(SchemaError::MissingMethod {
                    schema: name(),
                    entry: entry.to_string(),
                });
            }
        }

        if let Some(enable) = &schema.enable {
            let invalid = |reason: &str| SchemaError::InvalidEnableAttribute {
                schema: name(),
                attribute: enable.attribute.clone(),
                reason: reason.to_string(),
            };
            let attr = schema
                .attribute(&enable.attribute)
                .ok_or_else(|| invalid("is not declared"))?;
            if attr.identity {
                return Err(invalid("cannot be an identity key"));
            }
            if attr.is_list() || attr.kind != ValueKind::Bool {
                return Err(invalid("must be a scalar boolean"));
            }
            if methods.enable.is_empty() || methods.disable.is_empty() {
                return Err(invalid("needs enable and disable methods"));
            }
        }

        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn group() -> ObjectSchema {
        ObjectSchema::builder("group")
            .attribute(AttributeSpec::identity("cn"))
            .attribute(AttributeSpec::scalar("description"))
            .attribute(AttributeSpec::scalar("gidnumber").int())
            .attribute(AttributeSpec::list("member_user").routed(
                "group_add_member",
                "group_remove_member",
                "user",
            ))
            .build()
            .unwrap()
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    #[test]
    fn default_method_names_follow_type_name() {
        let schema = group();
        assert_eq!(schema.methods().add, "group_add");
        assert_eq!(schema.methods().modify, "group_mod");
        assert_eq!(schema.methods().remove, "group_del");
        assert_eq!(schema.methods().find, "group_find");
    }

    #[test]
    fn list_identity_without_find_is_rejected() {
        let err = ObjectSchema::builder("thing")
            .attribute(
                AttributeSpec::list("names")
                    .actions(ActionSet::of(&[Action::Add, Action::Modify])),
            )
            .attribute(AttributeSpec::identity("cn"))
            .build();
        assert!(err.is_ok(), "non-identity list attributes need no Find");

        let mut ident = AttributeSpec::list("names");
        ident.identity = true;
        ident.actions = ActionSet::of(&[Action::Add]);
        let err = ObjectSchema::builder("thing").attribute(ident).build();
        assert!(matches!(
            err,
            Err(SchemaError::UnsearchableListIdentity { .. })
        ));
    }

    #[test]
    fn schema_without_identity_is_rejected() {
        let err = ObjectSchema::builder("thing")
            .attribute(AttributeSpec::scalar("description"))
            .build();
        assert!(matches!(err, Err(SchemaError::NoIdentity { .. })));
    }

    #[test]
    fn duplicate_attribute_is_rejected() {
        let err = ObjectSchema::builder("thing")
            .attribute(AttributeSpec::identity("cn"))
            .attribute(AttributeSpec::scalar("cn"))
            .build();
        assert!(matches!(err, Err(SchemaError::DuplicateAttribute { .. })));
    }

    #[test]
    fn enable_attribute_must_be_scalar_bool() {
        let err = ObjectSchema::builder("user")
            .attribute(AttributeSpec::identity("uid"))
            .attribute(AttributeSpec::scalar("nsaccountlock"))
            .enable("nsaccountlock", true)
            .build();
        assert!(matches!(
            err,
            Err(SchemaError::InvalidEnableAttribute { .. })
        ));

        let err = ObjectSchema::builder("user")
            .attribute(AttributeSpec::identity("uid"))
            .enable("nsaccountlock", true)
            .build();
        assert!(matches!(
            err,
            Err(SchemaError::InvalidEnableAttribute { .. })
        ));
    }

    #[test]
    fn route_on_scalar_is_rejected() {
        let err = ObjectSchema::builder("thing")
            .attribute(AttributeSpec::identity("cn"))
            .attribute(AttributeSpec::scalar("owner").routed("a", "b", "c"))
            .build();
        assert!(matches!(err, Err(SchemaError::InvalidRoute { .. })));
    }

    #[test]
    fn two_positional_routes_on_one_method_are_rejected() {
        let err = ObjectSchema::builder("thing")
            .attribute(AttributeSpec::identity("cn"))
            .attribute(AttributeSpec::list("a").routed_positional("thing_add_x", "thing_del_x"))
            .attribute(AttributeSpec::list("b").routed_positional("thing_add_x", "thing_del_y"))
            .build();
        assert!(matches!(
            err,
            Err(SchemaError::ConflictingPositionalRoute { .. })
        ));
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    #[test]
    fn identity_keys_keep_declaration_order() {
        let schema = ObjectSchema::builder("dnsrecord")
            .attribute(AttributeSpec::identity("zone"))
            .attribute(AttributeSpec::list("arecord"))
            .attribute(AttributeSpec::identity("idnsname"))
            .build()
            .unwrap();
        assert_eq!(schema.identity_keys(), vec!["zone", "idnsname"]);
    }

    #[test]
    fn attributes_for_filters_by_action() {
        let schema = ObjectSchema::builder("ca")
            .attribute(AttributeSpec::identity("cn"))
            .attribute(
                AttributeSpec::scalar("ipacasubjectdn")
                    .actions(ActionSet::of(&[Action::Add, Action::Find])),
            )
            .attribute(AttributeSpec::scalar("description"))
            .build()
            .unwrap();
        let modifiable: Vec<_> = schema
            .attributes_for(Action::Modify)
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(modifiable, vec!["cn", "description"]);
    }

    #[test]
    fn response_key_lookup_uses_remote_name() {
        let schema = ObjectSchema::builder("caacl")
            .attribute(AttributeSpec::identity("cn"))
            .attribute(AttributeSpec::list("user").remote("memberuser_user"))
            .build()
            .unwrap();
        assert_eq!(
            schema
                .attribute_by_response_key("memberuser_user")
                .map(|a| a.name.as_str()),
            Some("user")
        );
        assert!(schema.attribute_by_response_key("user").is_none());
    }

    // ------------------------------------------------------------------
    // Normalization
    // ------------------------------------------------------------------

    #[test]
    fn normalize_unwraps_single_element_scalars() {
        let schema = group();
        assert_eq!(
            schema.normalize("description", &json!(["Ops team"])).unwrap(),
            AttrValue::from("Ops team")
        );
        assert_eq!(
            schema.normalize("gidnumber", &json!(["1001"])).unwrap(),
            AttrValue::from(1001i64)
        );
    }

    #[test]
    fn normalize_promotes_strings_to_lists() {
        let schema = group();
        assert_eq!(
            schema.normalize("member_user", &json!("alice")).unwrap(),
            AttrValue::from(vec!["alice"])
        );
    }

    #[test]
    fn normalize_rejects_bad_values() {
        let schema = group();
        let err = schema.normalize("gidnumber", &json!("lots")).unwrap_err();
        assert!(matches!(err, ReconcileError::Validation { ref attribute, .. } if attribute == "gidnumber"));

        let err = schema
            .normalize("description", &json!(["a", "b"]))
            .unwrap_err();
        assert!(err.to_string().contains("single value"));

        assert!(schema.normalize("nope", &json!("x")).is_err());
    }

    #[test]
    fn bool_coercion_accepts_directory_literals() {
        let spec = AttributeSpec::scalar("nsaccountlock").bool();
        assert_eq!(
            spec.normalize_value(&json!(["TRUE"])).unwrap(),
            AttrValue::from(true)
        );
        assert_eq!(
            spec.normalize_value(&json!("no")).unwrap(),
            AttrValue::from(false)
        );
        assert!(spec.normalize_value(&json!("maybe")).is_err());
    }

    #[test]
    fn normalizer_runs_before_coercion() {
        fn unwrap_b64(v: &Value) -> Result<Value, String> {
            Ok(v.get("__base64__").cloned().unwrap_or_else(|| v.clone()))
        }
        let spec = AttributeSpec::list("usercertificate")
            .normalize(Hook::new("unwrap_base64", unwrap_b64));
        assert_eq!(
            spec.normalize_value(&json!([{"__base64__": "MIIC"}, "MIID"]))
                .unwrap(),
            AttrValue::from(vec!["MIIC", "MIID"])
        );
    }

    #[test]
    fn enabled_state_honors_inversion_and_defaults() {
        let schema = ObjectSchema::builder("user")
            .attribute(AttributeSpec::identity("uid"))
            .attribute(AttributeSpec::scalar("nsaccountlock").bool())
            .enable("nsaccountlock", true)
            .build()
            .unwrap();

        let missing = RemoteObject::new();
        assert!(schema.is_enabled(&missing).unwrap());

        let locked = RemoteObject::from_value(json!({"nsaccountlock": [true]}));
        assert!(!schema.is_enabled(&locked).unwrap());

        let unlocked = RemoteObject::from_value(json!({"nsaccountlock": false}));
        assert!(schema.is_enabled(&unlocked).unwrap());

        assert!(schema.enable().unwrap().stored_value(false));
    }

    #[test]
    fn positional_and_find_keywords_split_identity() {
        let schema = ObjectSchema::builder("dnsrecord")
            .attribute(AttributeSpec::identity("dnszoneidnsname"))
            .attribute(
                AttributeSpec::identity("idnsname")
                    .encoding(Encoding::DnsName)
                    .find_keyword(),
            )
            .build()
            .unwrap();
        let identity: Identity = [
            ("dnszoneidnsname".to_string(), AttrValue::from("example.com.")),
            ("idnsname".to_string(), AttrValue::from("www")),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            schema.positional(&identity, false),
            vec![json!("example.com."), json!({"__dns_name__": "www"})]
        );
        assert_eq!(schema.positional(&identity, true), vec![json!("example.com.")]);
        assert_eq!(
            Value::Object(schema.find_keywords(&identity)),
            json!({"idnsname": {"__dns_name__": "www"}})
        );
    }

    #[test]
    fn action_set_helpers() {
        let set = ActionSet::of(&[Action::Add, Action::Find]);
        assert!(set.contains(Action::Add));
        assert!(!set.contains(Action::Modify));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Action::Add, Action::Find]);
        assert_eq!(
            serde_json::to_value(set).unwrap(),
            json!(["add", "find"])
        );
        let collected: ActionSet = [Action::Remove].into_iter().collect();
        assert_eq!(collected, ActionSet::of(&[Action::Remove]));
    }
}
