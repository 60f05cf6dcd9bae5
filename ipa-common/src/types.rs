//! Value types shared by the schema, the diff engine and the reconciler.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A single canonical attribute value.
///
/// The derived ordering (`Null < Bool < Int < Str`, then by value) is what
/// makes diff output deterministic.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(untagged)]
pub enum Scalar {
    /// The unset sentinel. Assigning it clears the attribute remotely.
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Str(s) => Value::String(s.clone()),
        }
    }
}

/// Renders the value the way the directory expects it inside
/// `addattr`/`delattr` strings.
impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(true) => f.write_str("TRUE"),
            Self::Bool(false) => f.write_str("FALSE"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

/// A requested or canonicalized attribute value: one scalar or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum AttrValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl AttrValue {
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// The values as a slice; a scalar is a one-element view.
    pub fn values(&self) -> &[Scalar] {
        match self {
            Self::Scalar(s) => std::slice::from_ref(s),
            Self::List(v) => v,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Scalar(s) => s.to_json(),
            Self::List(v) => Value::Array(v.iter().map(Scalar::to_json).collect()),
        }
    }
}

impl From<Scalar> for AttrValue {
    fn from(s: Scalar) -> Self {
        Self::Scalar(s)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Scalar(s.into())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Scalar(s.into())
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        Self::Scalar(b.into())
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        Self::Scalar(i.into())
    }
}

impl From<Vec<Scalar>> for AttrValue {
    fn from(v: Vec<Scalar>) -> Self {
        Self::List(v)
    }
}

impl From<Vec<&str>> for AttrValue {
    fn from(v: Vec<&str>) -> Self {
        Self::List(v.into_iter().map(Scalar::from).collect())
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(v: Vec<String>) -> Self {
        Self::List(v.into_iter().map(Scalar::from).collect())
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(v: Vec<i64>) -> Self {
        Self::List(v.into_iter().map(Scalar::from).collect())
    }
}

/// Identity attribute values keyed by attribute name. Positional order comes
/// from the schema, not from this map.
pub type Identity = BTreeMap<String, AttrValue>;

/// The service's current representation of an object.
///
/// Empty means the object does not exist. Values are kept as the service sent
/// them, apart from the cardinality coercion applied by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteObject(Map<String, Value>);

impl RemoteObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Objects become remote objects; anything else is treated as "no object".
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for RemoteObject {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Requested end state of a reconciliation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    /// Object exists and carries at least the requested values.
    #[default]
    Present,
    /// Object is removed, or the requested list values are removed from it.
    Absent,
    /// Object exists with exactly the requested values.
    Exact,
    /// Present, and the enable attribute says enabled.
    Enabled,
    /// Present, and the enable attribute says disabled.
    Disabled,
}

impl TargetState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Exact => "exact",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }

    /// The enable value this state forces, if any.
    pub const fn forced_enable(&self) -> Option<bool> {
        match self {
            Self::Enabled => Some(true),
            Self::Disabled => Some(false),
            _ => None,
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "exact" => Ok(Self::Exact),
            "enabled" => Ok(Self::Enabled),
            "disabled" => Ok(Self::Disabled),
            other => Err(format!(
                "unknown state '{other}' (expected present, absent, exact, enabled or disabled)"
            )),
        }
    }
}

/// What the caller wants one object to look like.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DesiredState {
    /// Values of the schema's identity attributes.
    pub identity: Identity,
    /// Managed attributes; anything not listed is left alone (except under
    /// `exact`, where unlisted scalars are cleared and unlisted list values
    /// removed).
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
    #[serde(default)]
    pub state: TargetState,
    /// Compute and report the change without issuing mutating calls.
    #[serde(default)]
    pub dry_run: bool,
}

impl DesiredState {
    pub fn new(state: TargetState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_identity(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.identity.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Whether any supplied attribute is list-valued in `schema`, whatever
    /// shape the requested value has.
    pub fn has_list_attributes(&self, schema: &crate::schema::ObjectSchema) -> bool {
        self.attributes
            .keys()
            .any(|name| schema.attribute(name).is_some_and(crate::schema::AttributeSpec::is_list))
    }

    /// Split a flat parameter map into identity and attributes using the
    /// schema's identity keys. Unknown names stay in `attributes` so they are
    /// reported during validation.
    pub fn from_params(
        schema: &crate::schema::ObjectSchema,
        params: BTreeMap<String, AttrValue>,
        state: TargetState,
    ) -> Self {
        let (identity, attributes) = params
            .into_iter()
            .partition(|(name, _)| schema.is_identity(name));
        Self {
            identity,
            attributes,
            state,
            dry_run: false,
        }
    }
}

/// One remote procedure call: `{method, params: [positional, item]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCall {
    pub method: String,
    pub positional: Vec<Value>,
    pub item: Map<String, Value>,
}

impl RemoteCall {
    pub fn new(method: impl Into<String>, positional: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            positional,
            item: Map::new(),
        }
    }

    #[must_use]
    pub fn with_item(mut self, item: Map<String, Value>) -> Self {
        self.item = item;
        self
    }

    #[must_use]
    pub fn arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.item.insert(key.into(), value);
        self
    }

    /// The JSON-RPC `params` array.
    pub fn params(&self) -> Value {
        Value::Array(vec![
            Value::Array(self.positional.clone()),
            Value::Object(self.item.clone()),
        ])
    }
}

impl fmt::Display for RemoteCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.method, Value::Array(self.positional.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_ordering_is_total_and_stable() {
        let mut values = vec![
            Scalar::from("bob"),
            Scalar::from(3i64),
            Scalar::Null,
            Scalar::from("alice"),
            Scalar::from(true),
            Scalar::from(1i64),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Scalar::Null,
                Scalar::Bool(true),
                Scalar::Int(1),
                Scalar::Int(3),
                Scalar::from("alice"),
                Scalar::from("bob"),
            ]
        );
    }

    #[test]
    fn scalar_display_matches_directory_literals() {
        assert_eq!(Scalar::Bool(true).to_string(), "TRUE");
        assert_eq!(Scalar::Bool(false).to_string(), "FALSE");
        assert_eq!(Scalar::Int(1001).to_string(), "1001");
        assert_eq!(Scalar::from("x@y").to_string(), "x@y");
    }

    #[test]
    fn attr_value_deserializes_untagged() {
        let v: AttrValue = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(v, AttrValue::from(vec!["a", "b"]));

        let v: AttrValue = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(v, AttrValue::from(42i64));

        let v: AttrValue = serde_json::from_value(json!(null)).unwrap();
        assert_eq!(v, AttrValue::Scalar(Scalar::Null));
    }

    #[test]
    fn remote_object_from_non_object_is_empty() {
        assert!(RemoteObject::from_value(json!([])).is_empty());
        assert!(RemoteObject::from_value(json!(null)).is_empty());
        let obj = RemoteObject::from_value(json!({"cn": ["ops"]}));
        assert_eq!(obj.get("cn"), Some(&json!(["ops"])));
    }

    #[test]
    fn target_state_parses_case_insensitively() {
        assert_eq!("Exact".parse::<TargetState>(), Ok(TargetState::Exact));
        assert!("gone".parse::<TargetState>().is_err());
        assert_eq!(TargetState::Disabled.forced_enable(), Some(false));
        assert_eq!(TargetState::Present.forced_enable(), None);
    }

    #[test]
    fn list_attributes_follow_schema_cardinality() {
        let schema = crate::builtin::group().unwrap();
        let scalar_only = DesiredState::new(TargetState::Absent)
            .with_identity("cn", "ops")
            .with_attribute("description", vec!["Ops"]);
        assert!(!scalar_only.has_list_attributes(&schema));

        let bare_member = scalar_only.with_attribute("member_user", "bob");
        assert!(bare_member.has_list_attributes(&schema));
    }

    #[test]
    fn remote_call_params_shape() {
        let call = RemoteCall::new("group_add_member", vec![json!("ops")])
            .arg("user", json!(["bob"]));
        assert_eq!(call.params(), json!([["ops"], {"user": ["bob"]}]));
        assert_eq!(call.to_string(), "group_add_member[\"ops\"]");
    }
}
