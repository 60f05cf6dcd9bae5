//! Built-in object types.
//!
//! Each type is plain data: an [`ObjectSchema`] plus a few named functions
//! for the places where the service's representation needs help (wrapped
//! base64/DNS values, realm suffixes, the canonical principal echoed in the
//! alias list).

use crate::error::SchemaError;
use crate::schema::{
    Action, ActionSet, AttributeSpec, Creation, Encoding, FindPredicate, Hook, ObjectSchema,
    ResponseHook, ValueNormalizer,
};
use crate::types::{AttrValue, Identity, RemoteObject, Scalar};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Value normalizers
// ---------------------------------------------------------------------------

fn unwrap_key(raw: &Value, key: &str) -> Value {
    match raw {
        Value::Object(map) => map.get(key).cloned().unwrap_or_else(|| raw.clone()),
        other => other.clone(),
    }
}

/// `{"__base64__": "MIIC..."}` → `"MIIC..."`.
pub fn unwrap_base64(raw: &Value) -> Result<Value, String> {
    Ok(unwrap_key(raw, "__base64__"))
}

/// `{"__dns_name__": "www"}` → `"www"`.
pub fn unwrap_dns_name(raw: &Value) -> Result<Value, String> {
    Ok(unwrap_key(raw, "__dns_name__"))
}

fn principal_re() -> Result<&'static Regex, String> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([^@]*)(@[^@]*)?$"))
        .as_ref()
        .map_err(|e| e.to_string())
}

/// `alice@EXAMPLE.COM` → `alice`.
pub fn strip_realm(raw: &Value) -> Result<Value, String> {
    let Value::String(principal) = raw else {
        return Ok(raw.clone());
    };
    let re = principal_re()?;
    Ok(re
        .captures(principal)
        .and_then(|c| c.get(1))
        .map(|m| Value::String(m.as_str().to_string()))
        .unwrap_or_else(|| raw.clone()))
}

pub const UNWRAP_BASE64: ValueNormalizer = Hook::new("unwrap_base64", unwrap_base64);
pub const UNWRAP_DNS_NAME: ValueNormalizer = Hook::new("unwrap_dns_name", unwrap_dns_name);
pub const STRIP_REALM: ValueNormalizer = Hook::new("strip_realm", strip_realm);

// ---------------------------------------------------------------------------
// Find predicate and response hooks
// ---------------------------------------------------------------------------

/// Keep only find results whose identity values equal the requested ones.
///
/// Find methods match substrings (`ops` also finds `devops`). Identity keys
/// the result does not carry are not checked.
pub fn identity_matches(schema: &ObjectSchema, identity: &Identity, candidate: &Value) -> bool {
    identity.iter().all(|(key, wanted)| {
        let Some(spec) = schema.attribute(key) else {
            return true;
        };
        let Some(raw) = candidate.get(spec.response_key()) else {
            return true;
        };
        let Ok(found) = spec.normalize_value(raw) else {
            return false;
        };
        wanted.values().iter().all(|w| found.values().iter().any(|f| same_name(w, f)))
    })
}

fn same_name(a: &Scalar, b: &Scalar) -> bool {
    match (a, b) {
        (Scalar::Str(a), Scalar::Str(b)) => a.eq_ignore_ascii_case(b),
        (a, b) => a == b,
    }
}

pub const IDENTITY_MATCHES: FindPredicate = Hook::new("identity_matches", identity_matches);

/// Remove the canonical principal from the `krbprincipalname` alias list.
pub fn drop_canonical_principal(object: &mut RemoteObject, identity: &Identity) {
    let canonical = match object.get("krbcanonicalname") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(items)) => items.first().and_then(Value::as_str).map(str::to_string),
        _ => identity
            .get("krbcanonicalname")
            .and_then(|v| match v {
                AttrValue::Scalar(s) => s.as_str().map(str::to_string),
                AttrValue::List(_) => None,
            }),
    };
    let Some(canonical) = canonical else {
        return;
    };
    let Some(Value::Array(aliases)) = object.get_mut("krbprincipalname") else {
        return;
    };
    aliases.retain(|alias| alias.as_str() != Some(canonical.as_str()));
    if aliases.is_empty() {
        object.remove("krbprincipalname");
    }
}

pub const DROP_CANONICAL_PRINCIPAL: ResponseHook =
    Hook::new("drop_canonical_principal", drop_canonical_principal);

// ---------------------------------------------------------------------------
// Schemas
// ---------------------------------------------------------------------------

pub fn group() -> Result<ObjectSchema, SchemaError> {
    ObjectSchema::builder("group")
        .attribute(AttributeSpec::identity("cn"))
        .attribute(AttributeSpec::scalar("description"))
        .attribute(AttributeSpec::scalar("gidnumber").int())
        .attribute(AttributeSpec::scalar("nonposix").bool().actions(ActionSet::of(&[Action::Add])))
        .attribute(AttributeSpec::scalar("external").bool().actions(ActionSet::of(&[Action::Add])))
        .attribute(AttributeSpec::list("member_user").routed(
            "group_add_member",
            "group_remove_member",
            "user",
        ))
        .attribute(AttributeSpec::list("member_group").routed(
            "group_add_member",
            "group_remove_member",
            "group",
        ))
        .find_predicate(IDENTITY_MATCHES)
        .build()
}

pub fn user() -> Result<ObjectSchema, SchemaError> {
    let mut builder = ObjectSchema::builder("user").attribute(AttributeSpec::identity("uid"));
    for name in [
        "givenname",
        "sn",
        "cn",
        "displayname",
        "initials",
        "homedirectory",
        "gecos",
        "loginshell",
        "street",
        "l",
        "st",
        "postalcode",
        "ou",
        "title",
        "manager",
        "carlicense",
        "ipatokenradiusconfiglink",
        "ipatokenradiususername",
        "departmentnumber",
        "employeenumber",
        "employeetype",
        "preferredlanguage",
    ] {
        builder = builder.attribute(AttributeSpec::scalar(name));
    }
    for name in [
        "mail",
        "telephonenumber",
        "mobile",
        "pager",
        "facsimiletelephonenumber",
        "ipasshpubkey",
        "ipauserauthtype",
        "userclass",
    ] {
        builder = builder.attribute(AttributeSpec::list(name));
    }
    builder
        .attribute(AttributeSpec::scalar("gidnumber").int())
        // Never reported back, so only sent on creation.
        .attribute(AttributeSpec::scalar("userpassword").actions(ActionSet::of(&[Action::Add])))
        .attribute(AttributeSpec::scalar("nsaccountlock").bool())
        .attribute(
            AttributeSpec::list("usercertificate")
                .encoding(Encoding::Base64)
                .normalize(UNWRAP_BASE64)
                .routed("user_add_cert", "user_remove_cert", "usercertificate"),
        )
        .attribute(
            AttributeSpec::list("krbprincipalname")
                .normalize(STRIP_REALM)
                .routed_positional("user_add_principal", "user_remove_principal"),
        )
        .enable("nsaccountlock", true)
        .find_predicate(IDENTITY_MATCHES)
        .response_hook(DROP_CANONICAL_PRINCIPAL)
        .build()
}

pub fn service() -> Result<ObjectSchema, SchemaError> {
    let mut builder = ObjectSchema::builder("service")
        .attribute(AttributeSpec::identity("krbcanonicalname"))
        .attribute(AttributeSpec::scalar("usercertificate").normalize(UNWRAP_BASE64))
        .attribute(AttributeSpec::scalar("krbprincipalauthind"))
        .attribute(AttributeSpec::scalar("ipakrbrequirespreauth").bool())
        .attribute(AttributeSpec::scalar("ipakrbokasdelegate").bool())
        .attribute(AttributeSpec::scalar("ipakrboktoauthasdelegate").bool())
        .attribute(AttributeSpec::list("krbprincipalname"))
        .attribute(AttributeSpec::list("managedby_host").routed(
            "service_add_host",
            "service_remove_host",
            "host",
        ));
    for (access, add, remove) in [
        ("write", "service_allow_create_keytab", "service_disallow_create_keytab"),
        ("read", "service_allow_retrieve_keytab", "service_disallow_retrieve_keytab"),
    ] {
        for kind in ["user", "group", "host", "hostgroup"] {
            let name = format!("ipaallowedtoperform_{access}_keys_{kind}");
            builder = builder.attribute(AttributeSpec::list(&name).routed(add, remove, kind));
        }
    }
    builder
        .find_predicate(IDENTITY_MATCHES)
        .response_hook(DROP_CANONICAL_PRINCIPAL)
        .build()
}

pub fn caacl() -> Result<ObjectSchema, SchemaError> {
    let member = |name: &str, remote: &str, add: &str, remove: &str| {
        AttributeSpec::list(name).remote(remote).routed(add, remove, name)
    };
    ObjectSchema::builder("caacl")
        .attribute(AttributeSpec::identity("cn"))
        .attribute(AttributeSpec::scalar("description"))
        .attribute(member("user", "memberuser_user", "caacl_add_user", "caacl_remove_user"))
        .attribute(member("group", "memberuser_group", "caacl_add_user", "caacl_remove_user"))
        .attribute(member("host", "memberhost_host", "caacl_add_host", "caacl_remove_host"))
        .attribute(member(
            "hostgroup",
            "memberhost_hostgroup",
            "caacl_add_host",
            "caacl_remove_host",
        ))
        .attribute(member(
            "service",
            "memberservice_service",
            "caacl_add_service",
            "caacl_remove_service",
        ))
        .attribute(member(
            "certprofile",
            "ipamembercertprofile_certprofile",
            "caacl_add_profile",
            "caacl_remove_profile",
        ))
        .attribute(member("ca", "ipamemberca_ca", "caacl_add_ca", "caacl_remove_ca"))
        .find_predicate(IDENTITY_MATCHES)
        .build()
}

pub fn ca() -> Result<ObjectSchema, SchemaError> {
    ObjectSchema::builder("ca")
        .attribute(AttributeSpec::identity("cn"))
        .attribute(
            AttributeSpec::scalar("ipacasubjectdn").actions(ActionSet::of(&[Action::Add, Action::Find])),
        )
        .attribute(AttributeSpec::scalar("description"))
        .find_predicate(IDENTITY_MATCHES)
        .build()
}

pub fn dnszone() -> Result<ObjectSchema, SchemaError> {
    ObjectSchema::builder("dnszone")
        .attribute(
            AttributeSpec::identity("idnsname")
                .find_keyword()
                .normalize(UNWRAP_DNS_NAME),
        )
        .attribute(AttributeSpec::scalar("idnssoamname").normalize(UNWRAP_DNS_NAME))
        .attribute(AttributeSpec::scalar("idnssoarname").normalize(UNWRAP_DNS_NAME))
        .attribute(AttributeSpec::scalar("idnssoaserial").int())
        .attribute(AttributeSpec::scalar("idnssoarefresh").int())
        .attribute(AttributeSpec::scalar("idnssoaretry").int())
        .attribute(AttributeSpec::scalar("idnssoaexpire").int())
        .attribute(AttributeSpec::scalar("idnssoaminimum").int())
        .attribute(AttributeSpec::scalar("idnsallowquery"))
        .attribute(AttributeSpec::scalar("idnsallowtransfer"))
        .attribute(AttributeSpec::scalar("idnsallowdynupdate").bool())
        .attribute(AttributeSpec::scalar("idnsupdatepolicy"))
        .attribute(AttributeSpec::list("nsrecord"))
        .attribute(AttributeSpec::scalar("idnszoneactive").bool())
        .enable("idnszoneactive", false)
        .find_predicate(IDENTITY_MATCHES)
        .build()
}

/// Resource record lists managed on a DNS record.
pub const DNS_RECORD_TYPES: [&str; 6] = [
    "arecord",
    "aaaarecord",
    "cnamerecord",
    "ptrrecord",
    "srvrecord",
    "txtrecord",
];

pub fn dnsrecord() -> Result<ObjectSchema, SchemaError> {
    let mut builder = ObjectSchema::builder("dnsrecord")
        .attribute(AttributeSpec::identity("dnszoneidnsname").normalize(UNWRAP_DNS_NAME))
        .attribute(
            AttributeSpec::identity("idnsname")
                .encoding(Encoding::DnsName)
                .find_keyword()
                .normalize(UNWRAP_DNS_NAME),
        );
    for rr in DNS_RECORD_TYPES {
        builder = builder.attribute(AttributeSpec::list(rr).routed("dnsrecord_add", "dnsrecord_del", rr));
    }
    builder
        .creation(Creation::Implicit)
        .remove_arg("del_all", Value::Bool(true))
        .find_predicate(IDENTITY_MATCHES)
        .build()
}

/// Built-in schemas by name, validated once at startup.
#[derive(Debug, Clone)]
pub struct Registry {
    schemas: BTreeMap<String, ObjectSchema>,
}

impl Registry {
    pub fn builtin() -> Result<Self, SchemaError> {
        let mut registry = Self::empty();
        for schema in [group()?, user()?, service()?, caacl()?, ca()?, dnszone()?, dnsrecord()?] {
            registry.register(schema);
        }
        Ok(registry)
    }

    pub fn empty() -> Self {
        Self {
            schemas: BTreeMap::new(),
        }
    }

    /// Add or replace a schema.
    pub fn register(&mut self, schema: ObjectSchema) {
        self.schemas.insert(schema.name().to_string(), schema);
    }

    pub fn get(&self, name: &str) -> Result<&ObjectSchema, SchemaError> {
        self.schemas
            .get(name)
            .ok_or_else(|| SchemaError::UnknownType(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectSchema> {
        self.schemas.values()
    }
}
