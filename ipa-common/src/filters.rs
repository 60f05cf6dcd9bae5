//! Text helpers for the templates that sit around directory provisioning:
//! host names, reverse zones, systemd unit names, PEM wrapping, container
//! port flags and the DNS server addresses of an inventory.
//!
//! Every filter is a pure function. [`apply`] dispatches by name for the
//! `ipactl filter` command.

use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("unknown filter '{0}'")]
    Unknown(String),

    #[error("filter '{filter}' expects {expected}")]
    Arguments {
        filter: &'static str,
        expected: &'static str,
    },

    #[error("unsupported placeholder in format string '{0}' (use {{}} or {{0}})")]
    Placeholder(String),

    #[error("filter '{filter}' needs JSON input: {reason}")]
    Json { filter: &'static str, reason: String },
}

impl FilterError {
    pub fn code(&self) -> crate::errors::ErrorCode {
        crate::errors::ErrorCode::ValidationFilterError
    }
}

/// Result of a filter: a string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FilterOutput {
    Text(String),
    List(Vec<String>),
}

impl std::fmt::Display for FilterOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::List(items) => f.write_str(&items.join("\n")),
        }
    }
}

/// Names accepted by [`apply`].
pub const FILTER_NAMES: &[&str] = &[
    "dns_server_ips",
    "docker_port_args",
    "docker_port_list",
    "domain_to_dn",
    "domainname",
    "format_map",
    "format_map_str",
    "ipa_cert_to_pem",
    "last_octet",
    "reverse_ip",
    "reverse_zone",
    "shortname",
    "systemd_escape",
];

/// Host part of a FQDN: `ipa.example.com` → `ipa`.
pub fn shortname(fqdn: &str) -> &str {
    fqdn.split('.').next().unwrap_or_default()
}

/// Domain part of a FQDN: `ipa.example.com` → `example.com`.
pub fn domainname(fqdn: &str) -> &str {
    fqdn.split_once('.').map(|(_, domain)| domain).unwrap_or_default()
}

/// `example.com` → `dc=example,dc=com`.
pub fn domain_to_dn(domain: &str) -> String {
    domain
        .split('.')
        .map(|label| format!("dc={label}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Reverse dotted octets. With `pad`, the address is first cut or
/// zero-filled to exactly four octets.
pub fn reverse_ip(address: &str, pad: bool) -> String {
    let mut octets: Vec<&str> = address.split('.').collect();
    if pad {
        octets.resize(4, "0");
    }
    octets.reverse();
    octets.join(".")
}

/// `10.0.1` → `1.0.10.in-addr.arpa.`
pub fn reverse_zone(network: &str) -> String {
    format!("{}.in-addr.arpa.", reverse_ip(network, false))
}

pub fn last_octet(address: &str) -> &str {
    address.rsplit('.').next().unwrap_or_default()
}

/// Escape a path for use in a systemd unit name, like `systemd-escape`.
///
/// A leading `/` is dropped, `/` becomes `-`, alphanumerics and `_` pass
/// through, a leading `.` and every other byte become `\xNN`.
pub fn systemd_escape(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for (i, byte) in path.bytes().enumerate() {
        match byte {
            b'/' if i == 0 => {}
            b'.' if out.is_empty() => out.push_str("\\x2e"),
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' => out.push(byte as char),
            b'/' => out.push('-'),
            other => {
                let _ = write!(out, "\\x{other:02x}");
            }
        }
    }
    out
}

/// Wrap a bare base64 certificate as PEM with 64-column lines.
pub fn ipa_cert_to_pem(base64: &str) -> String {
    let body: String = base64.chars().filter(|c| !c.is_whitespace()).collect();
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    let chars: Vec<char> = body.chars().collect();
    for line in chars.chunks(64) {
        pem.extend(line);
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

/// `["53", "53/udp"]` → `["53:53", "53:53/udp"]`.
pub fn docker_port_list<S: AsRef<str>>(ports: &[S]) -> Vec<String> {
    ports
        .iter()
        .map(|spec| match spec.as_ref().split_once('/') {
            Some((port, proto)) => format!("{port}:{port}/{proto}"),
            None => {
                let port = spec.as_ref();
                format!("{port}:{port}")
            }
        })
        .collect()
}

/// `["53", "53/udp"]` → `--publish=53:53 --publish=53:53/udp`.
pub fn docker_port_args<S: AsRef<str>>(ports: &[S]) -> String {
    docker_port_list(ports)
        .iter()
        .map(|p| format!("--publish={p}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Substitute each item into `template`, where `{}` or `{0}` marks the item
/// and `{{`/`}}` are literal braces.
pub fn format_map<S: AsRef<str>>(items: &[S], template: &str) -> Result<Vec<String>, FilterError> {
    items
        .iter()
        .map(|item| format_one(template, item.as_ref()))
        .collect()
}

/// [`format_map`] joined with `sep`.
pub fn format_map_str<S: AsRef<str>>(
    items: &[S],
    template: &str,
    sep: &str,
) -> Result<String, FilterError> {
    Ok(format_map(items, template)?.join(sep))
}

fn format_one(template: &str, item: &str) -> Result<String, FilterError> {
    let mut out = String::with_capacity(template.len() + item.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => return Err(FilterError::Placeholder(template.to_string())),
                    }
                }
                if !field.is_empty() && field != "0" {
                    return Err(FilterError::Placeholder(template.to_string()));
                }
                out.push_str(item);
            }
            '}' => return Err(FilterError::Placeholder(template.to_string())),
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Inventory group whose members serve DNS.
pub const DNS_SERVER_GROUP: &str = "freeipa_servers";

/// Addresses of the DNS servers in an inventory's host variables.
///
/// `hostvars` maps host name to that host's variables. The server list is
/// the `groups.freeipa_servers` entry of the first host; each server's
/// `ipa_ip_addr` is collected, and servers without one are skipped.
pub fn dns_server_ips(hostvars: &Value) -> Vec<String> {
    let Some(hosts) = hostvars.as_object() else {
        return Vec::new();
    };
    let Some(servers) = hosts
        .values()
        .next()
        .and_then(|vars| vars.pointer(&format!("/groups/{DNS_SERVER_GROUP}")))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };
    servers
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|server| hosts.get(server)?.get("ipa_ip_addr")?.as_str())
        .map(str::to_string)
        .collect()
}

/// Split a list argument given on the command line: comma or whitespace
/// separated, empty entries dropped.
pub fn split_list(input: &str) -> Vec<String> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Run a filter by name. List inputs are parsed with [`split_list`].
pub fn apply(name: &str, input: &str, args: &[String]) -> Result<FilterOutput, FilterError> {
    let text = |s: String| Ok(FilterOutput::Text(s));
    match name {
        "shortname" => text(shortname(input).to_string()),
        "domainname" => text(domainname(input).to_string()),
        "domain_to_dn" => text(domain_to_dn(input)),
        "reverse_ip" => {
            let pad = match args.first().map(String::as_str) {
                None => false,
                Some("pad" | "true" | "yes" | "1") => true,
                Some("false" | "no" | "0") => false,
                Some(_) => {
                    return Err(FilterError::Arguments {
                        filter: "reverse_ip",
                        expected: "an optional 'pad' argument",
                    });
                }
            };
            text(reverse_ip(input, pad))
        }
        "reverse_zone" => text(reverse_zone(input)),
        "last_octet" => text(last_octet(input).to_string()),
        "systemd_escape" => text(systemd_escape(input)),
        "ipa_cert_to_pem" => text(ipa_cert_to_pem(input)),
        "dns_server_ips" => {
            let hostvars: Value = serde_json::from_str(input).map_err(|e| FilterError::Json {
                filter: "dns_server_ips",
                reason: e.to_string(),
            })?;
            Ok(FilterOutput::List(dns_server_ips(&hostvars)))
        }
        "docker_port_list" => Ok(FilterOutput::List(docker_port_list(&split_list(input)))),
        "docker_port_args" => text(docker_port_args(&split_list(input))),
        "format_map" => {
            let [template] = args else {
                return Err(FilterError::Arguments {
                    filter: "format_map",
                    expected: "a format string",
                });
            };
            Ok(FilterOutput::List(format_map(&split_list(input), template)?))
        }
        "format_map_str" => {
            let (template, sep) = match args {
                [template] => (template, ""),
                [template, sep] => (template, sep.as_str()),
                _ => {
                    return Err(FilterError::Arguments {
                        filter: "format_map_str",
                        expected: "a format string and an optional separator",
                    });
                }
            };
            text(format_map_str(&split_list(input), template, sep)?)
        }
        other => Err(FilterError::Unknown(other.to_string())),
    }
}
