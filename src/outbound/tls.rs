//! Outbound TLS options

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::common::{opt_bool, opt_string, raw_bool, raw_string};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UtlsOptions {
    pub enabled: bool,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EchOptions {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RealityOptions {
    pub enabled: bool,
    pub public_key: String,
    pub short_id: String,
}

/// TLS block of an outbound. Unset fields are left out of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OutboundTlsOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_sni: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpn: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment_fallback_delay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_fragment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utls: Option<UtlsOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ech: Option<EchOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reality: Option<RealityOptions>,
}

/// Coerce a loosely shaped value into a list of `T`.
///
/// Arrays keep only elements of the right type, a lone value of the right type becomes
/// a one-element list, and null or a mismatched lone value gives `None`.
pub fn listable<T: DeserializeOwned>(value: Option<&Value>) -> Option<Vec<T>> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(|item| T::deserialize(item).ok())
                .collect(),
        ),
        Some(other) => T::deserialize(other).ok().map(|single| vec![single]),
    }
}

/// Build TLS options from a document's `tls` object, field by field.
pub fn parse_box_tls(field: &Map<String, Value>) -> OutboundTlsOptions {
    let mut tls = OutboundTlsOptions::default();

    for (key, value) in field {
        if value.is_null() {
            continue;
        }
        match key.as_str() {
            "enabled" => tls.enabled = Some(raw_bool(value)),
            "server_name" => tls.server_name = Some(raw_string(value)),
            "insecure" => tls.insecure = Some(raw_bool(value)),
            "disable_sni" => tls.disable_sni = Some(raw_bool(value)),
            "alpn" => tls.alpn = listable(Some(value)),
            "certificate" => tls.certificate = listable(Some(value)),
            "fragment" => tls.fragment = Some(raw_bool(value)),
            "fragment_fallback_delay" => tls.fragment_fallback_delay = Some(raw_string(value)),
            "record_fragment" => tls.record_fragment = Some(raw_bool(value)),
            "utls" => {
                if let Some(utls) = value.as_object() {
                    tls.utls = Some(UtlsOptions {
                        enabled: opt_bool(utls, "enabled"),
                        fingerprint: opt_string(utls, "fingerprint"),
                    });
                }
            }
            "ech" => {
                if let Some(ech) = value.as_object() {
                    tls.ech = Some(EchOptions {
                        enabled: opt_bool(ech, "enabled"),
                        config: listable(ech.get("config")),
                    });
                }
            }
            "reality" => {
                if let Some(reality) = value.as_object() {
                    tls.reality = Some(RealityOptions {
                        enabled: opt_bool(reality, "enabled"),
                        public_key: opt_string(reality, "public_key"),
                        short_id: opt_string(reality, "short_id"),
                    });
                }
            }
            _ => {}
        }
    }

    tls
}

/// Split newline separated profile text into list entries, dropping blanks.
pub(crate) fn split_lines(text: &str) -> Option<Vec<String>> {
    let items: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

pub(crate) fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Certificates are stored as one PEM blob; the core wants one entry per line.
pub(crate) fn certificate_lines(pem: &str) -> Option<Vec<String>> {
    if pem.trim().is_empty() {
        None
    } else {
        Some(pem.lines().map(str::to_string).collect())
    }
}
