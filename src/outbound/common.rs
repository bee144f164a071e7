//! Fields shared by every outbound: identity, server endpoint and multiplex

use serde_json::{json, Map, Value};

use crate::config::CompileContext;
use crate::models::{CommonFields, MuxProtocol, MuxStrategy};

/// Keys left over after the common parser ran, for a protocol parser to consume.
pub type Unmatched = Map<String, Value>;

const DEFAULT_PORT: u16 = 443;

/// String form of a raw document value. Strings are taken as-is, everything else
/// in its JSON text form.
pub fn raw_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Only a case-insensitive literal `true` counts.
pub fn raw_bool(value: &Value) -> bool {
    raw_string(value).eq_ignore_ascii_case("true")
}

/// Numbers arrive as wide integers, so always go through the string form.
pub fn raw_i64(value: &Value) -> Option<i64> {
    raw_string(value).trim().parse::<i64>().ok()
}

pub(crate) fn opt_bool(obj: &Map<String, Value>, key: &str) -> bool {
    match obj.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

pub(crate) fn opt_string(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(value) => raw_string(value),
    }
}

pub(crate) fn opt_i64(obj: &Map<String, Value>, key: &str) -> i64 {
    obj.get(key).and_then(raw_i64).unwrap_or(0)
}

/// Read tag, server, server_port and multiplex; hand back everything else.
///
/// Null values are skipped entirely and are neither consumed nor forwarded.
pub fn parse_common_fields(doc: &Map<String, Value>) -> (CommonFields, Unmatched) {
    let mut common = CommonFields::default();
    let mut unmatched = Unmatched::new();

    for (key, value) in doc {
        if value.is_null() {
            continue;
        }
        match key.as_str() {
            "tag" => common.name = raw_string(value),
            "server" => common.server_address = raw_string(value),
            "server_port" => {
                common.server_port = raw_string(value).trim().parse().unwrap_or(DEFAULT_PORT)
            }
            "multiplex" => {
                if let Some(mux) = value.as_object() {
                    parse_multiplex(mux, &mut common);
                }
            }
            _ => {
                unmatched.insert(key.clone(), value.clone());
            }
        }
    }

    (common, unmatched)
}

fn parse_multiplex(mux: &Map<String, Value>, common: &mut CommonFields) {
    if mux.get("enabled") != Some(&Value::Bool(true)) {
        return;
    }

    let settings = &mut common.mux;
    settings.enabled = true;
    settings.padding = opt_bool(mux, "padding");
    settings.protocol = MuxProtocol::from_str_lossy(&opt_string(mux, "protocol"));
    settings.brutal = mux
        .get("brutal")
        .and_then(Value::as_object)
        .map(|brutal| opt_bool(brutal, "enabled"))
        .unwrap_or(false);

    // Checked in this order; with several present the last one wins.
    for (key, strategy) in [
        ("max_connections", MuxStrategy::MaxConnections),
        ("min_streams", MuxStrategy::MinStreams),
        ("max_streams", MuxStrategy::MaxStreams),
    ] {
        let number = opt_i64(mux, key);
        if number > 0 {
            settings.strategy = strategy;
            settings.number = i32::try_from(number).unwrap_or(i32::MAX);
        }
    }
}

/// Multiplex object for the core, or `None` when the profile keeps mux off.
pub fn build_multiplex(common: &CommonFields, ctx: &CompileContext) -> Option<Value> {
    let mux = &common.mux;
    if !mux.enabled {
        return None;
    }

    let mut out = Map::new();
    out.insert("enabled".to_string(), json!(true));
    out.insert("padding".to_string(), json!(mux.padding));
    out.insert("protocol".to_string(), json!(mux.protocol.as_str()));

    if mux.brutal {
        out.insert("max_connections".to_string(), json!(1));
        out.insert(
            "brutal".to_string(),
            json!({
                "enabled": true,
                // Unlimited upload needs the kernel module.
                "up_mbps": -1,
                "down_mbps": ctx.download_mbps,
            }),
        );
    } else {
        let key = match mux.strategy {
            MuxStrategy::MaxConnections => "max_connections",
            MuxStrategy::MinStreams => "min_streams",
            MuxStrategy::MaxStreams => "max_streams",
        };
        out.insert(key.to_string(), json!(mux.number));
    }

    Some(Value::Object(out))
}
