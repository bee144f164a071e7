//! Hysteria (v1 and v2) outbounds

use serde_json::{json, Map, Value};

use super::common::{parse_common_fields, raw_bool, raw_i64, raw_string};
use super::tls::{
    certificate_lines, listable, non_empty, parse_box_tls, split_lines, EchOptions,
    OutboundTlsOptions,
};
use crate::config::CompileContext;
use crate::models::{CommonFields, HysteriaAuthType, HysteriaBean, Profile, ProfileBean};

/// Bandwidth falls back to the shared settings when the profile leaves it at 0.
pub(crate) fn effective_mbps(profile_value: i32, fallback: i32) -> i32 {
    if profile_value > 0 {
        profile_value
    } else {
        fallback
    }
}

/// `20000-30000,443` → `["20000:30000", "443"]`
pub(crate) fn hop_ports(server_ports: &str) -> Vec<String> {
    server_ports
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.replace('-', ":"))
        .collect()
}

pub fn build_hysteria_outbound(
    common: &CommonFields,
    bean: &HysteriaBean,
    ctx: &CompileContext,
) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert("server".to_string(), json!(common.server_address));
    out.insert("server_port".to_string(), json!(common.server_port));

    let ports = hop_ports(&bean.server_ports);
    if !ports.is_empty() {
        out.insert("server_ports".to_string(), json!(ports));
        if bean.hop_interval > 0 {
            out.insert(
                "hop_interval".to_string(),
                json!(format!("{}s", bean.hop_interval)),
            );
        }
    }

    let up = effective_mbps(bean.upload_mbps, ctx.upload_mbps);
    let down = effective_mbps(bean.download_mbps, ctx.download_mbps);
    if up > 0 {
        out.insert("up_mbps".to_string(), json!(up));
    }
    if down > 0 {
        out.insert("down_mbps".to_string(), json!(down));
    }

    let mut tls = OutboundTlsOptions {
        enabled: Some(true),
        server_name: non_empty(&bean.sni),
        insecure: Some(bean.allow_insecure),
        disable_sni: Some(bean.disable_sni),
        certificate: certificate_lines(&bean.certificates),
        ..OutboundTlsOptions::default()
    };
    if bean.ech {
        tls.ech = Some(EchOptions {
            enabled: true,
            config: split_lines(&bean.ech_config),
        });
    }

    if bean.protocol_version == HysteriaBean::PROTOCOL_VERSION_1 {
        if !bean.obfuscation.is_empty() {
            out.insert("obfs".to_string(), json!(bean.obfuscation));
        }
        match bean.auth_type {
            HysteriaAuthType::None => {}
            HysteriaAuthType::Base64 => {
                out.insert("auth".to_string(), json!(bean.auth_payload));
            }
            HysteriaAuthType::Str => {
                out.insert("auth_str".to_string(), json!(bean.auth_payload));
            }
        }
        if bean.connection_receive_window > 0 {
            out.insert(
                "recv_window_conn".to_string(),
                json!(bean.connection_receive_window),
            );
        }
        if bean.stream_receive_window > 0 {
            out.insert("recv_window".to_string(), json!(bean.stream_receive_window));
        }
        if bean.disable_mtu_discovery {
            out.insert("disable_mtu_discovery".to_string(), json!(true));
        }
        tls.alpn = split_lines(&bean.alpn);
    } else {
        if !bean.auth_payload.is_empty() {
            out.insert("password".to_string(), json!(bean.auth_payload));
        }
        if !bean.obfuscation.is_empty() {
            out.insert(
                "obfs".to_string(),
                json!({"type": "salamander", "password": bean.obfuscation}),
            );
        }
    }

    if let Ok(tls) = serde_json::to_value(&tls) {
        out.insert("tls".to_string(), tls);
    }
    out
}

fn apply_tls(bean: &mut HysteriaBean, value: &Value) {
    let Some(field) = value.as_object() else {
        return;
    };
    let tls = parse_box_tls(field);
    if let Some(server_name) = tls.server_name {
        bean.sni = server_name;
    }
    bean.allow_insecure = tls.insecure.unwrap_or(false);
    bean.disable_sni = tls.disable_sni.unwrap_or(false);
    if let Some(alpn) = tls.alpn {
        bean.alpn = alpn.join("\n");
    }
    if let Some(certificate) = tls.certificate {
        bean.certificates = certificate.join("\n");
    }
    if let Some(ech) = tls.ech {
        bean.ech = ech.enabled;
        bean.ech_config = ech.config.unwrap_or_default().join("\n");
    }
}

/// Integer field that saturates instead of wrapping when it overflows `i32`
fn raw_i32(value: &Value) -> i32 {
    raw_i64(value)
        .map(|n| i32::try_from(n).unwrap_or(i32::MAX))
        .unwrap_or(0)
}

fn parse_hysteria_ports(bean: &mut HysteriaBean, key: &str, value: &Value) -> bool {
    match key {
        "server_ports" => {
            if let Some(ports) = listable::<String>(Some(value)) {
                bean.server_ports = ports
                    .iter()
                    .map(|p| p.replace(':', "-"))
                    .collect::<Vec<_>>()
                    .join(",");
            }
        }
        "hop_interval" => {
            let text = raw_string(value);
            if let Ok(seconds) = text.trim().trim_end_matches('s').parse() {
                bean.hop_interval = seconds;
            }
        }
        "up_mbps" => bean.upload_mbps = raw_i32(value),
        "down_mbps" => bean.download_mbps = raw_i32(value),
        "tls" => apply_tls(bean, value),
        _ => return false,
    }
    true
}

pub fn parse_hysteria1_outbound(doc: &Map<String, Value>) -> Profile {
    let (common, unmatched) = parse_common_fields(doc);
    let mut bean = HysteriaBean {
        protocol_version: HysteriaBean::PROTOCOL_VERSION_1,
        ..HysteriaBean::default()
    };

    for (key, value) in &unmatched {
        if parse_hysteria_ports(&mut bean, key, value) {
            continue;
        }
        match key.as_str() {
            "obfs" => bean.obfuscation = raw_string(value),
            "auth" => {
                bean.auth_type = HysteriaAuthType::Base64;
                bean.auth_payload = raw_string(value);
            }
            "auth_str" => {
                bean.auth_type = HysteriaAuthType::Str;
                bean.auth_payload = raw_string(value);
            }
            "recv_window_conn" => bean.connection_receive_window = raw_i32(value),
            "recv_window" => bean.stream_receive_window = raw_i32(value),
            "disable_mtu_discovery" => bean.disable_mtu_discovery = raw_bool(value),
            _ => {}
        }
    }

    Profile::new(common, ProfileBean::Hysteria(bean))
}

pub fn parse_hysteria2_outbound(doc: &Map<String, Value>) -> Profile {
    let (common, unmatched) = parse_common_fields(doc);
    let mut bean = HysteriaBean {
        protocol_version: HysteriaBean::PROTOCOL_VERSION_2,
        ..HysteriaBean::default()
    };

    for (key, value) in &unmatched {
        if parse_hysteria_ports(&mut bean, key, value) {
            continue;
        }
        match key.as_str() {
            "password" => bean.auth_payload = raw_string(value),
            "obfs" => {
                if let Some(obfs) = value.as_object() {
                    if let Some(password) = obfs.get("password") {
                        bean.obfuscation = raw_string(password);
                    }
                }
            }
            _ => {}
        }
    }

    Profile::new(common, ProfileBean::Hysteria(bean))
}
