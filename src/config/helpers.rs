//! Configuration text for out-of-process helpers
//!
//! Rendering is pure: any file the helper needs besides its configuration (the trust
//! anchor file for custom certificates) comes back as an [`AuxFile`] that the caller
//! writes and later deletes.

use std::path::PathBuf;

use serde_json::{json, Map, Value};

use super::CompileContext;
use crate::models::{HysteriaAuthType, HysteriaBean, NaiveBean, Profile, ProfileBean};
use crate::outbound::hysteria::{effective_mbps, hop_ports};

pub const HELPER_HYSTERIA: &str = "hysteria-plugin";
pub const HELPER_HYSTERIA2: &str = "hysteria2-plugin";
pub const HELPER_NAIVE: &str = "naive-plugin";

const LOCALHOST: &str = "127.0.0.1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxFile {
    pub path: PathBuf,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedHelper {
    pub helper_name: &'static str,
    pub config: String,
    pub aux_files: Vec<AuxFile>,
}

/// Name of the helper binary that runs `profile`, if any does.
pub fn helper_name(profile: &Profile) -> Option<&'static str> {
    match &profile.bean {
        ProfileBean::Hysteria(bean) if bean.protocol_version == HysteriaBean::PROTOCOL_VERSION_1 => {
            Some(HELPER_HYSTERIA)
        }
        ProfileBean::Hysteria(_) => Some(HELPER_HYSTERIA2),
        ProfileBean::Naive(_) => Some(HELPER_NAIVE),
        _ => None,
    }
}

/// Render the helper configuration for a hop listening on `port`.
///
/// With `upstream` set the helper dials `127.0.0.1:<upstream>` instead of the server;
/// the core forwards that port to the server through the earlier hops.
/// Returns `None` for profiles that no helper runs.
pub fn render_helper(
    profile: &Profile,
    port: u16,
    upstream: Option<u16>,
    is_vpn: bool,
    ctx: &CompileContext,
) -> Option<RenderedHelper> {
    let helper_name = helper_name(profile)?;
    let mut aux_files = Vec::new();
    let doc = match &profile.bean {
        ProfileBean::Hysteria(bean) => {
            let ca = ca_file(&bean.certificates, ctx);
            let ca_path = ca.as_ref().map(|f| f.path.display().to_string());
            aux_files.extend(ca);
            let protect = if is_vpn { ctx.protect_path.as_deref() } else { None };
            if bean.protocol_version == HysteriaBean::PROTOCOL_VERSION_1 {
                hysteria1_config(profile, bean, port, upstream, ca_path, protect, ctx)
            } else {
                hysteria2_config(profile, bean, port, upstream, ca_path, protect, ctx)
            }
        }
        ProfileBean::Naive(bean) => naive_config(profile, bean, port, upstream),
        _ => return None,
    };

    let config = serde_json::to_string_pretty(&doc).unwrap_or_default();
    Some(RenderedHelper {
        helper_name,
        config,
        aux_files,
    })
}

fn ca_file(certificates: &str, ctx: &CompileContext) -> Option<AuxFile> {
    if certificates.trim().is_empty() {
        return None;
    }
    Some(AuxFile {
        path: ctx
            .cache_dir
            .join(format!("hysteria_{}.ca", uuid::Uuid::new_v4())),
        contents: certificates.to_string(),
    })
}

fn server_with_ports(profile: &Profile, bean: &HysteriaBean, upstream: Option<u16>) -> String {
    // A forwarded server is one fixed local port, so hopping is off.
    if let Some(upstream) = upstream {
        return format!("{}:{}", LOCALHOST, upstream);
    }
    let host = profile.display_address();
    let ports = hop_ports(&bean.server_ports);
    if ports.is_empty() {
        return host;
    }
    // Hop ranges replace the single port: `host:20000-30000,443`.
    let base = host
        .rsplit_once(':')
        .map(|(h, _)| h.to_string())
        .unwrap_or(host);
    format!("{}:{}", base, bean.server_ports.replace(' ', ""))
}

fn hysteria1_config(
    profile: &Profile,
    bean: &HysteriaBean,
    port: u16,
    upstream: Option<u16>,
    ca: Option<String>,
    protect: Option<&str>,
    ctx: &CompileContext,
) -> Value {
    let mut doc = Map::new();
    doc.insert("server".to_string(), json!(server_with_ports(profile, bean, upstream)));
    doc.insert("protocol".to_string(), json!(bean.transport.as_str()));
    doc.insert(
        "up_mbps".to_string(),
        json!(effective_mbps(bean.upload_mbps, ctx.upload_mbps)),
    );
    doc.insert(
        "down_mbps".to_string(),
        json!(effective_mbps(bean.download_mbps, ctx.download_mbps)),
    );
    doc.insert(
        "socks5".to_string(),
        json!({"listen": format!("127.0.0.1:{}", port)}),
    );
    doc.insert("retry".to_string(), json!(5));
    doc.insert("fast_open".to_string(), json!(true));
    doc.insert("lazy_start".to_string(), json!(true));
    if !bean.obfuscation.is_empty() {
        doc.insert("obfs".to_string(), json!(bean.obfuscation));
    }
    match bean.auth_type {
        HysteriaAuthType::None => {}
        HysteriaAuthType::Base64 => {
            doc.insert("auth".to_string(), json!(bean.auth_payload));
        }
        HysteriaAuthType::Str => {
            doc.insert("auth_str".to_string(), json!(bean.auth_payload));
        }
    }
    let sni = sni_or_address(profile, &bean.sni);
    if !sni.is_empty() {
        doc.insert("server_name".to_string(), json!(sni));
    }
    if let Some(alpn) = bean.alpn.lines().map(str::trim).find(|l| !l.is_empty()) {
        doc.insert("alpn".to_string(), json!(alpn));
    }
    if bean.allow_insecure {
        doc.insert("insecure".to_string(), json!(true));
    }
    if let Some(ca) = ca {
        doc.insert("ca".to_string(), json!(ca));
    }
    if bean.stream_receive_window > 0 {
        doc.insert("recv_window".to_string(), json!(bean.stream_receive_window));
    }
    if bean.connection_receive_window > 0 {
        doc.insert(
            "recv_window_conn".to_string(),
            json!(bean.connection_receive_window),
        );
    }
    if bean.disable_mtu_discovery {
        doc.insert("disable_mtu_discovery".to_string(), json!(true));
    }
    if bean.hop_interval > 0 {
        doc.insert("hop_interval".to_string(), json!(bean.hop_interval));
    }
    if let Some(protect) = protect {
        doc.insert("protect_path".to_string(), json!(protect));
    }
    Value::Object(doc)
}

fn hysteria2_config(
    profile: &Profile,
    bean: &HysteriaBean,
    port: u16,
    upstream: Option<u16>,
    ca: Option<String>,
    protect: Option<&str>,
    ctx: &CompileContext,
) -> Value {
    let mut doc = Map::new();
    doc.insert("server".to_string(), json!(server_with_ports(profile, bean, upstream)));
    if !bean.auth_payload.is_empty() {
        doc.insert("auth".to_string(), json!(bean.auth_payload));
    }
    if !bean.obfuscation.is_empty() {
        doc.insert(
            "obfs".to_string(),
            json!({"type": "salamander", "salamander": {"password": bean.obfuscation}}),
        );
    }

    let mut tls = Map::new();
    let sni = sni_or_address(profile, &bean.sni);
    if !sni.is_empty() {
        tls.insert("sni".to_string(), json!(sni));
    }
    if bean.allow_insecure {
        tls.insert("insecure".to_string(), json!(true));
    }
    if let Some(ca) = ca {
        tls.insert("ca".to_string(), json!(ca));
    }
    doc.insert("tls".to_string(), Value::Object(tls));

    let up = effective_mbps(bean.upload_mbps, ctx.upload_mbps);
    let down = effective_mbps(bean.download_mbps, ctx.download_mbps);
    if up > 0 || down > 0 {
        let mut bandwidth = Map::new();
        if up > 0 {
            bandwidth.insert("up".to_string(), json!(format!("{} mbps", up)));
        }
        if down > 0 {
            bandwidth.insert("down".to_string(), json!(format!("{} mbps", down)));
        }
        doc.insert("bandwidth".to_string(), Value::Object(bandwidth));
    }

    if bean.hop_interval > 0 && !bean.server_ports.is_empty() && upstream.is_none() {
        doc.insert(
            "transport".to_string(),
            json!({"udp": {"hopInterval": format!("{}s", bean.hop_interval)}}),
        );
    }
    if bean.disable_mtu_discovery {
        doc.insert("quic".to_string(), json!({"disablePathMTUDiscovery": true}));
    }
    doc.insert(
        "socks5".to_string(),
        json!({"listen": format!("127.0.0.1:{}", port)}),
    );
    doc.insert("lazy".to_string(), json!(true));
    if let Some(protect) = protect {
        doc.insert("protect_path".to_string(), json!(protect));
    }
    Value::Object(doc)
}

fn naive_config(profile: &Profile, bean: &NaiveBean, port: u16, upstream: Option<u16>) -> Value {
    let host = sni_or_address(profile, &bean.sni);
    let credentials = match (bean.username.is_empty(), bean.password.is_empty()) {
        (true, true) => String::new(),
        (false, true) => format!("{}@", bean.username),
        _ => format!("{}:{}@", bean.username, bean.password),
    };
    let server_port = upstream.unwrap_or(profile.common.server_port);
    let authority = if host.contains(':') {
        format!("[{}]:{}", host, server_port)
    } else {
        format!("{}:{}", host, server_port)
    };

    let mut doc = Map::new();
    doc.insert(
        "listen".to_string(),
        json!(format!("socks://127.0.0.1:{}", port)),
    );
    doc.insert(
        "proxy".to_string(),
        json!(format!("{}://{}{}", bean.proto, credentials, authority)),
    );
    let resolve_to = if upstream.is_some() {
        LOCALHOST
    } else {
        profile.common.server_address.as_str()
    };
    if host != resolve_to {
        doc.insert(
            "host-resolver-rules".to_string(),
            json!(format!("MAP {} {}", host, resolve_to)),
        );
    }
    let headers: Vec<&str> = bean
        .extra_headers
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if !headers.is_empty() {
        doc.insert("extra-headers".to_string(), json!(headers.join("\r\n")));
    }
    if bean.insecure_concurrency > 0 {
        doc.insert(
            "insecure-concurrency".to_string(),
            json!(bean.insecure_concurrency),
        );
    }
    Value::Object(doc)
}

fn sni_or_address(profile: &Profile, sni: &str) -> String {
    if sni.is_empty() {
        profile.common.server_address.clone()
    } else {
        sni.to_string()
    }
}
