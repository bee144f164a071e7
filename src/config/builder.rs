//! Compile a chain of profiles into the core's configuration document

use std::collections::HashMap;
use std::net::TcpListener;

use serde::Serialize;
use serde_json::{json, Map, Value};

use super::helpers::render_helper;
use super::CompileContext;
use crate::error::CompileError;
use crate::models::{ConfigKind, ProfileBean, ProxyRecord};
use crate::outbound::build_outbound;

const LOCALHOST: &str = "127.0.0.1";
pub const TAG_DIRECT: &str = "direct";
pub const TAG_MIXED_IN: &str = "mixed-in";

/// One chain's helper-backed hops, keyed by the local port the core reaches them on.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExternalChain {
    pub entries: Vec<(u16, ProxyRecord)>,
    /// Helper port → local port the helper dials instead of its server, for helpers
    /// that sit behind earlier hops
    pub upstreams: HashMap<u16, u16>,
}

impl ExternalChain {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn upstream(&self, port: u16) -> Option<u16> {
        self.upstreams.get(&port).copied()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigBuildResult {
    /// JSON text handed to the core
    pub config: String,
    /// Outbound tag → record ids whose traffic it carries
    pub traffic_map: HashMap<String, Vec<i64>>,
    pub external_index: Vec<ExternalChain>,
}

impl ConfigBuildResult {
    pub fn needs_helpers(&self) -> bool {
        self.external_index.iter().any(|chain| !chain.is_empty())
    }
}

/// Hands out local ports for helpers.
///
/// Ephemeral ports stay bound until the allocator drops, so one compile never hands
/// out the same port twice.
struct PortAllocator {
    next: u16,
    held: Vec<TcpListener>,
}

impl PortAllocator {
    fn new(base: u16) -> Self {
        Self {
            next: base,
            held: Vec::new(),
        }
    }

    fn allocate(&mut self) -> Result<u16, CompileError> {
        if self.next == 0 {
            let listener =
                TcpListener::bind((LOCALHOST, 0)).map_err(CompileError::PortAllocation)?;
            let port = listener
                .local_addr()
                .map_err(CompileError::PortAllocation)?
                .port();
            self.held.push(listener);
            return Ok(port);
        }
        let port = self.next;
        self.next = self.next.wrapping_add(1);
        Ok(port)
    }
}

/// Compile `chain` (first hop first) into the core document.
///
/// Test builds skip the local inbound; the caller drives traffic through the core
/// directly.
pub fn build_config(
    chain: &[ProxyRecord],
    ctx: &CompileContext,
    for_test: bool,
) -> Result<ConfigBuildResult, CompileError> {
    let Some(first) = chain.first() else {
        return Err(CompileError::EmptyChain);
    };

    if let ProfileBean::Config(bean) = &first.require_bean().bean {
        if bean.kind == ConfigKind::Full {
            if chain.len() > 1 {
                return Err(CompileError::FullConfigInChain);
            }
            // Validate, but hand the text over untouched.
            serde_json::from_str::<Value>(&bean.config)?;
            return Ok(ConfigBuildResult {
                config: bean.config.clone(),
                traffic_map: HashMap::new(),
                external_index: vec![ExternalChain::default()],
            });
        }
    }

    let mut ports = PortAllocator::new(ctx.helper_port_base);
    let mut outbounds = Vec::with_capacity(chain.len() + 1);
    let mut traffic_map = HashMap::new();
    let mut external = ExternalChain::default();
    let mut inbounds = Vec::new();
    let mut rules = Vec::new();
    if !for_test {
        inbounds.push(json!({
            "type": "mixed",
            "tag": TAG_MIXED_IN,
            "listen": LOCALHOST,
            "listen_port": ctx.mixed_port,
        }));
    }
    let mut previous: Option<String> = None;
    let mut last_tag = String::new();

    for (index, record) in chain.iter().enumerate() {
        let profile = record.require_bean();
        if matches!(&profile.bean, ProfileBean::Config(b) if b.kind == ConfigKind::Full) {
            return Err(CompileError::FullConfigInChain);
        }

        let tag = format!("proxy-{}-{}", record.id, index);
        let mut outbound = if record.needs_external() {
            let port = ports.allocate()?;
            external.entries.push((port, record.clone()));
            if let Some(detour) = &previous {
                // The helper dials its server itself. Forward a local port to the
                // server through the earlier hops and point the helper at it.
                let upstream = ports.allocate()?;
                let inbound_tag = format!("{}-upstream", tag);
                inbounds.push(json!({
                    "type": "direct",
                    "tag": inbound_tag,
                    "listen": LOCALHOST,
                    "listen_port": upstream,
                    "override_address": profile.common.server_address,
                    "override_port": profile.common.server_port,
                }));
                rules.push(json!({"inbound": [inbound_tag], "outbound": detour}));
                external.upstreams.insert(port, upstream);
            }
            json!({
                "type": "socks",
                "tag": tag,
                "server": LOCALHOST,
                "server_port": port,
                "version": "5",
            })
        } else {
            let mut outbound = build_outbound(profile, ctx)?;
            if let Some(detour) = &previous {
                if let Some(map) = outbound.as_object_mut() {
                    map.insert("detour".to_string(), json!(detour));
                }
            }
            outbound
        };
        if let Some(map) = outbound.as_object_mut() {
            map.insert("tag".to_string(), json!(tag));
        }
        previous = Some(tag.clone());

        tracing::debug!(
            "compiled hop {} ({}) as {}",
            index,
            profile.display_type(),
            tag
        );
        traffic_map.insert(tag.clone(), vec![record.id]);
        outbounds.push(outbound);
        last_tag = tag;
    }

    outbounds.push(json!({"type": "direct", "tag": TAG_DIRECT}));

    let mut doc = Map::new();
    doc.insert("log".to_string(), log_block(ctx));
    doc.insert("inbounds".to_string(), Value::Array(inbounds));
    doc.insert("outbounds".to_string(), Value::Array(outbounds));
    let mut route = json!({"final": last_tag, "auto_detect_interface": true});
    if !rules.is_empty() {
        route["rules"] = Value::Array(rules);
    }
    doc.insert("route".to_string(), route);

    let config = serde_json::to_string_pretty(&Value::Object(doc))?;
    Ok(ConfigBuildResult {
        config,
        traffic_map,
        external_index: vec![external],
    })
}

/// A record's configuration in shareable form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedConfig {
    pub file_name: String,
    pub content: String,
}

/// Primary document followed by every helper configuration, blank-line separated.
pub fn export_config(
    record: &ProxyRecord,
    ctx: &CompileContext,
) -> Result<ExportedConfig, CompileError> {
    let result = build_config(std::slice::from_ref(record), ctx, false)?;
    let mut file_name = format!("{}.json", record.display_name());
    let mut content = result.config.clone();

    if result.needs_helpers() {
        file_name = "profiles.txt".to_string();
    }
    for chain in &result.external_index {
        for (port, hop) in &chain.entries {
            let upstream = chain.upstream(*port);
            if let Some(rendered) = render_helper(hop.require_bean(), *port, upstream, false, ctx)
            {
                content.push_str("\n\n");
                content.push_str(&rendered.config);
            }
        }
    }

    Ok(ExportedConfig { file_name, content })
}

fn log_block(ctx: &CompileContext) -> Value {
    match ctx.core_log_level() {
        Some(level) => json!({"level": level, "timestamp": true}),
        None => json!({"disabled": true}),
    }
}
