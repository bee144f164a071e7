//! Proxy profile model
//!
//! A profile is one proxy endpoint: the fields every protocol shares plus exactly one
//! protocol-specific bean.

use serde::{Deserialize, Serialize};

/// Multiplex wire protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MuxProtocol {
    #[default]
    H2mux,
    Smux,
    Yamux,
}

impl MuxProtocol {
    /// Parse the core's protocol name; anything unknown falls back to h2mux
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "smux" => MuxProtocol::Smux,
            "yamux" => MuxProtocol::Yamux,
            _ => MuxProtocol::H2mux,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MuxProtocol::H2mux => "h2mux",
            MuxProtocol::Smux => "smux",
            MuxProtocol::Yamux => "yamux",
        }
    }

    pub fn to_i32(self) -> i32 {
        match self {
            MuxProtocol::H2mux => 0,
            MuxProtocol::Smux => 1,
            MuxProtocol::Yamux => 2,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(MuxProtocol::H2mux),
            1 => Some(MuxProtocol::Smux),
            2 => Some(MuxProtocol::Yamux),
            _ => None,
        }
    }
}

/// Which multiplex limit the strategy number applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MuxStrategy {
    #[default]
    MaxConnections,
    MinStreams,
    MaxStreams,
}

impl MuxStrategy {
    pub fn to_i32(self) -> i32 {
        match self {
            MuxStrategy::MaxConnections => 0,
            MuxStrategy::MinStreams => 1,
            MuxStrategy::MaxStreams => 2,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(MuxStrategy::MaxConnections),
            1 => Some(MuxStrategy::MinStreams),
            2 => Some(MuxStrategy::MaxStreams),
            _ => None,
        }
    }
}

/// Generic multiplex settings carried by every profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuxSettings {
    pub enabled: bool,
    pub padding: bool,
    pub protocol: MuxProtocol,
    pub strategy: MuxStrategy,
    pub number: i32,
    /// TCP Brutal congestion control
    pub brutal: bool,
}

impl Default for MuxSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            padding: false,
            protocol: MuxProtocol::H2mux,
            strategy: MuxStrategy::MaxConnections,
            number: 8,
            brutal: false,
        }
    }
}

/// Fields shared by every protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonFields {
    pub name: String,
    pub server_address: String,
    pub server_port: u16,
    pub mux: MuxSettings,
}

impl Default for CommonFields {
    fn default() -> Self {
        Self {
            name: String::new(),
            server_address: "127.0.0.1".to_string(),
            server_port: 443,
            mux: MuxSettings::default(),
        }
    }
}

/// Hysteria authentication payload encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HysteriaAuthType {
    #[default]
    None,
    Base64,
    Str,
}

impl HysteriaAuthType {
    pub fn to_i32(self) -> i32 {
        match self {
            HysteriaAuthType::None => 0,
            HysteriaAuthType::Base64 => 1,
            HysteriaAuthType::Str => 2,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(HysteriaAuthType::None),
            1 => Some(HysteriaAuthType::Base64),
            2 => Some(HysteriaAuthType::Str),
            _ => None,
        }
    }
}

/// Hysteria packet transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HysteriaTransport {
    #[default]
    Udp,
    FakeTcp,
    WechatVideo,
}

impl HysteriaTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            HysteriaTransport::Udp => "udp",
            HysteriaTransport::FakeTcp => "faketcp",
            HysteriaTransport::WechatVideo => "wechat-video",
        }
    }

    pub fn to_i32(self) -> i32 {
        match self {
            HysteriaTransport::Udp => 0,
            HysteriaTransport::FakeTcp => 1,
            HysteriaTransport::WechatVideo => 2,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(HysteriaTransport::Udp),
            1 => Some(HysteriaTransport::FakeTcp),
            2 => Some(HysteriaTransport::WechatVideo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HysteriaBean {
    pub protocol_version: i32,
    /// Port hopping ranges, e.g. `20000-30000,443`. Empty means `server_port` only.
    pub server_ports: String,
    pub obfuscation: String,
    pub auth_type: HysteriaAuthType,
    pub auth_payload: String,
    pub transport: HysteriaTransport,
    pub sni: String,
    /// Newline separated
    pub alpn: String,
    /// PEM text
    pub certificates: String,
    pub allow_insecure: bool,
    pub disable_sni: bool,
    pub stream_receive_window: i32,
    pub connection_receive_window: i32,
    pub disable_mtu_discovery: bool,
    pub upload_mbps: i32,
    pub download_mbps: i32,
    /// Seconds
    pub hop_interval: i64,
    pub ech: bool,
    pub ech_config: String,
}

impl HysteriaBean {
    pub const PROTOCOL_VERSION_1: i32 = 1;
    pub const PROTOCOL_VERSION_2: i32 = 2;

    /// The core only speaks Hysteria over plain UDP.
    pub fn can_use_core(&self) -> bool {
        self.transport == HysteriaTransport::Udp
    }

    pub fn outbound_type(&self) -> &'static str {
        if self.protocol_version == Self::PROTOCOL_VERSION_1 {
            "hysteria"
        } else {
            "hysteria2"
        }
    }
}

impl Default for HysteriaBean {
    fn default() -> Self {
        Self {
            protocol_version: Self::PROTOCOL_VERSION_2,
            server_ports: String::new(),
            obfuscation: String::new(),
            auth_type: HysteriaAuthType::None,
            auth_payload: String::new(),
            transport: HysteriaTransport::Udp,
            sni: String::new(),
            alpn: String::new(),
            certificates: String::new(),
            allow_insecure: false,
            disable_sni: false,
            stream_receive_window: 0,
            connection_receive_window: 0,
            disable_mtu_discovery: false,
            upload_mbps: 0,
            download_mbps: 0,
            hop_interval: 10,
            ech: false,
            ech_config: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TrojanBean {
    pub password: String,
    pub sni: String,
    /// Newline separated
    pub alpn: String,
    pub certificates: String,
    pub allow_insecure: bool,
    pub utls_fingerprint: String,
    pub reality_public_key: String,
    pub reality_short_id: String,
    pub ech: bool,
    pub ech_config: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NaiveBean {
    /// `https` or `quic`
    pub proto: String,
    pub username: String,
    pub password: String,
    pub sni: String,
    /// One `Key: Value` per line
    pub extra_headers: String,
    pub insecure_concurrency: i32,
}

impl Default for NaiveBean {
    fn default() -> Self {
        Self {
            proto: "https".to_string(),
            username: String::new(),
            password: String::new(),
            sni: String::new(),
            extra_headers: String::new(),
            insecure_concurrency: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DirectBean {}

/// Kind of document stored in a [`ConfigBean`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConfigKind {
    /// A complete core configuration
    #[default]
    Full,
    /// A single outbound object
    Outbound,
}

impl ConfigKind {
    pub fn to_i32(self) -> i32 {
        match self {
            ConfigKind::Full => 0,
            ConfigKind::Outbound => 1,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(ConfigKind::Full),
            1 => Some(ConfigKind::Outbound),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConfigBean {
    pub kind: ConfigKind,
    /// Raw JSON, handed to the core untouched
    pub config: String,
}

/// The protocol-specific part of a profile. Exactly one is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileBean {
    Trojan(TrojanBean),
    Naive(NaiveBean),
    Hysteria(HysteriaBean),
    Direct(DirectBean),
    Config(ConfigBean),
}

/// Numeric type tags, stable across the binary record format
pub const TYPE_TROJAN: i32 = 6;
pub const TYPE_NAIVE: i32 = 9;
pub const TYPE_HYSTERIA: i32 = 15;
pub const TYPE_DIRECT: i32 = 23;
pub const TYPE_CONFIG: i32 = 998;

/// Every registered `(type name, type tag)` pair.
pub const TYPE_MAP: [(&str, i32); 5] = [
    ("trojan", TYPE_TROJAN),
    ("naive", TYPE_NAIVE),
    ("hysteria", TYPE_HYSTERIA),
    ("direct", TYPE_DIRECT),
    ("config", TYPE_CONFIG),
];

pub fn type_tag_for_name(name: &str) -> Option<i32> {
    TYPE_MAP
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, tag)| *tag)
}

pub fn type_name_for_tag(tag: i32) -> Option<&'static str> {
    TYPE_MAP
        .iter()
        .find(|(_, t)| *t == tag)
        .map(|(name, _)| *name)
}

/// A proxy profile value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub common: CommonFields,
    pub bean: ProfileBean,
}

impl Profile {
    pub fn new(common: CommonFields, bean: ProfileBean) -> Self {
        Self { common, bean }
    }

    pub fn type_tag(&self) -> i32 {
        match self.bean {
            ProfileBean::Trojan(_) => TYPE_TROJAN,
            ProfileBean::Naive(_) => TYPE_NAIVE,
            ProfileBean::Hysteria(_) => TYPE_HYSTERIA,
            ProfileBean::Direct(_) => TYPE_DIRECT,
            ProfileBean::Config(_) => TYPE_CONFIG,
        }
    }

    /// Name used in universal links
    pub fn type_name(&self) -> &'static str {
        match self.bean {
            ProfileBean::Trojan(_) => "trojan",
            ProfileBean::Naive(_) => "naive",
            ProfileBean::Hysteria(_) => "hysteria",
            ProfileBean::Direct(_) => "direct",
            ProfileBean::Config(_) => "config",
        }
    }

    /// Wire protocol name of the core outbound, if the core has one
    pub fn outbound_type(&self) -> Option<&'static str> {
        match &self.bean {
            ProfileBean::Trojan(_) => Some("trojan"),
            ProfileBean::Hysteria(bean) => Some(bean.outbound_type()),
            ProfileBean::Direct(_) => Some("direct"),
            ProfileBean::Naive(_) | ProfileBean::Config(_) => None,
        }
    }

    pub fn display_type(&self) -> String {
        match &self.bean {
            ProfileBean::Trojan(_) => "Trojan".to_string(),
            ProfileBean::Naive(_) => "Naïve".to_string(),
            ProfileBean::Hysteria(bean) => format!("Hysteria{}", bean.protocol_version),
            ProfileBean::Direct(_) => "Direct".to_string(),
            ProfileBean::Config(bean) => match bean.kind {
                ConfigKind::Full => "Config".to_string(),
                ConfigKind::Outbound => "Outbound".to_string(),
            },
        }
    }

    pub fn display_name(&self) -> String {
        if self.common.name.is_empty() {
            self.display_address()
        } else {
            self.common.name.clone()
        }
    }

    pub fn display_address(&self) -> String {
        match self.bean {
            ProfileBean::Direct(_) | ProfileBean::Config(_) => String::new(),
            _ => {
                let host = &self.common.server_address;
                if host.contains(':') {
                    format!("[{}]:{}", host, self.common.server_port)
                } else {
                    format!("{}:{}", host, self.common.server_port)
                }
            }
        }
    }

    /// True when the core cannot run this profile and a helper process must.
    pub fn needs_external(&self) -> bool {
        match &self.bean {
            ProfileBean::Naive(_) => true,
            ProfileBean::Hysteria(bean) => !bean.can_use_core(),
            ProfileBean::Trojan(_) | ProfileBean::Direct(_) | ProfileBean::Config(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_map_is_bijective() {
        for (name, tag) in TYPE_MAP {
            assert_eq!(type_tag_for_name(name), Some(tag));
            assert_eq!(type_name_for_tag(tag), Some(name));
        }
        assert_eq!(type_tag_for_name("bogus"), None);
        assert_eq!(type_name_for_tag(0), None);
    }

    #[test]
    fn hysteria_needs_helper_only_off_udp() {
        let mut bean = HysteriaBean::default();
        let profile = Profile::new(CommonFields::default(), ProfileBean::Hysteria(bean.clone()));
        assert!(!profile.needs_external());

        bean.transport = HysteriaTransport::FakeTcp;
        let profile = Profile::new(CommonFields::default(), ProfileBean::Hysteria(bean));
        assert!(profile.needs_external());
    }

    #[test]
    fn naive_always_needs_helper() {
        let profile = Profile::new(
            CommonFields::default(),
            ProfileBean::Naive(NaiveBean::default()),
        );
        assert!(profile.needs_external());
        assert_eq!(profile.outbound_type(), None);
    }

    #[test]
    fn display_address_brackets_ipv6() {
        let common = CommonFields {
            server_address: "::1".to_string(),
            server_port: 8443,
            ..CommonFields::default()
        };
        let profile = Profile::new(common, ProfileBean::Trojan(TrojanBean::default()));
        assert_eq!(profile.display_address(), "[::1]:8443");
        assert_eq!(profile.display_name(), "[::1]:8443");
    }
}
