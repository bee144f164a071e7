//! Core outbound documents
//!
//! Builds the outbound object the forwarding core consumes from a profile, and parses
//! such objects back into profiles.

pub mod common;
pub mod hysteria;
pub mod tls;
pub mod trojan;

pub use common::{build_multiplex, parse_common_fields, raw_bool, raw_string, Unmatched};
pub use tls::{listable, parse_box_tls, OutboundTlsOptions};

use serde_json::{json, Map, Value};

use crate::config::CompileContext;
use crate::error::CompileError;
use crate::models::{CommonFields, DirectBean, Profile, ProfileBean};

/// Build the outbound document for `profile`.
///
/// Raw configuration profiles come back verbatim. For every other variant `type` and
/// `tag` are always taken from the profile, whatever the variant builder wrote.
pub fn build_outbound(profile: &Profile, ctx: &CompileContext) -> Result<Value, CompileError> {
    let mut map = match &profile.bean {
        ProfileBean::Config(bean) => return Ok(serde_json::from_str(&bean.config)?),
        ProfileBean::Hysteria(bean) => hysteria::build_hysteria_outbound(&profile.common, bean, ctx),
        ProfileBean::Trojan(bean) => trojan::build_trojan_outbound(&profile.common, bean, ctx),
        ProfileBean::Direct(_) => build_direct_outbound(),
        ProfileBean::Naive(_) => return Err(CompileError::UnsupportedVariant("naive")),
    };

    let outbound_type = profile
        .outbound_type()
        .ok_or(CompileError::UnsupportedVariant(profile.type_name()))?;
    map.insert("type".to_string(), json!(outbound_type));
    map.insert("tag".to_string(), json!(profile.common.name));
    Ok(Value::Object(map))
}

fn build_direct_outbound() -> Map<String, Value> {
    let mut out = Map::new();
    // Keeps the direct outbound from being an empty object.
    out.insert("reuse_addr".to_string(), json!(true));
    out
}

fn parse_direct_outbound(doc: &Map<String, Value>) -> Profile {
    let (common, _) = parse_common_fields(doc);
    Profile::new(
        CommonFields {
            name: common.name,
            ..CommonFields::default()
        },
        ProfileBean::Direct(DirectBean::default()),
    )
}

/// Recognise an outbound document by its `type`. Unknown types give `None`.
pub fn parse_outbound(doc: &Map<String, Value>) -> Option<Profile> {
    let kind = doc.get("type").map(raw_string)?;
    match kind.as_str() {
        "hysteria" => Some(hysteria::parse_hysteria1_outbound(doc)),
        "hysteria2" => Some(hysteria::parse_hysteria2_outbound(doc)),
        "trojan" => Some(trojan::parse_trojan_outbound(doc)),
        "direct" => Some(parse_direct_outbound(doc)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConfigBean, ConfigKind, HysteriaBean, NaiveBean, TrojanBean};

    fn profile(name: &str, bean: ProfileBean) -> Profile {
        Profile::new(
            CommonFields {
                name: name.to_string(),
                server_address: "example.com".to_string(),
                ..CommonFields::default()
            },
            bean,
        )
    }

    #[test]
    fn type_and_tag_come_from_profile() {
        let out = build_outbound(
            &profile("edge", ProfileBean::Hysteria(HysteriaBean::default())),
            &CompileContext::default(),
        )
        .unwrap();
        assert_eq!(out["type"], json!("hysteria2"));
        assert_eq!(out["tag"], json!("edge"));

        let out = build_outbound(
            &profile("home", ProfileBean::Direct(DirectBean::default())),
            &CompileContext::default(),
        )
        .unwrap();
        assert_eq!(out, json!({"type": "direct", "tag": "home", "reuse_addr": true}));
    }

    #[test]
    fn raw_config_is_returned_verbatim() {
        let raw = r#"{"type":"vless","tag":"mine","server":"1.1.1.1","uuid":"x"}"#;
        let out = build_outbound(
            &profile(
                "ignored",
                ProfileBean::Config(ConfigBean {
                    kind: ConfigKind::Outbound,
                    config: raw.to_string(),
                }),
            ),
            &CompileContext::default(),
        )
        .unwrap();
        assert_eq!(out, serde_json::from_str::<Value>(raw).unwrap());
    }

    #[test]
    fn helper_only_variant_has_no_outbound() {
        let err = build_outbound(
            &profile("n", ProfileBean::Naive(NaiveBean::default())),
            &CompileContext::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedVariant("naive")));
    }

    #[test]
    fn parse_outbound_dispatches_on_type() {
        let doc = json!({"type": "trojan", "tag": "t", "password": "pw"});
        let parsed = parse_outbound(doc.as_object().unwrap()).unwrap();
        assert!(matches!(parsed.bean, ProfileBean::Trojan(TrojanBean { ref password, .. }) if password == "pw"));

        let doc = json!({"type": "vmess"});
        assert!(parse_outbound(doc.as_object().unwrap()).is_none());
    }

    #[test]
    fn built_outbound_parses_back() {
        let original = profile(
            "tr",
            ProfileBean::Trojan(TrojanBean {
                password: "pw".to_string(),
                sni: "sni.example.com".to_string(),
                ..TrojanBean::default()
            }),
        );
        let out = build_outbound(&original, &CompileContext::default()).unwrap();
        let parsed = parse_outbound(out.as_object().unwrap()).unwrap();
        assert_eq!(parsed, original);
    }
}
