use serde_json::{json, Map, Value};

use super::common::{build_multiplex, parse_common_fields, raw_string};
use super::tls::{
    certificate_lines, non_empty, parse_box_tls, split_lines, EchOptions, OutboundTlsOptions,
    RealityOptions, UtlsOptions,
};
use crate::config::CompileContext;
use crate::models::{CommonFields, Profile, ProfileBean, TrojanBean};

pub fn build_trojan_outbound(
    common: &CommonFields,
    bean: &TrojanBean,
    ctx: &CompileContext,
) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert("server".to_string(), json!(common.server_address));
    out.insert("server_port".to_string(), json!(common.server_port));
    out.insert("password".to_string(), json!(bean.password));

    let tls = OutboundTlsOptions {
        enabled: Some(true),
        server_name: non_empty(&bean.sni),
        insecure: Some(bean.allow_insecure),
        alpn: split_lines(&bean.alpn),
        certificate: certificate_lines(&bean.certificates),
        utls: non_empty(&bean.utls_fingerprint).map(|fingerprint| UtlsOptions {
            enabled: true,
            fingerprint,
        }),
        reality: non_empty(&bean.reality_public_key).map(|public_key| RealityOptions {
            enabled: true,
            public_key,
            short_id: bean.reality_short_id.clone(),
        }),
        ech: bean.ech.then(|| EchOptions {
            enabled: true,
            config: split_lines(&bean.ech_config),
        }),
        ..OutboundTlsOptions::default()
    };
    if let Ok(tls) = serde_json::to_value(&tls) {
        out.insert("tls".to_string(), tls);
    }

    if let Some(mux) = build_multiplex(common, ctx) {
        out.insert("multiplex".to_string(), mux);
    }
    out
}

pub fn parse_trojan_outbound(doc: &Map<String, Value>) -> Profile {
    let (common, unmatched) = parse_common_fields(doc);
    let mut bean = TrojanBean::default();

    for (key, value) in &unmatched {
        match key.as_str() {
            "password" => bean.password = raw_string(value),
            "tls" => {
                let Some(field) = value.as_object() else {
                    continue;
                };
                let tls = parse_box_tls(field);
                bean.sni = tls.server_name.unwrap_or_default();
                bean.allow_insecure = tls.insecure.unwrap_or(false);
                bean.alpn = tls.alpn.unwrap_or_default().join("\n");
                bean.certificates = tls.certificate.unwrap_or_default().join("\n");
                if let Some(utls) = tls.utls.filter(|u| u.enabled) {
                    bean.utls_fingerprint = utls.fingerprint;
                }
                if let Some(reality) = tls.reality.filter(|r| r.enabled) {
                    bean.reality_public_key = reality.public_key;
                    bean.reality_short_id = reality.short_id;
                }
                if let Some(ech) = tls.ech {
                    bean.ech = ech.enabled;
                    bean.ech_config = ech.config.unwrap_or_default().join("\n");
                }
            }
            _ => {}
        }
    }

    Profile::new(common, ProfileBean::Trojan(bean))
}
