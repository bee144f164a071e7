//! Per-variant payload encoders and decoders
//!
//! Each payload begins with its own version number so later fields can be appended
//! without breaking older stored profiles.

use super::buffer::{ByteReader, ByteWriter};
use crate::error::{CodecError, CodecResult};
use crate::models::*;

const HYSTERIA_VERSION: i32 = 2;
const TROJAN_VERSION: i32 = 0;
const NAIVE_VERSION: i32 = 0;
const DIRECT_VERSION: i32 = 0;
const CONFIG_VERSION: i32 = 0;

/// Serialize a bare profile value (no record wrapper).
pub fn encode_profile(profile: &Profile) -> Vec<u8> {
    let mut w = ByteWriter::new();
    match &profile.bean {
        ProfileBean::Trojan(bean) => {
            w.write_i32(TROJAN_VERSION);
            write_common(&mut w, &profile.common);
            write_trojan(&mut w, bean);
        }
        ProfileBean::Naive(bean) => {
            w.write_i32(NAIVE_VERSION);
            write_common(&mut w, &profile.common);
            write_naive(&mut w, bean);
        }
        ProfileBean::Hysteria(bean) => {
            w.write_i32(HYSTERIA_VERSION);
            write_common(&mut w, &profile.common);
            write_hysteria(&mut w, bean);
        }
        ProfileBean::Direct(_) => {
            w.write_i32(DIRECT_VERSION);
            write_common(&mut w, &profile.common);
        }
        ProfileBean::Config(bean) => {
            w.write_i32(CONFIG_VERSION);
            write_common(&mut w, &profile.common);
            w.write_i32(bean.kind.to_i32());
            w.write_str(&bean.config);
        }
    }
    w.into_bytes()
}

/// Deserialize the payload of the variant registered under `type_tag`.
///
/// Bytes left over after the variant's fields are ignored.
pub fn decode_profile(type_tag: i32, bytes: &[u8]) -> CodecResult<Profile> {
    if type_name_for_tag(type_tag).is_none() {
        return Err(CodecError::UnknownTypeTag(type_tag));
    }
    if bytes.is_empty() {
        return Err(CodecError::EmptyPayload(type_tag));
    }

    let mut r = ByteReader::new(bytes);
    let version = r.read_i32()?;
    let common = read_common(&mut r)?;
    let bean = match type_tag {
        TYPE_TROJAN => ProfileBean::Trojan(read_trojan(&mut r)?),
        TYPE_NAIVE => ProfileBean::Naive(read_naive(&mut r)?),
        TYPE_HYSTERIA => ProfileBean::Hysteria(read_hysteria(&mut r, version)?),
        TYPE_DIRECT => ProfileBean::Direct(DirectBean::default()),
        TYPE_CONFIG => {
            let kind = read_enum(&mut r, "config kind", ConfigKind::from_i32)?;
            ProfileBean::Config(ConfigBean {
                kind,
                config: r.read_str()?,
            })
        }
        other => return Err(CodecError::UnknownTypeTag(other)),
    };
    Ok(Profile::new(common, bean))
}

fn read_enum<T>(
    r: &mut ByteReader<'_>,
    field: &'static str,
    convert: fn(i32) -> Option<T>,
) -> CodecResult<T> {
    let raw = r.read_i32()?;
    convert(raw).ok_or(CodecError::InvalidField {
        field,
        value: raw.into(),
    })
}

fn write_common(w: &mut ByteWriter, common: &CommonFields) {
    w.write_str(&common.name);
    w.write_str(&common.server_address);
    w.write_i32(common.server_port.into());
    w.write_bool(common.mux.enabled);
    w.write_bool(common.mux.padding);
    w.write_i32(common.mux.protocol.to_i32());
    w.write_i32(common.mux.strategy.to_i32());
    w.write_i32(common.mux.number);
    w.write_bool(common.mux.brutal);
}

fn read_common(r: &mut ByteReader<'_>) -> CodecResult<CommonFields> {
    let name = r.read_str()?;
    let server_address = r.read_str()?;
    let raw_port = r.read_i32()?;
    let server_port = u16::try_from(raw_port).map_err(|_| CodecError::InvalidField {
        field: "server port",
        value: raw_port.into(),
    })?;
    let enabled = r.read_bool()?;
    let padding = r.read_bool()?;
    let protocol = read_enum(r, "mux protocol", MuxProtocol::from_i32)?;
    let strategy = read_enum(r, "mux strategy", MuxStrategy::from_i32)?;
    let number = r.read_i32()?;
    let brutal = r.read_bool()?;
    Ok(CommonFields {
        name,
        server_address,
        server_port,
        mux: MuxSettings {
            enabled,
            padding,
            protocol,
            strategy,
            number,
            brutal,
        },
    })
}

fn write_hysteria(w: &mut ByteWriter, bean: &HysteriaBean) {
    w.write_i32(bean.protocol_version);
    w.write_str(&bean.server_ports);
    w.write_str(&bean.obfuscation);
    w.write_i32(bean.auth_type.to_i32());
    w.write_str(&bean.auth_payload);
    w.write_i32(bean.transport.to_i32());
    w.write_str(&bean.sni);
    w.write_str(&bean.alpn);
    w.write_str(&bean.certificates);
    w.write_bool(bean.allow_insecure);
    w.write_bool(bean.disable_sni);
    w.write_i32(bean.stream_receive_window);
    w.write_i32(bean.connection_receive_window);
    w.write_bool(bean.disable_mtu_discovery);
    w.write_i32(bean.upload_mbps);
    w.write_i32(bean.download_mbps);
    w.write_i64(bean.hop_interval);
    w.write_bool(bean.ech);
    w.write_str(&bean.ech_config);
}

fn read_hysteria(r: &mut ByteReader<'_>, version: i32) -> CodecResult<HysteriaBean> {
    let mut bean = HysteriaBean {
        protocol_version: r.read_i32()?,
        server_ports: r.read_str()?,
        obfuscation: r.read_str()?,
        auth_type: read_enum(r, "hysteria auth type", HysteriaAuthType::from_i32)?,
        auth_payload: r.read_str()?,
        transport: read_enum(r, "hysteria protocol", HysteriaTransport::from_i32)?,
        sni: r.read_str()?,
        alpn: r.read_str()?,
        certificates: r.read_str()?,
        allow_insecure: r.read_bool()?,
        disable_sni: r.read_bool()?,
        stream_receive_window: r.read_i32()?,
        connection_receive_window: r.read_i32()?,
        disable_mtu_discovery: r.read_bool()?,
        upload_mbps: r.read_i32()?,
        download_mbps: r.read_i32()?,
        ..HysteriaBean::default()
    };
    if version >= 1 {
        bean.hop_interval = r.read_i64()?;
    }
    if version >= 2 {
        bean.ech = r.read_bool()?;
        bean.ech_config = r.read_str()?;
    }
    Ok(bean)
}

fn write_trojan(w: &mut ByteWriter, bean: &TrojanBean) {
    w.write_str(&bean.password);
    w.write_str(&bean.sni);
    w.write_str(&bean.alpn);
    w.write_str(&bean.certificates);
    w.write_bool(bean.allow_insecure);
    w.write_str(&bean.utls_fingerprint);
    w.write_str(&bean.reality_public_key);
    w.write_str(&bean.reality_short_id);
    w.write_bool(bean.ech);
    w.write_str(&bean.ech_config);
}

fn read_trojan(r: &mut ByteReader<'_>) -> CodecResult<TrojanBean> {
    Ok(TrojanBean {
        password: r.read_str()?,
        sni: r.read_str()?,
        alpn: r.read_str()?,
        certificates: r.read_str()?,
        allow_insecure: r.read_bool()?,
        utls_fingerprint: r.read_str()?,
        reality_public_key: r.read_str()?,
        reality_short_id: r.read_str()?,
        ech: r.read_bool()?,
        ech_config: r.read_str()?,
    })
}

fn write_naive(w: &mut ByteWriter, bean: &NaiveBean) {
    w.write_str(&bean.proto);
    w.write_str(&bean.username);
    w.write_str(&bean.password);
    w.write_str(&bean.sni);
    w.write_str(&bean.extra_headers);
    w.write_i32(bean.insecure_concurrency);
}

fn read_naive(r: &mut ByteReader<'_>) -> CodecResult<NaiveBean> {
    Ok(NaiveBean {
        proto: r.read_str()?,
        username: r.read_str()?,
        password: r.read_str()?,
        sni: r.read_str()?,
        extra_headers: r.read_str()?,
        insecure_concurrency: r.read_i32()?,
    })
}
