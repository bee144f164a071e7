//! Universal links
//!
//! `husi://<type>?<base64url(zlib(profile))>` is the only form produced. The older
//! `husi://<type>:<ignored>:<base64(profile)>` form is still accepted on import.

use std::io::{Read, Write};

use base64::{engine::general_purpose, Engine as _};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::beans::{decode_profile, encode_profile};
use crate::error::{CodecError, CodecResult};
use crate::models::{type_tag_for_name, Profile};

pub const LINK_SCHEME: &str = "husi";

pub fn encode_link(profile: &Profile) -> CodecResult<String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&encode_profile(profile))?;
    let compressed = encoder.finish()?;
    Ok(format!(
        "{}://{}?{}",
        LINK_SCHEME,
        profile.type_name(),
        general_purpose::URL_SAFE_NO_PAD.encode(compressed)
    ))
}

pub fn decode_link(link: &str) -> CodecResult<Profile> {
    let prefix = format!("{}://", LINK_SCHEME);
    let body = link
        .trim()
        .strip_prefix(prefix.as_str())
        .ok_or_else(|| CodecError::MalformedLink(format!("expected {} prefix", prefix)))?;

    if let Some((type_name, payload)) = body.split_once('?') {
        let tag = lookup_type(type_name)?;
        let compressed = b64_decode(payload)?;
        let mut raw = Vec::new();
        ZlibDecoder::new(compressed.as_slice())
            .read_to_end(&mut raw)
            .map_err(|e| CodecError::MalformedLink(format!("bad compressed payload: {}", e)))?;
        decode_profile(tag, &raw)
    } else {
        let (type_name, rest) = body
            .split_once(':')
            .ok_or_else(|| CodecError::MalformedLink("missing payload".to_string()))?;
        let tag = lookup_type(type_name)?;
        let (_, payload) = rest
            .split_once(':')
            .ok_or_else(|| CodecError::MalformedLink("missing payload".to_string()))?;
        decode_profile(tag, &b64_decode(payload)?)
    }
}

fn lookup_type(type_name: &str) -> CodecResult<i32> {
    type_tag_for_name(type_name).ok_or_else(|| CodecError::UnknownTypeName(type_name.to_string()))
}

/// Accepts both alphabets, with or without padding.
fn b64_decode(text: &str) -> CodecResult<Vec<u8>> {
    let normalized: String = text
        .trim()
        .trim_end_matches('=')
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    general_purpose::URL_SAFE_NO_PAD
        .decode(normalized)
        .map_err(|e| CodecError::MalformedLink(format!("bad base64 payload: {}", e)))
}
