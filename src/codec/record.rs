//! Binary layout of the persistent proxy record

use super::beans::{decode_profile, encode_profile};
use super::buffer::{ByteReader, ByteWriter};
use crate::error::{CodecError, CodecResult};
use crate::models::{ProfileStatus, ProxyRecord};

/// Reserved record format version. Always written as zero.
const RECORD_VERSION: i32 = 0;

pub fn encode_record(record: &ProxyRecord) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.write_i32(RECORD_VERSION);

    w.write_i64(record.id);
    w.write_i64(record.group_id);
    w.write_i32(record.type_tag());
    w.write_i64(record.user_order);
    w.write_i64(record.tx);
    w.write_i64(record.rx);
    w.write_i32(record.status.to_i32());
    w.write_i32(record.ping);
    w.write_str(&record.uuid);
    w.write_string(record.error.as_deref());

    w.write_blob(&encode_profile(record.require_bean()));

    w.write_bool(record.dirty);
    w.into_bytes()
}

pub fn decode_record(bytes: &[u8]) -> CodecResult<ProxyRecord> {
    let mut r = ByteReader::new(bytes);
    let _version = r.read_i32()?;

    let id = r.read_i64()?;
    let group_id = r.read_i64()?;
    let type_tag = r.read_i32()?;
    let user_order = r.read_i64()?;
    let tx = r.read_i64()?;
    let rx = r.read_i64()?;
    let raw_status = r.read_i32()?;
    let status = ProfileStatus::from_i32(raw_status).ok_or(CodecError::InvalidField {
        field: "status",
        value: raw_status.into(),
    })?;
    let ping = r.read_i32()?;
    let uuid = r.read_str()?;
    let error = r.read_string()?;

    let profile = decode_profile(type_tag, r.read_blob()?)?;

    let dirty = r.read_bool()?;

    let mut record = ProxyRecord::new(profile);
    record.id = id;
    record.group_id = group_id;
    record.user_order = user_order;
    record.tx = tx;
    record.rx = rx;
    record.status = status;
    record.ping = ping;
    record.uuid = uuid;
    record.error = error;
    record.dirty = dirty;
    Ok(record)
}
