//! Profile serialization
//!
//! Binary encoding of records and bare profiles, and the universal link text form
//! built on top of it.

mod beans;
mod buffer;
mod link;
mod record;

pub use beans::{decode_profile, encode_profile};
pub use buffer::{ByteReader, ByteWriter};
pub use link::{decode_link, encode_link, LINK_SCHEME};
pub use record::{decode_record, encode_record};
