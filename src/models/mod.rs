//! Data models for proxy profiles
//!
//! These models are shared by the codec, the outbound compiler and the instance
//! orchestrator.

pub mod profile;
pub mod record;

pub use profile::*;
pub use record::*;
