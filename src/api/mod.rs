//! Proxy Profile API
//!
//! This module defines the public API the host application calls.
//! Errors cross the boundary as plain strings.

pub mod profile_api;
