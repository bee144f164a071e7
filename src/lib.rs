//! # Proxy Profile Core
//!
//! Profile codec and configuration compiler for a native proxy forwarding core.
//!
//! ## Features
//!
//! - Binary record encoding for the row store
//! - Universal `husi://` links for sharing profiles
//! - Outbound documents for the core, and parsing them back into profiles
//! - Chain compilation with out-of-process helpers for hops the core cannot run
//! - Instance lifecycle: helpers first, core last, best-effort teardown
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Host application / CLI                   │
//! ├─────────────────────────────────────────────────────────┤
//! │                  api::profile_api                        │
//! ├─────────────────────────────────────────────────────────┤
//! │  ┌─────────┐  ┌──────────┐  ┌────────┐  ┌───────────┐   │
//! │  │ Models  │──│  Codec   │  │Outbound│──│  Config   │   │
//! │  │         │  │          │  │        │  │ compiler  │   │
//! │  └─────────┘  └──────────┘  └────────┘  └─────┬─────┘   │
//! │                                         ┌─────┴─────┐   │
//! │                                         │ Instance  │   │
//! │                                         └───────────┘   │
//! └─────────────────────────────────────────────────────────┘
//! ```

// Public modules
pub mod api;
pub mod codec;
pub mod config;
pub mod error;
pub mod instance;
pub mod models;
pub mod outbound;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
