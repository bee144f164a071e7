//! Core configuration: compile context, chain compilation and helper rendering

pub mod builder;
pub mod context;
pub mod helpers;

pub use builder::{
    build_config, export_config, ConfigBuildResult, ExportedConfig, ExternalChain, TAG_DIRECT,
};
pub use context::{replace, snapshot, update, CertProvider, CompileContext};
pub use helpers::{helper_name, render_helper, AuxFile, RenderedHelper};
