//! Compile context and the process-wide settings slot it is snapshotted from

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::Context;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Where the core gets its trust anchors from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CertProvider {
    #[default]
    System,
    Mozilla,
    /// System store plus user supplied PEM anchors
    SystemAndUser(Vec<String>),
}

/// Settings the compiler and helper renderers read. Immutable once handed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileContext {
    /// 0 quiet, 1 error, 2 warn, 3 info, 4 debug, 5 trace
    pub log_level: i32,
    pub upload_mbps: i32,
    /// Download bound for brutal and Hysteria
    pub download_mbps: i32,
    pub cert_provider: CertProvider,
    /// Local mixed (HTTP + SOCKS) inbound port
    pub mixed_port: u16,
    /// First port handed to helpers; 0 asks the OS for ephemeral ports
    pub helper_port_base: u16,
    pub cache_dir: PathBuf,
    /// Socket protect path, used by helpers under exclusive capture
    pub protect_path: Option<String>,
}

impl Default for CompileContext {
    fn default() -> Self {
        Self {
            log_level: 0,
            upload_mbps: 0,
            download_mbps: 0,
            cert_provider: CertProvider::System,
            mixed_port: 2080,
            helper_port_base: 0,
            cache_dir: default_cache_dir(),
            protect_path: None,
        }
    }
}

impl CompileContext {
    /// Load a context from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {:?}", path))?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("parsing settings")
    }

    /// Level name understood by the core's `log` block
    pub fn core_log_level(&self) -> Option<&'static str> {
        match self.log_level {
            i32::MIN..=0 => None,
            1 => Some("error"),
            2 => Some("warn"),
            3 => Some("info"),
            4 => Some("debug"),
            _ => Some("trace"),
        }
    }

    pub fn verbose(&self) -> bool {
        self.log_level > 0
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("proxyprofile")
}

static SETTINGS: Lazy<RwLock<CompileContext>> = Lazy::new(|| RwLock::new(CompileContext::default()));

/// Copy of the current shared settings
pub fn snapshot() -> CompileContext {
    match SETTINGS.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Mutate the shared settings. Concurrent writers race; the last one wins.
pub fn update(f: impl FnOnce(&mut CompileContext)) {
    let mut guard = match SETTINGS.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(&mut guard);
}

/// Replace the shared settings wholesale
pub fn replace(ctx: CompileContext) {
    update(|current| *current = ctx);
}
