//! Seams to the world outside the orchestrator: helper binaries, the helper process
//! supervisor and the forwarding core.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::CertProvider;

/// How the core captures traffic once loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// The core owns the device's traffic (VPN)
    Exclusive,
    /// Only traffic sent to the core's own inbounds
    Direct,
}

/// Finds helper binaries by name
#[async_trait]
pub trait HelperResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> anyhow::Result<PathBuf>;
}

/// Runs helper processes on behalf of one instance
#[async_trait]
pub trait HelperSupervisor: Send + Sync {
    async fn start(&self, argv: Vec<String>, env: HashMap<String, String>) -> anyhow::Result<()>;

    /// Stop everything this supervisor started
    async fn close(&self) -> anyhow::Result<()>;

    fn process_count(&self) -> usize;
}

/// A loaded core
#[async_trait]
pub trait CoreHandle: Send + Sync {
    async fn start(&self) -> anyhow::Result<()>;

    async fn close(&self) -> anyhow::Result<()>;

    /// Latency in ms of a request to `link` through the core
    async fn url_test(&self, link: &str, timeout: Duration) -> anyhow::Result<u32>;
}

#[async_trait]
pub trait CoreFactory: Send + Sync {
    async fn load(&self, config: &str, mode: CaptureMode) -> anyhow::Result<Box<dyn CoreHandle>>;

    async fn update_root_certs(&self, provider: &CertProvider) -> anyhow::Result<()>;
}

/// An already running instance that owns a helper port
#[async_trait]
pub trait ManagedInstance: Send + Sync {
    async fn launch(&self) -> anyhow::Result<()>;

    async fn close(&self) -> anyhow::Result<()>;
}

/// Everything an instance talks to
#[derive(Clone)]
pub struct InstanceDeps {
    pub resolver: Arc<dyn HelperResolver>,
    pub supervisor: Arc<dyn HelperSupervisor>,
    pub core: Arc<dyn CoreFactory>,
}
