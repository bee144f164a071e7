//! One running configuration: helpers first, then the core

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;

use super::collaborators::{CaptureMode, CoreHandle, InstanceDeps, ManagedInstance};
use super::command::helper_command;
use super::shutdown::ShutdownPolicy;
use crate::config::{build_config, helper_name, render_helper, CompileContext, ConfigBuildResult};
use crate::error::LifecycleError;
use crate::models::ProxyRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstanceState {
    Unconfigured,
    Configured,
    Loaded,
    Running,
    Closed,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Unconfigured => "unconfigured",
            InstanceState::Configured => "configured",
            InstanceState::Loaded => "loaded",
            InstanceState::Running => "running",
            InstanceState::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    ExternalInstance,
    CacheFile,
    HelperSupervisor,
    Core,
}

#[derive(Debug, Clone)]
pub struct TeardownFailure {
    pub step: TeardownStep,
    pub message: String,
}

/// Everything that went wrong while closing. Teardown never stops early.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub failures: Vec<TeardownFailure>,
    /// Set when process termination was scheduled
    pub termination: Option<JoinHandle<()>>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_steps(&self) -> Vec<TeardownStep> {
        self.failures.iter().map(|f| f.step).collect()
    }

    fn record(&mut self, step: TeardownStep, err: impl std::fmt::Display) {
        tracing::warn!("teardown {:?} failed: {}", step, err);
        self.failures.push(TeardownFailure {
            step,
            message: err.to_string(),
        });
    }
}

pub struct BoxInstance {
    chain: Vec<ProxyRecord>,
    ctx: CompileContext,
    pub(crate) deps: InstanceDeps,
    policy: ShutdownPolicy,
    for_test: bool,
    state: InstanceState,
    config: Option<ConfigBuildResult>,
    helper_paths: HashMap<&'static str, PathBuf>,
    helper_configs: HashMap<u16, String>,
    external_instances: HashMap<u16, Arc<dyn ManagedInstance>>,
    cache_files: Vec<PathBuf>,
    pub(crate) core: Option<Box<dyn CoreHandle>>,
}

impl BoxInstance {
    /// `chain` is first hop first
    pub fn new(chain: Vec<ProxyRecord>, ctx: CompileContext, deps: InstanceDeps) -> Self {
        Self {
            chain,
            ctx,
            deps,
            policy: ShutdownPolicy::default(),
            for_test: false,
            state: InstanceState::Unconfigured,
            config: None,
            helper_paths: HashMap::new(),
            helper_configs: HashMap::new(),
            external_instances: HashMap::new(),
            cache_files: Vec::new(),
            core: None,
        }
    }

    pub fn with_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Compile without the local inbound
    pub fn for_test(mut self) -> Self {
        self.for_test = true;
        self
    }

    /// Hand the helper port `port` to an instance that already runs it.
    pub fn attach_external(&mut self, port: u16, instance: Arc<dyn ManagedInstance>) {
        self.external_instances.insert(port, instance);
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn context(&self) -> &CompileContext {
        &self.ctx
    }

    pub fn config(&self) -> Option<&ConfigBuildResult> {
        self.config.as_ref()
    }

    /// Files this instance has written and will delete on close
    pub fn cache_files(&self) -> &[PathBuf] {
        &self.cache_files
    }

    fn expect_state(
        &self,
        expected: InstanceState,
        operation: &'static str,
    ) -> Result<(), LifecycleError> {
        if self.state != expected {
            return Err(LifecycleError::InvalidState {
                operation,
                state: self.state.as_str(),
            });
        }
        Ok(())
    }

    pub fn build_config(&mut self) -> anyhow::Result<&ConfigBuildResult> {
        self.expect_state(InstanceState::Unconfigured, "build config")?;
        let result = build_config(&self.chain, &self.ctx, self.for_test)?;
        self.state = InstanceState::Configured;
        let config = self.config.insert(result);
        Ok(&*config)
    }

    /// Resolve helpers, render their configurations and load the core.
    ///
    /// `is_vpn` tells helpers to protect their sockets from the tunnel. The core runs
    /// in exclusive capture mode only for non-test instances under VPN.
    pub async fn prepare(&mut self, is_vpn: bool) -> anyhow::Result<()> {
        self.expect_state(InstanceState::Configured, "prepare")?;
        let Some(config) = self.config.as_ref() else {
            anyhow::bail!("configuration missing");
        };

        for chain in &config.external_index {
            for (port, record) in &chain.entries {
                let profile = record.require_bean();
                if !profile.needs_external() {
                    continue;
                }
                let Some(name) = helper_name(profile) else {
                    continue;
                };
                if !self.helper_paths.contains_key(name) {
                    let path = self
                        .deps
                        .resolver
                        .resolve(name)
                        .await
                        .with_context(|| format!("resolving helper {}", name))?;
                    tracing::debug!("helper {} at {:?}", name, path);
                    self.helper_paths.insert(name, path);
                }

                let upstream = chain.upstream(*port);
                let Some(rendered) = render_helper(profile, *port, upstream, is_vpn, &self.ctx)
                else {
                    continue;
                };
                for aux in rendered.aux_files {
                    if let Some(parent) = aux.path.parent() {
                        tokio::fs::create_dir_all(parent)
                            .await
                            .with_context(|| format!("creating {:?}", parent))?;
                    }
                    // Recorded before writing so a partial write is still cleaned up.
                    self.cache_files.push(aux.path.clone());
                    tokio::fs::write(&aux.path, aux.contents)
                        .await
                        .with_context(|| format!("writing {:?}", aux.path))?;
                }
                self.helper_configs.insert(*port, rendered.config);
            }
        }

        // Test instances never take over the device's traffic, even under VPN.
        let mode = if is_vpn && !self.for_test {
            CaptureMode::Exclusive
        } else {
            CaptureMode::Direct
        };
        let core = self
            .deps
            .core
            .load(&config.config, mode)
            .await
            .context("loading core")?;
        self.core = Some(core);
        self.state = InstanceState::Loaded;
        Ok(())
    }

    /// Launch every helper, then start the core.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        self.expect_state(InstanceState::Loaded, "start")?;
        let Some(config) = self.config.as_ref() else {
            anyhow::bail!("configuration missing");
        };
        let tmp_dir = self.ctx.cache_dir.join("tmpcfg");
        tokio::fs::create_dir_all(&tmp_dir)
            .await
            .with_context(|| format!("creating {:?}", tmp_dir))?;

        for chain in &config.external_index {
            for (port, record) in &chain.entries {
                if let Some(external) = self.external_instances.get(port) {
                    external.launch().await?;
                    continue;
                }
                let profile = record.require_bean();
                if !profile.needs_external() {
                    continue;
                }
                let Some(name) = helper_name(profile) else {
                    continue;
                };
                let helper_path = self
                    .helper_paths
                    .get(name)
                    .with_context(|| format!("helper {} was not resolved", name))?;
                let text = self
                    .helper_configs
                    .get(port)
                    .with_context(|| format!("no helper configuration for port {}", port))?;

                let config_path =
                    tmp_dir.join(format!("{}_{}.json", profile.type_name(), uuid::Uuid::new_v4()));
                self.cache_files.push(config_path.clone());
                tokio::fs::write(&config_path, text)
                    .await
                    .with_context(|| format!("writing {:?}", config_path))?;

                let Some(command) = helper_command(profile, helper_path, &config_path, &self.ctx)
                else {
                    continue;
                };
                tracing::info!("starting {} for port {}", name, port);
                self.deps.supervisor.start(command.argv, command.env).await?;
            }
        }

        let Some(core) = self.core.as_ref() else {
            anyhow::bail!("core not loaded");
        };
        core.start().await.context("starting core")?;
        self.state = InstanceState::Running;
        Ok(())
    }

    /// Tear everything down. Every step runs whatever the previous ones did.
    pub async fn close(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.state == InstanceState::Closed {
            return report;
        }

        for (port, instance) in self.external_instances.drain() {
            if let Err(err) = instance.close().await {
                report.record(
                    TeardownStep::ExternalInstance,
                    format!("port {}: {:#}", port, err),
                );
            }
        }

        for path in self.cache_files.drain(..) {
            if let Err(err) = tokio::fs::remove_file(&path).await {
                report.record(TeardownStep::CacheFile, format!("{:?}: {}", path, err));
            }
        }

        if self.state >= InstanceState::Configured {
            if let Err(err) = self.deps.supervisor.close().await {
                report.record(TeardownStep::HelperSupervisor, format!("{:#}", err));
            }
        }

        if let Some(core) = self.core.take() {
            if let Err(err) = core.close().await {
                report.record(TeardownStep::Core, format!("{:#}", err));
                report.termination = self.policy.on_close_failure();
            }
        }

        self.state = InstanceState::Closed;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CertProvider, TAG_DIRECT};
    use crate::instance::collaborators::{CoreFactory, HelperResolver, HelperSupervisor};
    use crate::instance::shutdown::ProcessTerminator;
    use crate::models::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    type Events = Arc<Mutex<Vec<String>>>;

    struct Resolver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HelperResolver for Resolver {
        async fn resolve(&self, name: &str) -> anyhow::Result<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PathBuf::from(format!("/opt/{}", name)))
        }
    }

    struct Supervisor {
        events: Events,
        fail_close: bool,
    }

    #[async_trait]
    impl HelperSupervisor for Supervisor {
        async fn start(
            &self,
            argv: Vec<String>,
            _env: HashMap<String, String>,
        ) -> anyhow::Result<()> {
            self.events.lock().unwrap().push(format!("helper {}", argv.join(" ")));
            Ok(())
        }

        async fn close(&self) -> anyhow::Result<()> {
            self.events.lock().unwrap().push("supervisor close".to_string());
            if self.fail_close {
                anyhow::bail!("supervisor stuck");
            }
            Ok(())
        }

        fn process_count(&self) -> usize {
            0
        }
    }

    struct Core {
        events: Events,
        fail_close: bool,
    }

    #[async_trait]
    impl CoreHandle for Core {
        async fn start(&self) -> anyhow::Result<()> {
            self.events.lock().unwrap().push("core start".to_string());
            Ok(())
        }

        async fn close(&self) -> anyhow::Result<()> {
            self.events.lock().unwrap().push("core close".to_string());
            if self.fail_close {
                anyhow::bail!("core close failed");
            }
            Ok(())
        }

        async fn url_test(&self, _link: &str, _timeout: Duration) -> anyhow::Result<u32> {
            Ok(42)
        }
    }

    struct Factory {
        events: Events,
        fail_close: bool,
    }

    #[async_trait]
    impl CoreFactory for Factory {
        async fn load(
            &self,
            config: &str,
            mode: CaptureMode,
        ) -> anyhow::Result<Box<dyn CoreHandle>> {
            serde_json::from_str::<serde_json::Value>(config)?;
            self.events.lock().unwrap().push(format!("core load {:?}", mode));
            Ok(Box::new(Core {
                events: self.events.clone(),
                fail_close: self.fail_close,
            }))
        }

        async fn update_root_certs(&self, _provider: &CertProvider) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct FailingExternal;

    #[async_trait]
    impl ManagedInstance for FailingExternal {
        async fn launch(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn close(&self) -> anyhow::Result<()> {
            anyhow::bail!("external already gone")
        }
    }

    #[derive(Default)]
    struct RecordingTerminator {
        called: AtomicBool,
    }

    impl ProcessTerminator for RecordingTerminator {
        fn terminate(&self) {
            self.called.store(true, Ordering::SeqCst);
        }
    }

    struct Harness {
        events: Events,
        resolver: Arc<Resolver>,
        deps: InstanceDeps,
    }

    fn harness(fail_close: bool) -> Harness {
        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let resolver = Arc::new(Resolver {
            calls: AtomicUsize::new(0),
        });
        let deps = InstanceDeps {
            resolver: resolver.clone(),
            supervisor: Arc::new(Supervisor {
                events: events.clone(),
                fail_close,
            }),
            core: Arc::new(Factory {
                events: events.clone(),
                fail_close,
            }),
        };
        Harness {
            events,
            resolver,
            deps,
        }
    }

    fn record(id: i64, bean: ProfileBean) -> ProxyRecord {
        let mut record = ProxyRecord::new(Profile::new(
            CommonFields {
                server_address: format!("hop{}.example.com", id),
                ..CommonFields::default()
            },
            bean,
        ));
        record.id = id;
        record
    }

    fn faketcp(version: i32) -> ProfileBean {
        ProfileBean::Hysteria(HysteriaBean {
            protocol_version: version,
            transport: HysteriaTransport::FakeTcp,
            certificates: "PEM".to_string(),
            ..HysteriaBean::default()
        })
    }

    fn ctx(dir: &std::path::Path) -> CompileContext {
        CompileContext {
            helper_port_base: 42000,
            cache_dir: dir.to_path_buf(),
            ..CompileContext::default()
        }
    }

    #[tokio::test]
    async fn helpers_start_before_core() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(false);
        let chain = vec![
            record(1, faketcp(2)),
            record(2, ProfileBean::Trojan(TrojanBean::default())),
            record(3, faketcp(2)),
            record(4, ProfileBean::Naive(NaiveBean::default())),
        ];
        let mut instance = BoxInstance::new(chain, ctx(dir.path()), h.deps.clone());
        instance.build_config().unwrap();
        instance.prepare(true).await.unwrap();
        instance.start().await.unwrap();
        assert_eq!(instance.state(), InstanceState::Running);

        let events = h.events.lock().unwrap().clone();
        assert_eq!(events[0], "core load Exclusive");
        let core_start = events.iter().position(|e| e == "core start").unwrap();
        let helpers: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.starts_with("helper"))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(helpers.len(), 3);
        assert!(helpers.iter().all(|&i| i < core_start));
        assert!(events[helpers[0]].starts_with("helper su -c /opt/hysteria2-plugin client"));
        assert!(events[helpers[2]].starts_with("helper /opt/naive-plugin"));

        // Both hysteria hops share one resolution.
        assert_eq!(h.resolver.calls.load(Ordering::SeqCst), 2);
        // Two trust anchor files plus three helper configurations.
        assert_eq!(instance.cache_files().len(), 5);
        assert!(instance.cache_files().iter().all(|p| p.exists()));

        let files = instance.cache_files().to_vec();
        let report = instance.close().await;
        assert!(report.is_clean());
        assert!(files.iter().all(|p| !p.exists()));
        assert_eq!(instance.state(), InstanceState::Closed);
    }

    #[tokio::test]
    async fn operations_out_of_order_fail() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(false);
        let chain = vec![record(1, ProfileBean::Direct(DirectBean::default()))];
        let mut instance = BoxInstance::new(chain, ctx(dir.path()), h.deps);

        let err = instance.start().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LifecycleError>(),
            Some(LifecycleError::InvalidState {
                operation: "start",
                state: "unconfigured"
            })
        ));

        instance.build_config().unwrap();
        assert!(instance.build_config().is_err());
        let doc: serde_json::Value =
            serde_json::from_str(&instance.config().unwrap().config).unwrap();
        assert_eq!(doc["outbounds"][1]["tag"], serde_json::json!(TAG_DIRECT));
    }

    #[tokio::test]
    async fn teardown_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(true);
        let chain = vec![record(1, faketcp(1))];
        let terminator = Arc::new(RecordingTerminator::default());
        let mut instance = BoxInstance::new(chain, ctx(dir.path()), h.deps)
            .with_policy(ShutdownPolicy::primary().with_terminator(terminator.clone()));
        instance.attach_external(1, Arc::new(FailingExternal));
        instance.build_config().unwrap();
        instance.prepare(false).await.unwrap();

        // Already gone: deletion of this one fails, the rest still happen.
        let ca = instance.cache_files()[0].clone();
        std::fs::remove_file(&ca).unwrap();

        let report = instance.close().await;
        assert_eq!(
            report.failed_steps(),
            vec![
                TeardownStep::ExternalInstance,
                TeardownStep::CacheFile,
                TeardownStep::HelperSupervisor,
                TeardownStep::Core,
            ]
        );
        assert!(report.termination.is_none());
        let events = h.events.lock().unwrap().clone();
        assert_eq!(events, ["core load Direct", "supervisor close", "core close"]);
        assert!(!terminator.called.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_core_close_terminates_after_delay() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(true);
        let chain = vec![record(1, ProfileBean::Trojan(TrojanBean::default()))];
        let terminator = Arc::new(RecordingTerminator::default());
        let mut instance = BoxInstance::new(chain, ctx(dir.path()), h.deps)
            .with_policy(ShutdownPolicy::secondary().with_terminator(terminator.clone()));
        instance.build_config().unwrap();
        instance.prepare(false).await.unwrap();

        let closed_at = tokio::time::Instant::now();
        let report = instance.close().await;
        assert_eq!(report.failed_steps().last(), Some(&TeardownStep::Core));
        let handle = report.termination.expect("termination scheduled");
        assert!(!terminator.called.load(Ordering::SeqCst));

        tokio::time::advance(Duration::from_millis(499)).await;
        tokio::task::yield_now().await;
        assert!(!terminator.called.load(Ordering::SeqCst));

        handle.await.unwrap();
        assert!(terminator.called.load(Ordering::SeqCst));
        assert!(closed_at.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn close_twice_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(false);
        let chain = vec![record(1, ProfileBean::Direct(DirectBean::default()))];
        let mut instance = BoxInstance::new(chain, ctx(dir.path()), h.deps);
        assert!(instance.close().await.is_clean());
        assert!(instance.close().await.is_clean());
        assert!(h.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cache_dir_failure_names_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let h = harness(false);
        let chain = vec![record(1, faketcp(2))];
        let mut instance = BoxInstance::new(chain, ctx(&blocker.join("cache")), h.deps);
        instance.build_config().unwrap();

        let err = instance.prepare(false).await.unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("creating"), "{}", message);
        assert!(message.contains("not-a-dir"), "{}", message);
        assert!(h.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_instance_under_vpn_loads_core_direct() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(false);
        let chain = vec![record(1, ProfileBean::Trojan(TrojanBean::default()))];
        let mut instance = BoxInstance::new(chain, ctx(dir.path()), h.deps).for_test();
        instance.build_config().unwrap();
        instance.prepare(true).await.unwrap();
        assert_eq!(h.events.lock().unwrap()[0], "core load Direct");
    }
}
