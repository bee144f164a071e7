use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_lib_proxyprofile::config::{CertProvider, CompileContext};
use rust_lib_proxyprofile::instance::{
    BoxInstance, CaptureMode, CoreFactory, CoreHandle, HelperResolver, HelperSupervisor,
    InstanceDeps, InstanceState,
};
use rust_lib_proxyprofile::models::*;

#[derive(Default)]
struct Log(Mutex<Vec<String>>);

impl Log {
    fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct Resolver;

#[async_trait]
impl HelperResolver for Resolver {
    async fn resolve(&self, name: &str) -> anyhow::Result<PathBuf> {
        Ok(PathBuf::from("/usr/lib/helpers").join(name))
    }
}

struct Supervisor {
    log: Arc<Log>,
    started: AtomicUsize,
}

#[async_trait]
impl HelperSupervisor for Supervisor {
    async fn start(&self, argv: Vec<String>, env: HashMap<String, String>) -> anyhow::Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.log.push(format!("helper {} env={}", argv.join(" "), env.len()));
        if let Some(config) = argv.iter().find(|arg| arg.ends_with(".json")) {
            let text = std::fs::read_to_string(config)?;
            self.log
                .push(format!("rendered protect_path={}", text.contains("protect_path")));
        }
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.log.push("helpers closed");
        Ok(())
    }

    fn process_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

struct Core {
    log: Arc<Log>,
}

#[async_trait]
impl CoreHandle for Core {
    async fn start(&self) -> anyhow::Result<()> {
        self.log.push("core start");
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.log.push("core close");
        Ok(())
    }

    async fn url_test(&self, link: &str, _timeout: Duration) -> anyhow::Result<u32> {
        self.log.push(format!("url test {}", link));
        Ok(120)
    }
}

struct Factory {
    log: Arc<Log>,
}

#[async_trait]
impl CoreFactory for Factory {
    async fn load(&self, config: &str, mode: CaptureMode) -> anyhow::Result<Box<dyn CoreHandle>> {
        let doc: serde_json::Value = serde_json::from_str(config)?;
        self.log.push(format!(
            "core load {:?} inbounds={}",
            mode,
            doc["inbounds"].as_array().map(Vec::len).unwrap_or(0)
        ));
        Ok(Box::new(Core {
            log: self.log.clone(),
        }))
    }

    async fn update_root_certs(&self, provider: &CertProvider) -> anyhow::Result<()> {
        self.log.push(format!("root certs {:?}", provider));
        Ok(())
    }
}

fn deps(log: &Arc<Log>) -> InstanceDeps {
    InstanceDeps {
        resolver: Arc::new(Resolver),
        supervisor: Arc::new(Supervisor {
            log: log.clone(),
            started: AtomicUsize::new(0),
        }),
        core: Arc::new(Factory { log: log.clone() }),
    }
}

fn hop(id: i64, bean: ProfileBean) -> ProxyRecord {
    let mut record = ProxyRecord::new(Profile::new(
        CommonFields {
            name: format!("hop {}", id),
            server_address: format!("{}.example.com", id),
            ..CommonFields::default()
        },
        bean,
    ));
    record.id = id;
    record
}

fn wechat_hysteria(version: i32) -> ProfileBean {
    ProfileBean::Hysteria(HysteriaBean {
        protocol_version: version,
        transport: HysteriaTransport::WechatVideo,
        ..HysteriaBean::default()
    })
}

#[tokio::test]
async fn every_helper_starts_before_the_core() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = CompileContext {
        helper_port_base: 65530,
        cache_dir: dir.path().to_path_buf(),
        ..CompileContext::default()
    };
    let log = Arc::new(Log::default());
    let chain = vec![
        hop(1, wechat_hysteria(1)),
        hop(2, ProfileBean::Naive(NaiveBean::default())),
        hop(3, ProfileBean::Trojan(TrojanBean::default())),
        hop(4, wechat_hysteria(2)),
    ];

    let mut instance = BoxInstance::new(chain, ctx, deps(&log));
    let compiled = instance.build_config().unwrap();
    let ports: Vec<u16> = compiled.external_index[0]
        .entries
        .iter()
        .map(|(port, _)| *port)
        .collect();
    // Helpers behind earlier hops also take a forwarded upstream port.
    assert_eq!(ports, vec![65530, 65531, 65533]);
    assert_eq!(compiled.external_index[0].upstream(65530), None);
    assert_eq!(compiled.external_index[0].upstream(65531), Some(65532));
    assert_eq!(compiled.external_index[0].upstream(65533), Some(65534));

    instance.prepare(false).await.unwrap();
    instance.start().await.unwrap();

    let events = log.events();
    let core_start = events.iter().position(|e| e == "core start").unwrap();
    let helper_events: Vec<&String> = events.iter().filter(|e| e.starts_with("helper ")).collect();
    assert_eq!(helper_events.len(), 3);
    for (index, event) in events.iter().enumerate() {
        if event.starts_with("helper ") {
            assert!(index < core_start, "{} after core start", event);
        }
    }
    assert!(helper_events[0].contains("/usr/lib/helpers/hysteria-plugin --no-check"));
    assert!(helper_events[0].ends_with("env=1"));
    assert!(helper_events[1].contains("/usr/lib/helpers/naive-plugin"));
    assert!(helper_events[2].contains("/usr/lib/helpers/hysteria2-plugin client"));

    let report = instance.close().await;
    assert!(report.is_clean());
    assert_eq!(instance.state(), InstanceState::Closed);
    let events = log.events();
    assert_eq!(&events[events.len() - 2..], &["helpers closed", "core close"]);
}

#[tokio::test(start_paused = true)]
async fn url_test_runs_full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = CompileContext {
        helper_port_base: 43000,
        cache_dir: dir.path().to_path_buf(),
        cert_provider: CertProvider::Mozilla,
        ..CompileContext::default()
    };
    let log = Arc::new(Log::default());
    let chain = vec![hop(7, ProfileBean::Naive(NaiveBean::default()))];

    let started = tokio::time::Instant::now();
    let latency = BoxInstance::new(chain, ctx, deps(&log))
        .url_test(
            "https://www.gstatic.com/generate_204",
            Duration::from_secs(3),
            false,
        )
        .await
        .unwrap();
    assert_eq!(latency, 120);
    // A helper was launched, so the test waited for it.
    assert!(started.elapsed() >= Duration::from_millis(500));

    let events = log.events();
    assert_eq!(events[0], "core load Direct inbounds=0");
    let certs = events.iter().position(|e| e == "root certs Mozilla").unwrap();
    let test = events
        .iter()
        .position(|e| e.starts_with("url test "))
        .unwrap();
    assert!(certs < test);
    assert_eq!(events.last().map(String::as_str), Some("core close"));
    assert!(std::fs::read_dir(dir.path().join("tmpcfg"))
        .unwrap()
        .next()
        .is_none());
}

#[test]
fn url_test_closes_after_failure() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = CompileContext {
        cache_dir: dir.path().to_path_buf(),
        ..CompileContext::default()
    };
    let log = Arc::new(Log::default());

    let instance = BoxInstance::new(Vec::new(), ctx, deps(&log));
    let result = tokio_test::block_on(instance.url_test(
        "https://example.com",
        Duration::from_secs(1),
        false,
    ));
    tokio_test::assert_err!(result);
    assert!(log.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn url_test_under_vpn_protects_helpers_but_not_the_core() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = CompileContext {
        helper_port_base: 44000,
        cache_dir: dir.path().to_path_buf(),
        protect_path: Some("protect_path".to_string()),
        ..CompileContext::default()
    };
    let log = Arc::new(Log::default());
    let chain = vec![hop(8, wechat_hysteria(2))];

    let latency = BoxInstance::new(chain, ctx, deps(&log))
        .url_test("https://example.com", Duration::from_secs(3), true)
        .await
        .unwrap();
    assert_eq!(latency, 120);

    let events = log.events();
    assert_eq!(events[0], "core load Direct inbounds=0");
    assert!(events.iter().any(|e| e == "rendered protect_path=true"));
}
