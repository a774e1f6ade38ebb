#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use fwrecon::adapter::{HaStatus, MemoryDeviceAdapter, ScriptedChecks};
use fwrecon::audit::AuditLedger;
use fwrecon::config::EngineConfig;
use fwrecon::deploy::{CancelSignal, DeploymentAttempt, DeploymentRequest};
use fwrecon::events::{EngineEvent, MemorySink};
use fwrecon::fleet::{DeviceRef, Fleet};
use fwrecon::store::{MemoryStore, StateStore};
use fwrecon::Engine;
use intent_core::{parse_snapshot, IntentSnapshot};

pub fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

pub fn load(path: &str) -> IntentSnapshot {
    let bytes = std::fs::read(fixture(path)).expect("fixture should exist");
    parse_snapshot(&bytes).expect("fixture should parse")
}

/// Fixture text with one substring replaced, parsed.
pub fn load_with(path: &str, from: &str, to: &str) -> IntentSnapshot {
    let text = std::fs::read_to_string(fixture(path)).expect("fixture should exist");
    parse_snapshot(text.replace(from, to).as_bytes()).expect("edited fixture should parse")
}

const EGRESS: &str = r#"<intent environment="prod" group="edge" version="VERSION">
  <zone name="trust"><interface>ethernet1/2</interface></zone>
  <zone name="untrust"><interface>ethernet1/1</interface></zone>
  <address name="web-hosts"><member>10.1.1.0/24</member></address>
  <address name="web-net"><member>web-hosts</member></address>
  <rule name="edge-out">
    <from>trust</from><to>untrust</to>
    <source>web-net</source><destination>any</destination><service>any</service>
    <action>allow</action><log/>
    <owner>netops</owner><created>2026-01-01</created><expires>2030-01-01</expires>
  </rule>
</intent>"#;

/// One allow rule from trust to untrust whose source resolves through the
/// `web-net` group to `web-hosts`, with `hosts` as that object's members.
pub fn egress(version: &str, hosts: &str) -> IntentSnapshot {
    let text = EGRESS
        .replace("VERSION", version)
        .replace("<member>10.1.1.0/24</member>", hosts);
    parse_snapshot(text.as_bytes()).expect("snapshot should parse")
}

pub fn edge_device(id: &str) -> DeviceRef {
    DeviceRef {
        id: id.to_string(),
        group: "edge".to_string(),
        environment: "prod".to_string(),
        production: false,
        ha_peer: None,
    }
}

pub fn ha_pair(a: &str, b: &str) -> Vec<DeviceRef> {
    let mut first = edge_device(a);
    first.ha_peer = Some(b.to_string());
    let mut second = edge_device(b);
    second.ha_peer = Some(a.to_string());
    vec![first, second]
}

/// Millisecond backoff and short timeouts.
pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 4;
    config.timeouts.fetch = 2.0;
    config.timeouts.stage = 2.0;
    config.timeouts.validate = 2.0;
    config.timeouts.commit = 2.0;
    config.timeouts.post_validate = 2.0;
    config.timeouts.ha = 5.0;
    config
}

pub struct Harness {
    pub engine: Engine,
    pub adapter: Arc<MemoryDeviceAdapter>,
    pub checks: Arc<ScriptedChecks>,
    pub events: Arc<MemorySink>,
    pub store: Arc<MemoryStore>,
    pub audit: Arc<AuditLedger>,
}

impl Harness {
    /// Every device starts live on `edge_v1.xml` with that as its baseline.
    pub fn new(devices: Vec<DeviceRef>, config: EngineConfig) -> Self {
        let harness = Self::unseeded(devices, config);
        let v1 = load("fixtures/edge_v1.xml");
        let ids: Vec<String> = harness.engine.fleet().devices().map(|d| d.id.clone()).collect();
        for id in ids {
            harness
                .engine
                .adopt_baseline(&id, v1.clone())
                .expect("baseline should be recorded");
        }
        harness
    }

    pub fn unseeded(devices: Vec<DeviceRef>, config: EngineConfig) -> Self {
        let adapter = Arc::new(MemoryDeviceAdapter::new());
        let v1 = load("fixtures/edge_v1.xml");
        for device in &devices {
            adapter.add_device(device.id.clone(), v1.clone(), HaStatus::Standalone);
        }
        let checks = Arc::new(ScriptedChecks::new());
        let events = Arc::new(MemorySink::new());
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(AuditLedger::in_memory());
        let engine = Engine::builder(Fleet::new(devices), adapter.clone())
            .checks(checks.clone())
            .events(events.clone())
            .store(store.clone() as Arc<dyn StateStore>)
            .audit(audit.clone())
            .config(config)
            .build()
            .expect("embedded policy should load");
        Self {
            engine,
            adapter,
            checks,
            events,
            store,
            audit,
        }
    }

    pub fn request(&self, device: &str, target: &IntentSnapshot) -> DeploymentRequest {
        DeploymentRequest {
            device: device.to_string(),
            target: Arc::new(target.clone()),
            ticket: "CHG-1001".to_string(),
            actor: "pipeline".to_string(),
        }
    }

    pub async fn deploy(&self, device: &str, target: &IntentSnapshot) -> DeploymentAttempt {
        self.engine
            .deploy(self.request(device, target), CancelSignal::never())
            .await
            .expect("attempt should be recorded")
    }

    pub fn events_named(&self, name: &str) -> Vec<EngineEvent> {
        self.events
            .events()
            .into_iter()
            .filter(|event| {
                let value = serde_json::to_value(event).expect("event serializes");
                value["event"] == name
            })
            .collect()
    }
}
