//! Runner end-to-end tests over a scripted in-memory device

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use fleetcheck::checks::{bgp, hardware, software, Check, CheckMeta};
use fleetcheck::command::{
    CommandEntry, CommandFailure, CommandOutput, CommandRequest, CommandSpec, FailureKind,
};
use fleetcheck::device::{tag_set, Device, DeviceInfo, Endpoint};
use fleetcheck::report::{CheckStatus, ResultStore};
use fleetcheck::runner::{Runner, RunnerSettings};

/// Device answering from a canned command -> JSON script
struct ScriptedDevice {
    name: String,
    tags: Vec<String>,
    reachable: bool,
    model: Option<String>,
    script: HashMap<String, serde_json::Value>,
    refresh_delay: Option<Duration>,
    collected: Mutex<Vec<String>>,
}

impl ScriptedDevice {
    fn new(name: &str, script: HashMap<String, serde_json::Value>) -> Self {
        Self {
            name: name.to_string(),
            tags: Vec::new(),
            reachable: true,
            model: Some("DCS-7280SR".to_string()),
            script,
            refresh_delay: None,
            collected: Mutex::new(Vec::new()),
        }
    }

    fn unreachable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tags: Vec::new(),
            reachable: false,
            model: None,
            script: HashMap::new(),
            refresh_delay: None,
            collected: Mutex::new(Vec::new()),
        }
    }

    fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    fn collected(&self) -> Vec<String> {
        self.collected.lock().unwrap().clone()
    }
}

#[async_trait]
impl Device for ScriptedDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: self.name.clone(),
            tags: tag_set(&self.tags),
            is_reachable: self.reachable,
            is_established: self.reachable && self.model.is_some(),
            hardware_model: self.model.clone(),
        }
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.name.clone(),
            port: 443,
        }
    }

    async fn collect(&self, entries: &[Arc<CommandEntry>]) {
        for entry in entries {
            let text = entry.spec().text.clone();
            self.collected.lock().unwrap().push(text.clone());

            if !self.reachable {
                entry.resolve_failure(CommandFailure::new(
                    FailureKind::Connection,
                    "connection refused",
                ));
            } else if let Some(value) = self.script.get(&text) {
                entry.resolve_output(CommandOutput::Json(value.clone()));
            } else {
                entry.resolve_failure(CommandFailure::new(FailureKind::Rpc, "unknown command"));
            }
        }
    }

    async fn refresh(&self) {
        if let Some(delay) = self.refresh_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Second consumer of "show version", for dedup coverage
struct ModelNameCheck;

impl Check for ModelNameCheck {
    fn meta(&self) -> CheckMeta {
        CheckMeta {
            name: "ModelNameCheck",
            description: "Verifies the device reports a hardware model",
            categories: &["software"],
        }
    }

    fn requests(&self) -> Vec<CommandRequest> {
        vec![CommandRequest::Fixed(CommandSpec::json("show version"))]
    }

    fn evaluate(
        &self,
        entries: &[Arc<CommandEntry>],
        result: &mut fleetcheck::report::CheckResult,
    ) -> anyhow::Result<()> {
        let output = entries[0]
            .json()
            .ok_or_else(|| anyhow::anyhow!("no JSON output"))?;
        if output.get("modelName").and_then(|m| m.as_str()).is_none() {
            result.record_failure("device reports no hardware model");
        }
        Ok(())
    }
}

/// Check whose evaluation always panics
struct BrokenEvaluationCheck;

impl Check for BrokenEvaluationCheck {
    fn meta(&self) -> CheckMeta {
        CheckMeta {
            name: "BrokenEvaluationCheck",
            description: "Panics during evaluation",
            categories: &["system"],
        }
    }

    fn requests(&self) -> Vec<CommandRequest> {
        vec![CommandRequest::Fixed(CommandSpec::json(
            "show bgp ipv4 unicast summary vrf all",
        ))]
    }

    fn evaluate(
        &self,
        _entries: &[Arc<CommandEntry>],
        _result: &mut fleetcheck::report::CheckResult,
    ) -> anyhow::Result<()> {
        panic!("evaluation bug");
    }
}

fn bgp_summary(peer_state: &str) -> serde_json::Value {
    serde_json::json!({
        "vrfs": {
            "default": {
                "peers": {
                    "10.1.255.0": {
                        "peerState": peer_state,
                        "inMsgQueue": 0,
                        "outMsgQueue": 0,
                    }
                }
            }
        }
    })
}

fn record_for<'a>(
    records: &'a [fleetcheck::report::CheckRecord],
    device: &str,
    check: &str,
) -> &'a fleetcheck::report::CheckRecord {
    records
        .iter()
        .find(|r| r.device == device && r.check == check)
        .unwrap()
}

#[tokio::test]
async fn test_healthy_bgp_device_passes() {
    let device = Arc::new(ScriptedDevice::new(
        "leaf1",
        HashMap::from([(
            "show bgp ipv4 unicast summary vrf all".to_string(),
            bgp_summary("Established"),
        )]),
    ));
    let store = Arc::new(ResultStore::new());

    Runner::new(RunnerSettings::default())
        .run(
            vec![device],
            vec![Arc::new(bgp::VerifyBgpIpv4UnicastState)],
            Arc::clone(&store),
        )
        .await
        .unwrap();

    let records = store.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, CheckStatus::Success);
    assert!(records[0].messages.is_empty());
}

#[tokio::test]
async fn test_unhealthy_peer_fails_with_identity() {
    let device = Arc::new(ScriptedDevice::new(
        "leaf1",
        HashMap::from([(
            "show bgp ipv4 unicast summary vrf all".to_string(),
            bgp_summary("Idle"),
        )]),
    ));
    let store = Arc::new(ResultStore::new());

    Runner::new(RunnerSettings::default())
        .run(
            vec![device],
            vec![Arc::new(bgp::VerifyBgpIpv4UnicastState)],
            Arc::clone(&store),
        )
        .await
        .unwrap();

    let records = store.all();
    assert_eq!(records[0].status, CheckStatus::Failure);
    assert!(records[0].messages[0].contains("default"));
    assert!(records[0].messages[0].contains("10.1.255.0"));
}

#[tokio::test]
async fn test_unreachable_device_errors_but_run_completes() {
    let healthy = Arc::new(ScriptedDevice::new(
        "leaf1",
        HashMap::from([(
            "show bgp ipv4 unicast summary vrf all".to_string(),
            bgp_summary("Established"),
        )]),
    ));
    let broken = Arc::new(ScriptedDevice::unreachable("leaf2"));
    let store = Arc::new(ResultStore::new());

    Runner::new(RunnerSettings::default())
        .run(
            vec![healthy, broken],
            vec![Arc::new(bgp::VerifyBgpIpv4UnicastState)],
            Arc::clone(&store),
        )
        .await
        .unwrap();

    let records = store.all();
    assert_eq!(records.len(), 2);
    assert_eq!(
        record_for(&records, "leaf1", "VerifyBgpIpv4UnicastState").status,
        CheckStatus::Success
    );
    let broken_record = record_for(&records, "leaf2", "VerifyBgpIpv4UnicastState");
    assert_eq!(broken_record.status, CheckStatus::Error);
    assert!(broken_record.messages[0].contains("connection refused"));
}

#[tokio::test]
async fn test_shared_command_collected_once() {
    let device = Arc::new(ScriptedDevice::new(
        "leaf1",
        HashMap::from([(
            "show version".to_string(),
            serde_json::json!({"version": "4.31.1F", "modelName": "DCS-7280SR"}),
        )]),
    ));
    let store = Arc::new(ResultStore::new());
    let catalog: Vec<Arc<dyn Check>> = vec![
        Arc::new(software::VerifyEosVersion::new(vec!["4.31.1F".to_string()]).unwrap()),
        Arc::new(ModelNameCheck),
    ];

    Runner::new(RunnerSettings::default())
        .run(
            vec![Arc::clone(&device) as Arc<dyn Device>],
            catalog,
            Arc::clone(&store),
        )
        .await
        .unwrap();

    // One wire round trip feeds both checks
    assert_eq!(device.collected(), vec!["show version".to_string()]);
    let records = store.all();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.status == CheckStatus::Success));
}

#[tokio::test]
async fn test_panicking_evaluation_spares_sibling_checks() {
    let device = Arc::new(ScriptedDevice::new(
        "leaf1",
        HashMap::from([(
            "show bgp ipv4 unicast summary vrf all".to_string(),
            bgp_summary("Established"),
        )]),
    ));
    let store = Arc::new(ResultStore::new());
    let catalog: Vec<Arc<dyn Check>> = vec![
        Arc::new(BrokenEvaluationCheck),
        Arc::new(bgp::VerifyBgpIpv4UnicastState),
    ];

    Runner::new(RunnerSettings::default())
        .run(vec![Arc::clone(&device) as Arc<dyn Device>], catalog, Arc::clone(&store))
        .await
        .unwrap();

    // Both checks still get a verdict record
    let records = store.all();
    assert_eq!(records.len(), 2);

    let broken = record_for(&records, "leaf1", "BrokenEvaluationCheck");
    assert_eq!(broken.status, CheckStatus::Error);
    assert!(broken.messages[0].contains("panicked"));
    assert!(broken.messages[0].contains("evaluation bug"));

    let sibling = record_for(&records, "leaf1", "VerifyBgpIpv4UnicastState");
    assert_eq!(sibling.status, CheckStatus::Success);
}

#[tokio::test]
async fn test_gated_check_skips_without_collecting() {
    let device = Arc::new(ScriptedDevice::new("lab1", HashMap::new()).with_model("vEOS-lab"));
    let store = Arc::new(ResultStore::new());

    Runner::new(RunnerSettings::default())
        .run(
            vec![Arc::clone(&device) as Arc<dyn Device>],
            vec![Arc::new(hardware::VerifyTemperature::gated())],
            Arc::clone(&store),
        )
        .await
        .unwrap();

    // The gate fired before rendering, so nothing ever reached the wire
    assert!(device.collected().is_empty());
    let records = store.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, CheckStatus::Skipped);
    assert!(records[0].messages[0].contains("vEOS-lab"));
}

#[tokio::test]
async fn test_tag_filter_excludes_devices() {
    let spine = Arc::new(
        ScriptedDevice::new(
            "spine1",
            HashMap::from([(
                "show bgp ipv4 unicast summary vrf all".to_string(),
                bgp_summary("Established"),
            )]),
        )
        .with_tags(&["spine"]),
    );
    let leaf = Arc::new(ScriptedDevice::new("leaf1", HashMap::new()).with_tags(&["leaf"]));
    let store = Arc::new(ResultStore::new());

    let settings = RunnerSettings {
        tags: Some(vec!["spine".to_string()]),
        ..Default::default()
    };
    Runner::new(settings)
        .run(
            vec![spine, leaf],
            vec![Arc::new(bgp::VerifyBgpIpv4UnicastState)],
            Arc::clone(&store),
        )
        .await
        .unwrap();

    assert_eq!(store.device_names(), vec!["spine1".to_string()]);
}

#[tokio::test]
async fn test_established_only_filter() {
    let broken = Arc::new(ScriptedDevice::unreachable("leaf2"));
    let store = Arc::new(ResultStore::new());

    let settings = RunnerSettings {
        established_only: true,
        ..Default::default()
    };
    Runner::new(settings)
        .run(
            vec![broken],
            vec![Arc::new(bgp::VerifyBgpIpv4UnicastState)],
            Arc::clone(&store),
        )
        .await
        .unwrap();

    assert!(store.is_empty());
}

#[tokio::test]
async fn test_empty_device_set_is_fatal() {
    let store = Arc::new(ResultStore::new());
    let result = Runner::new(RunnerSettings::default())
        .run(
            vec![],
            vec![Arc::new(bgp::VerifyBgpIpv4UnicastState)],
            store,
        )
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_empty_catalog_is_fatal() {
    let device = Arc::new(ScriptedDevice::new("leaf1", HashMap::new()));
    let store = Arc::new(ResultStore::new());
    let result = Runner::new(RunnerSettings::default())
        .run(vec![device as Arc<dyn Device>], vec![], store)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_expired_deadline_leaves_no_unset_records() {
    let mut scripted = ScriptedDevice::new(
        "leaf1",
        HashMap::from([(
            "show bgp ipv4 unicast summary vrf all".to_string(),
            bgp_summary("Established"),
        )]),
    );
    // The slow refresh guarantees the deadline fires before collection
    scripted.refresh_delay = Some(Duration::from_millis(100));
    let device = Arc::new(scripted);
    let store = Arc::new(ResultStore::new());

    let settings = RunnerSettings {
        overall_timeout: Some(Duration::from_millis(5)),
        ..Default::default()
    };
    Runner::new(settings)
        .run(
            vec![Arc::clone(&device) as Arc<dyn Device>],
            vec![Arc::new(bgp::VerifyBgpIpv4UnicastState)],
            Arc::clone(&store),
        )
        .await
        .unwrap();

    let records = store.all();
    assert_eq!(records.len(), 1);
    // Collection was skipped, so the verdict degrades to an error
    assert_eq!(records[0].status, CheckStatus::Error);
    assert!(records[0].messages[0].contains("never collected"));
}
