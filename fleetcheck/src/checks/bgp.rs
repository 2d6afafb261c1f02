//! BGP state checks

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::command::{CommandEntry, CommandRequest, CommandSpec, CommandTemplate};
use crate::errors::FleetcheckError;
use crate::report::CheckResult;

use super::{json_output, require, Check, CheckMeta};

/// A peer is healthy when established with empty message queues
fn peer_issue(peer: &serde_json::Value) -> anyhow::Result<Option<String>> {
    let state = require(peer, "peerState")?.as_str().unwrap_or("unknown");
    let in_queue = require(peer, "inMsgQueue")?.as_i64().unwrap_or(0);
    let out_queue = require(peer, "outMsgQueue")?.as_i64().unwrap_or(0);

    if state != "Established" || in_queue != 0 || out_queue != 0 {
        Ok(Some(format!(
            "state {} (inQ {}, outQ {})",
            state, in_queue, out_queue
        )))
    } else {
        Ok(None)
    }
}

/// Verifies all IPv4 unicast BGP sessions are established across all VRFs
/// with empty message queues.
#[derive(Debug, Default)]
pub struct VerifyBgpIpv4UnicastState;

impl Check for VerifyBgpIpv4UnicastState {
    fn meta(&self) -> CheckMeta {
        CheckMeta {
            name: "VerifyBgpIpv4UnicastState",
            description: "Verifies all IPv4 unicast BGP sessions are established (all VRFs) with empty queues",
            categories: &["bgp", "routing"],
        }
    }

    fn requests(&self) -> Vec<CommandRequest> {
        vec![CommandRequest::Fixed(CommandSpec::json(
            "show bgp ipv4 unicast summary vrf all",
        ))]
    }

    fn evaluate(
        &self,
        entries: &[Arc<CommandEntry>],
        result: &mut CheckResult,
    ) -> anyhow::Result<()> {
        let output = json_output(&entries[0])?;
        let vrfs = require(output, "vrfs")?
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("'vrfs' is not an object"))?;

        if vrfs.is_empty() {
            result.record_skipped("no BGP VRFs configured");
            return Ok(());
        }

        for (vrf, vrf_data) in vrfs {
            let peers = require(vrf_data, "peers")?
                .as_object()
                .ok_or_else(|| anyhow::anyhow!("'peers' is not an object in vrf {}", vrf))?;
            for (peer, peer_data) in peers {
                if let Some(issue) = peer_issue(peer_data)? {
                    result.record_failure(format!(
                        "vrf {} peer {} is not healthy: {}",
                        vrf, peer, issue
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Verifies the number of healthy IPv4 unicast BGP peers per VRF
#[derive(Debug)]
pub struct VerifyBgpIpv4UnicastCount {
    expected: BTreeMap<String, usize>,
}

impl VerifyBgpIpv4UnicastCount {
    /// `expected` maps a VRF name to the peer count it must hold
    pub fn new(expected: BTreeMap<String, usize>) -> Result<Self, FleetcheckError> {
        if expected.is_empty() {
            return Err(FleetcheckError::ConfigError(
                "VerifyBgpIpv4UnicastCount requires at least one VRF".to_string(),
            ));
        }
        Ok(Self { expected })
    }
}

impl Check for VerifyBgpIpv4UnicastCount {
    fn meta(&self) -> CheckMeta {
        CheckMeta {
            name: "VerifyBgpIpv4UnicastCount",
            description: "Verifies the expected number of healthy IPv4 unicast BGP peers per VRF",
            categories: &["bgp", "routing"],
        }
    }

    fn requests(&self) -> Vec<CommandRequest> {
        vec![CommandRequest::Templated {
            template: CommandTemplate::json("show bgp ipv4 unicast summary vrf {vrf}"),
            params: self
                .expected
                .keys()
                .map(|vrf| BTreeMap::from([("vrf".to_string(), vrf.clone())]))
                .collect(),
        }]
    }

    fn evaluate(
        &self,
        entries: &[Arc<CommandEntry>],
        result: &mut CheckResult,
    ) -> anyhow::Result<()> {
        for entry in entries {
            let vrf = entry
                .params()
                .get("vrf")
                .ok_or_else(|| anyhow::anyhow!("rendered command lost its 'vrf' parameter"))?
                .clone();
            let expected = match self.expected.get(&vrf) {
                Some(n) => *n,
                None => continue,
            };

            let output = json_output(entry)?;
            let peers = require(require(require(output, "vrfs")?, &vrf)?, "peers")?
                .as_object()
                .ok_or_else(|| anyhow::anyhow!("'peers' is not an object in vrf {}", vrf))?;

            let mut healthy = 0usize;
            for (peer, peer_data) in peers {
                match peer_issue(peer_data)? {
                    Some(issue) => result.record_failure(format!(
                        "vrf {} peer {} is not healthy: {}",
                        vrf, peer, issue
                    )),
                    None => healthy += 1,
                }
            }
            if healthy != expected {
                result.record_failure(format!(
                    "vrf {} has {} healthy peers, expected {}",
                    vrf, healthy, expected
                ));
            }
        }
        Ok(())
    }
}

/// Verifies all EVPN BGP sessions are established (default VRF)
#[derive(Debug, Default)]
pub struct VerifyBgpEvpnState;

impl Check for VerifyBgpEvpnState {
    fn meta(&self) -> CheckMeta {
        CheckMeta {
            name: "VerifyBgpEvpnState",
            description: "Verifies all EVPN BGP sessions are established",
            categories: &["bgp", "routing"],
        }
    }

    fn requests(&self) -> Vec<CommandRequest> {
        vec![CommandRequest::Fixed(CommandSpec::json("show bgp evpn summary"))]
    }

    fn evaluate(
        &self,
        entries: &[Arc<CommandEntry>],
        result: &mut CheckResult,
    ) -> anyhow::Result<()> {
        let output = json_output(&entries[0])?;
        let peers = require(require(require(output, "vrfs")?, "default")?, "peers")?
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("'peers' is not an object"))?;

        if peers.is_empty() {
            result.record_skipped("no EVPN peers configured");
            return Ok(());
        }

        for (peer, peer_data) in peers {
            let state = require(peer_data, "peerState")?.as_str().unwrap_or("unknown");
            if state != "Established" {
                result.record_failure(format!("EVPN peer {} is in state {}", peer, state));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testutil::{collected_json, collected_json_with_params, evaluate};
    use crate::report::CheckStatus;

    fn summary(peer_state: &str, in_queue: i64) -> serde_json::Value {
        serde_json::json!({
            "vrfs": {
                "default": {
                    "peers": {
                        "10.1.255.0": {
                            "peerState": peer_state,
                            "inMsgQueue": in_queue,
                            "outMsgQueue": 0,
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn test_ipv4_unicast_state_success() {
        let entries = vec![collected_json(
            "show bgp ipv4 unicast summary vrf all",
            summary("Established", 0),
        )];
        let result = evaluate(&VerifyBgpIpv4UnicastState, &entries);
        assert_eq!(result.status(), CheckStatus::Success);
    }

    #[test]
    fn test_ipv4_unicast_state_failure_names_vrf_and_peer() {
        let entries = vec![collected_json(
            "show bgp ipv4 unicast summary vrf all",
            summary("Idle", 0),
        )];
        let result = evaluate(&VerifyBgpIpv4UnicastState, &entries);
        assert_eq!(result.status(), CheckStatus::Failure);
        assert!(result.messages()[0].contains("default"));
        assert!(result.messages()[0].contains("10.1.255.0"));
        assert!(result.messages()[0].contains("Idle"));
    }

    #[test]
    fn test_reevaluating_collected_set_is_stable() {
        let entries = vec![collected_json(
            "show bgp ipv4 unicast summary vrf all",
            summary("Idle", 2),
        )];
        let first = evaluate(&VerifyBgpIpv4UnicastState, &entries);
        let second = evaluate(&VerifyBgpIpv4UnicastState, &entries);
        assert_eq!(first.status(), second.status());
        assert_eq!(first.messages(), second.messages());
    }

    #[test]
    fn test_ipv4_unicast_state_queue_failure() {
        let entries = vec![collected_json(
            "show bgp ipv4 unicast summary vrf all",
            summary("Established", 3),
        )];
        let result = evaluate(&VerifyBgpIpv4UnicastState, &entries);
        assert_eq!(result.status(), CheckStatus::Failure);
    }

    #[test]
    fn test_ipv4_unicast_state_no_vrfs_skips() {
        let entries = vec![collected_json(
            "show bgp ipv4 unicast summary vrf all",
            serde_json::json!({"vrfs": {}}),
        )];
        let result = evaluate(&VerifyBgpIpv4UnicastState, &entries);
        assert_eq!(result.status(), CheckStatus::Skipped);
    }

    #[test]
    fn test_ipv4_unicast_state_missing_key_is_error() {
        let entries = vec![collected_json(
            "show bgp ipv4 unicast summary vrf all",
            serde_json::json!({"unexpected": true}),
        )];
        let result = evaluate(&VerifyBgpIpv4UnicastState, &entries);
        assert_eq!(result.status(), CheckStatus::Error);
        assert!(result.messages()[0].contains("vrfs"));
    }

    #[test]
    fn test_count_validates_inputs() {
        assert!(VerifyBgpIpv4UnicastCount::new(BTreeMap::new()).is_err());
    }

    #[test]
    fn test_count_renders_one_command_per_vrf() {
        let check = VerifyBgpIpv4UnicastCount::new(BTreeMap::from([
            ("default".to_string(), 2),
            ("prod".to_string(), 1),
        ]))
        .unwrap();
        let rendered = check.requests()[0].render().unwrap();
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[0].0.text, "show bgp ipv4 unicast summary vrf default");
        assert_eq!(rendered[1].0.text, "show bgp ipv4 unicast summary vrf prod");
    }

    #[test]
    fn test_count_mismatch_fails() {
        let check =
            VerifyBgpIpv4UnicastCount::new(BTreeMap::from([("default".to_string(), 2)])).unwrap();
        let entries = vec![collected_json_with_params(
            "show bgp ipv4 unicast summary vrf default",
            BTreeMap::from([("vrf".to_string(), "default".to_string())]),
            summary("Established", 0),
        )];
        let result = evaluate(&check, &entries);
        assert_eq!(result.status(), CheckStatus::Failure);
        assert!(result.messages()[0].contains("expected 2"));
    }

    #[test]
    fn test_evpn_state_failure() {
        let check = VerifyBgpEvpnState;
        let entries = vec![collected_json(
            "show bgp evpn summary",
            serde_json::json!({
                "vrfs": {"default": {"peers": {
                    "10.1.0.1": {"peerState": "Established"},
                    "10.1.0.2": {"peerState": "Active"},
                }}}
            }),
        )];
        let result = evaluate(&check, &entries);
        assert_eq!(result.status(), CheckStatus::Failure);
        assert_eq!(result.messages().len(), 1);
        assert!(result.messages()[0].contains("10.1.0.2"));
    }
}
