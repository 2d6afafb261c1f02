//! VXLAN checks

use std::sync::Arc;

use crate::command::{CommandEntry, CommandRequest, CommandSpec};
use crate::report::CheckResult;

use super::{json_output, require, Check, CheckMeta};

/// Verifies the Vxlan1 interface is configured and up/up.
/// Skips itself when the interface is absent.
#[derive(Debug, Default)]
pub struct VerifyVxlan;

impl Check for VerifyVxlan {
    fn meta(&self) -> CheckMeta {
        CheckMeta {
            name: "VerifyVxlan",
            description: "Verifies the Vxlan1 interface is configured and up/up",
            categories: &["vxlan"],
        }
    }

    fn requests(&self) -> Vec<CommandRequest> {
        vec![CommandRequest::Fixed(CommandSpec::json(
            "show interfaces description",
        ))]
    }

    fn evaluate(
        &self,
        entries: &[Arc<CommandEntry>],
        result: &mut CheckResult,
    ) -> anyhow::Result<()> {
        let output = json_output(&entries[0])?;
        let descriptions = require(output, "interfaceDescriptions")?;

        let vxlan = match descriptions.get("Vxlan1") {
            Some(v) => v,
            None => {
                result.record_skipped("Vxlan1 interface is not configured");
                return Ok(());
            }
        };

        let line_protocol = require(vxlan, "lineProtocolStatus")?.as_str().unwrap_or("unknown");
        let interface_status = require(vxlan, "interfaceStatus")?.as_str().unwrap_or("unknown");

        if line_protocol == "up" && interface_status == "up" {
            result.record_success();
        } else {
            result.record_failure(format!(
                "Vxlan1 interface is {}/{}",
                line_protocol, interface_status
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testutil::{collected_json, evaluate};
    use crate::report::CheckStatus;

    #[test]
    fn test_vxlan_up_up() {
        let entries = vec![collected_json(
            "show interfaces description",
            serde_json::json!({"interfaceDescriptions": {
                "Vxlan1": {"lineProtocolStatus": "up", "interfaceStatus": "up"},
            }}),
        )];
        assert_eq!(evaluate(&VerifyVxlan, &entries).status(), CheckStatus::Success);
    }

    #[test]
    fn test_vxlan_down_fails_with_status() {
        let entries = vec![collected_json(
            "show interfaces description",
            serde_json::json!({"interfaceDescriptions": {
                "Vxlan1": {"lineProtocolStatus": "down", "interfaceStatus": "up"},
            }}),
        )];
        let result = evaluate(&VerifyVxlan, &entries);
        assert_eq!(result.status(), CheckStatus::Failure);
        assert!(result.messages()[0].contains("down/up"));
    }

    #[test]
    fn test_vxlan_absent_skips() {
        let entries = vec![collected_json(
            "show interfaces description",
            serde_json::json!({"interfaceDescriptions": {
                "Ethernet1": {"lineProtocolStatus": "up", "interfaceStatus": "up"},
            }}),
        )];
        assert_eq!(evaluate(&VerifyVxlan, &entries).status(), CheckStatus::Skipped);
    }
}
