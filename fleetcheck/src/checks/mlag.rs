//! Multi-chassis LAG checks

use std::sync::Arc;

use crate::command::{CommandEntry, CommandRequest, CommandSpec};
use crate::report::CheckResult;

use super::{json_output, require, Check, CheckMeta};

/// Verifies the MLAG state is healthy: active, negotiated, both links up.
/// Skips itself when MLAG is disabled on the device.
#[derive(Debug, Default)]
pub struct VerifyMlagStatus;

impl Check for VerifyMlagStatus {
    fn meta(&self) -> CheckMeta {
        CheckMeta {
            name: "VerifyMlagStatus",
            description: "Verifies the MLAG status: active, connected, local and peer links up",
            categories: &["mlag"],
        }
    }

    fn requests(&self) -> Vec<CommandRequest> {
        vec![CommandRequest::Fixed(CommandSpec::json("show mlag"))]
    }

    fn evaluate(
        &self,
        entries: &[Arc<CommandEntry>],
        result: &mut CheckResult,
    ) -> anyhow::Result<()> {
        let output = json_output(&entries[0])?;
        let state = require(output, "state")?.as_str().unwrap_or("unknown");

        if state == "disabled" {
            result.record_skipped("MLAG is disabled");
            return Ok(());
        }

        if state != "active" {
            result.record_failure(format!("MLAG state is {}", state));
        }
        let neg_status = require(output, "negStatus")?.as_str().unwrap_or("unknown");
        if neg_status != "connected" {
            result.record_failure(format!("MLAG negotiation status is {}", neg_status));
        }
        let local_intf = require(output, "localIntfStatus")?.as_str().unwrap_or("unknown");
        if local_intf != "up" {
            result.record_failure(format!("MLAG local interface is {}", local_intf));
        }
        let peer_link = require(output, "peerLinkStatus")?.as_str().unwrap_or("unknown");
        if peer_link != "up" {
            result.record_failure(format!("MLAG peer link is {}", peer_link));
        }
        Ok(())
    }
}
