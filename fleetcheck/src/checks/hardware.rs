//! Hardware environment checks

use std::sync::Arc;

use crate::command::{CommandEntry, CommandRequest, CommandSpec};
use crate::report::CheckResult;

use super::{json_output, require, skip_on_platforms, with_gate, Check, CheckMeta, Gated};

/// Virtual platforms that expose no environment sensors
const LAB_PLATFORMS: &[&str] = &["cEOSLab", "vEOS-lab"];

/// Verifies the device temperature status is OK
#[derive(Debug, Default)]
pub struct VerifyTemperature;

impl VerifyTemperature {
    /// The check wrapped with the lab-platform gate, for catalogs that mix
    /// hardware and virtual devices.
    pub fn gated() -> Gated<Self> {
        with_gate(skip_on_platforms(LAB_PLATFORMS), Self)
    }
}

impl Check for VerifyTemperature {
    fn meta(&self) -> CheckMeta {
        CheckMeta {
            name: "VerifyTemperature",
            description: "Verifies the device temperature is currently OK",
            categories: &["hardware"],
        }
    }

    fn requests(&self) -> Vec<CommandRequest> {
        vec![CommandRequest::Fixed(CommandSpec::json(
            "show system environment temperature",
        ))]
    }

    fn evaluate(
        &self,
        entries: &[Arc<CommandEntry>],
        result: &mut CheckResult,
    ) -> anyhow::Result<()> {
        let output = json_output(&entries[0])?;
        let status = require(output, "systemStatus")?.as_str().unwrap_or("");

        if status == "temperatureOk" {
            result.record_success();
        } else {
            result.record_failure(format!(
                "device temperature is not OK, systemStatus is '{}'",
                status
            ));
        }
        Ok(())
    }
}
