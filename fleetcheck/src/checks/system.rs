//! System-level checks

use std::sync::Arc;

use crate::command::{CommandEntry, CommandRequest, CommandSpec};
use crate::errors::FleetcheckError;
use crate::report::CheckResult;

use super::{json_output, require, Check, CheckMeta};

/// Reload causes considered operator-initiated
const EXPECTED_RELOAD_CAUSES: &[&str] = &[
    "Reload requested by the user.",
    "Reload requested after FPGA upgrade",
];

/// Verifies the device uptime is above a minimum
#[derive(Debug)]
pub struct VerifyUptime {
    minimum_secs: u64,
}

impl VerifyUptime {
    pub fn new(minimum_secs: u64) -> Result<Self, FleetcheckError> {
        if minimum_secs == 0 {
            return Err(FleetcheckError::ConfigError(
                "VerifyUptime requires a minimum uptime above zero".to_string(),
            ));
        }
        Ok(Self { minimum_secs })
    }
}

impl Check for VerifyUptime {
    fn meta(&self) -> CheckMeta {
        CheckMeta {
            name: "VerifyUptime",
            description: "Verifies the device uptime is higher than a value",
            categories: &["system"],
        }
    }

    fn requests(&self) -> Vec<CommandRequest> {
        vec![CommandRequest::Fixed(CommandSpec::json("show uptime"))]
    }

    fn evaluate(
        &self,
        entries: &[Arc<CommandEntry>],
        result: &mut CheckResult,
    ) -> anyhow::Result<()> {
        let output = json_output(&entries[0])?;
        let uptime = require(output, "upTime")?
            .as_f64()
            .ok_or_else(|| anyhow::anyhow!("'upTime' is not a number"))?;

        if uptime > self.minimum_secs as f64 {
            result.record_success();
        } else {
            result.record_failure(format!(
                "uptime is {:.0}s, expected more than {}s",
                uptime, self.minimum_secs
            ));
        }
        Ok(())
    }
}

/// Verifies the last reload was requested by an operator
#[derive(Debug, Default)]
pub struct VerifyReloadCause;

impl Check for VerifyReloadCause {
    fn meta(&self) -> CheckMeta {
        CheckMeta {
            name: "VerifyReloadCause",
            description: "Verifies the last reload of the device was requested by a user",
            categories: &["system"],
        }
    }

    fn requests(&self) -> Vec<CommandRequest> {
        vec![CommandRequest::Fixed(CommandSpec::json("show reload cause"))]
    }

    fn evaluate(
        &self,
        entries: &[Arc<CommandEntry>],
        result: &mut CheckResult,
    ) -> anyhow::Result<()> {
        let output = json_output(&entries[0])?;
        let causes = require(output, "resetCauses")?
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("'resetCauses' is not an array"))?;

        let latest = causes
            .first()
            .ok_or_else(|| anyhow::anyhow!("no reload cause reported"))?;
        let description = require(latest, "description")?.as_str().unwrap_or("");

        if EXPECTED_RELOAD_CAUSES.contains(&description) {
            result.record_success();
        } else {
            result.record_failure(format!("reload cause is '{}'", description));
        }
        Ok(())
    }
}
