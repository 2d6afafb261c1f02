//! Software version checks

use std::sync::Arc;

use crate::command::{CommandEntry, CommandRequest, CommandSpec};
use crate::errors::FleetcheckError;
use crate::report::CheckResult;

use super::{json_output, require, Check, CheckMeta};

/// Verifies the device runs one of the allowed software versions
#[derive(Debug)]
pub struct VerifyEosVersion {
    versions: Vec<String>,
}

impl VerifyEosVersion {
    pub fn new(versions: Vec<String>) -> Result<Self, FleetcheckError> {
        if versions.is_empty() {
            return Err(FleetcheckError::ConfigError(
                "VerifyEosVersion requires at least one allowed version".to_string(),
            ));
        }
        Ok(Self { versions })
    }
}

impl Check for VerifyEosVersion {
    fn meta(&self) -> CheckMeta {
        CheckMeta {
            name: "VerifyEosVersion",
            description: "Verifies the device is running one of the allowed software versions",
            categories: &["software"],
        }
    }

    fn requests(&self) -> Vec<CommandRequest> {
        vec![CommandRequest::Fixed(CommandSpec::json("show version"))]
    }

    fn evaluate(
        &self,
        entries: &[Arc<CommandEntry>],
        result: &mut CheckResult,
    ) -> anyhow::Result<()> {
        let output = json_output(&entries[0])?;
        let version = require(output, "version")?
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("'version' is not a string"))?;

        if self.versions.iter().any(|v| v == version) {
            result.record_success();
        } else {
            result.record_failure(format!(
                "running version {} which is not in the allowed list {:?}",
                version, self.versions
            ));
        }
        Ok(())
    }
}
