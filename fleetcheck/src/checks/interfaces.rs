//! Interface health checks

use std::sync::Arc;

use crate::command::{CommandEntry, CommandRequest, CommandSpec};
use crate::report::CheckResult;

use super::{json_output, require, Check, CheckMeta};

/// Verifies all interface error counters are zero
#[derive(Debug, Default)]
pub struct VerifyInterfaceErrors;

impl Check for VerifyInterfaceErrors {
    fn meta(&self) -> CheckMeta {
        CheckMeta {
            name: "VerifyInterfaceErrors",
            description: "Verifies interface error counters are equal to zero",
            categories: &["interfaces"],
        }
    }

    fn requests(&self) -> Vec<CommandRequest> {
        vec![CommandRequest::Fixed(CommandSpec::json(
            "show interfaces counters errors",
        ))]
    }

    fn evaluate(
        &self,
        entries: &[Arc<CommandEntry>],
        result: &mut CheckResult,
    ) -> anyhow::Result<()> {
        let output = json_output(&entries[0])?;
        let counters = require(output, "interfaceErrorCounters")?
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("'interfaceErrorCounters' is not an object"))?;

        for (interface, interface_counters) in counters {
            let interface_counters = interface_counters.as_object().ok_or_else(|| {
                anyhow::anyhow!("counters for interface {} are not an object", interface)
            })?;
            for (counter, value) in interface_counters {
                if value.as_i64().unwrap_or(0) > 0 {
                    result.record_failure(format!(
                        "interface {} has {} {} errors",
                        interface, value, counter
                    ));
                }
            }
        }
        Ok(())
    }
}
