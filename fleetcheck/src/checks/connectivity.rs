//! Network reachability checks

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::command::{CommandEntry, CommandRequest, CommandTemplate};
use crate::errors::FleetcheckError;
use crate::report::CheckResult;

use super::{json_output, require, Check, CheckMeta};

/// One source interface / destination address pair to test
#[derive(Debug, Clone)]
pub struct ReachabilityPair {
    pub src: String,
    pub dst: String,
}

/// Verifies network reachability from source interfaces to destinations
#[derive(Debug)]
pub struct VerifyReachability {
    pairs: Vec<ReachabilityPair>,
}

impl VerifyReachability {
    pub fn new(pairs: Vec<ReachabilityPair>) -> Result<Self, FleetcheckError> {
        if pairs.is_empty() {
            return Err(FleetcheckError::ConfigError(
                "VerifyReachability requires at least one source/destination pair".to_string(),
            ));
        }
        Ok(Self { pairs })
    }
}

impl Check for VerifyReachability {
    fn meta(&self) -> CheckMeta {
        CheckMeta {
            name: "VerifyReachability",
            description: "Verifies network reachability to one or many destination IPs",
            categories: &["connectivity"],
        }
    }

    fn requests(&self) -> Vec<CommandRequest> {
        vec![CommandRequest::Templated {
            template: CommandTemplate::json("ping {dst} source {src} repeat 2"),
            params: self
                .pairs
                .iter()
                .map(|pair| {
                    BTreeMap::from([
                        ("src".to_string(), pair.src.clone()),
                        ("dst".to_string(), pair.dst.clone()),
                    ])
                })
                .collect(),
        }]
    }

    fn evaluate(
        &self,
        entries: &[Arc<CommandEntry>],
        result: &mut CheckResult,
    ) -> anyhow::Result<()> {
        for entry in entries {
            let output = json_output(entry)?;
            let messages = require(output, "messages")?
                .as_array()
                .ok_or_else(|| anyhow::anyhow!("'messages' is not an array"))?;
            let first = messages
                .first()
                .and_then(|m| m.as_str())
                .ok_or_else(|| anyhow::anyhow!("ping produced no output message"))?;

            if !first.contains("2 received") {
                let src = entry.params().get("src").map_or("?", String::as_str);
                let dst = entry.params().get("dst").map_or("?", String::as_str);
                result.record_failure(format!("connectivity from {} to {} failed", src, dst));
            }
        }
        Ok(())
    }
}
