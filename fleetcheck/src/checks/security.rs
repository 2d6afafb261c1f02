//! Management-plane security checks

use std::sync::Arc;

use crate::command::{CommandEntry, CommandRequest, CommandSpec};
use crate::errors::FleetcheckError;
use crate::report::CheckResult;

use super::{json_output, require, text_output, Check, CheckMeta};

/// Verifies the SSH daemon is disabled in the default VRF
///
/// The command only exists in text format; the status is scraped from the
/// first "SSHD status" line.
#[derive(Debug, Default)]
pub struct VerifySshStatus;

impl Check for VerifySshStatus {
    fn meta(&self) -> CheckMeta {
        CheckMeta {
            name: "VerifySshStatus",
            description: "Verifies the SSHD status for the default VRF is disabled",
            categories: &["security"],
        }
    }

    fn requests(&self) -> Vec<CommandRequest> {
        vec![CommandRequest::Fixed(CommandSpec::text("show management ssh"))]
    }

    fn evaluate(
        &self,
        entries: &[Arc<CommandEntry>],
        result: &mut CheckResult,
    ) -> anyhow::Result<()> {
        let output = text_output(&entries[0])?;
        let line = output
            .lines()
            .find(|l| l.starts_with("SSHD status"))
            .ok_or_else(|| anyhow::anyhow!("no 'SSHD status' line in command output"))?;

        if line.contains("disabled") {
            result.record_success();
        } else {
            result.record_failure(line.to_string());
        }
        Ok(())
    }
}

/// Verifies the SSH daemon has the expected IPv4 ACLs active in a VRF
#[derive(Debug)]
pub struct VerifySshIpv4Acl {
    number: usize,
    vrf: String,
}

impl VerifySshIpv4Acl {
    pub fn new(number: usize, vrf: impl Into<String>) -> Result<Self, FleetcheckError> {
        let vrf = vrf.into();
        if number == 0 {
            return Err(FleetcheckError::ConfigError(
                "VerifySshIpv4Acl requires an ACL count above zero".to_string(),
            ));
        }
        if vrf.is_empty() {
            return Err(FleetcheckError::ConfigError(
                "VerifySshIpv4Acl requires a VRF name".to_string(),
            ));
        }
        Ok(Self { number, vrf })
    }
}

impl Check for VerifySshIpv4Acl {
    fn meta(&self) -> CheckMeta {
        CheckMeta {
            name: "VerifySshIpv4Acl",
            description: "Verifies the SSH daemon has the expected IPv4 ACLs active in a VRF",
            categories: &["security"],
        }
    }

    fn requests(&self) -> Vec<CommandRequest> {
        vec![CommandRequest::Fixed(CommandSpec::json(
            "show management ssh ip access-list summary",
        ))]
    }

    fn evaluate(
        &self,
        entries: &[Arc<CommandEntry>],
        result: &mut CheckResult,
    ) -> anyhow::Result<()> {
        let output = json_output(&entries[0])?;
        let acls = require(require(output, "ipAclList")?, "aclList")?
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("'aclList' is not an array"))?;

        if acls.len() != self.number {
            result.record_failure(format!(
                "expected {} SSH IPv4 ACL(s), found {}",
                self.number,
                acls.len()
            ));
            return Ok(());
        }

        let mut inactive: Vec<String> = Vec::new();
        for acl in acls {
            let name = require(acl, "name")?.as_str().unwrap_or("unknown").to_string();
            let active_vrfs = require(acl, "activeVrfs")?
                .as_array()
                .ok_or_else(|| anyhow::anyhow!("'activeVrfs' is not an array"))?;
            if !active_vrfs.iter().any(|v| v.as_str() == Some(self.vrf.as_str())) {
                inactive.push(name);
            }
        }

        if inactive.is_empty() {
            result.record_success();
        } else {
            result.record_failure(format!(
                "SSH IPv4 ACL(s) not active in vrf {}: {:?}",
                self.vrf, inactive
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testutil::{collected_json, collected_text, evaluate};
    use crate::report::CheckStatus;

    fn acl_summary(acls: serde_json::Value) -> serde_json::Value {
        serde_json::json!({"ipAclList": {"aclList": acls}})
    }

    #[test]
    fn test_ssh_disabled() {
        let entries = vec![collected_text(
            "show management ssh",
            "SSHD status for Default VRF is disabled",
        )];
        assert_eq!(evaluate(&VerifySshStatus, &entries).status(), CheckStatus::Success);
    }

    #[test]
    fn test_ssh_enabled_fails_with_status_line() {
        let entries = vec![collected_text(
            "show management ssh",
            "SSHD status for Default VRF is enabled\nSSHD port is 22",
        )];
        let result = evaluate(&VerifySshStatus, &entries);
        assert_eq!(result.status(), CheckStatus::Failure);
        assert!(result.messages()[0].contains("enabled"));
    }

    #[test]
    fn test_ssh_status_line_missing_is_error() {
        let entries = vec![collected_text("show management ssh", "garbage output")];
        assert_eq!(evaluate(&VerifySshStatus, &entries).status(), CheckStatus::Error);
    }

    #[test]
    fn test_validates_inputs() {
        assert!(VerifySshIpv4Acl::new(0, "default").is_err());
        assert!(VerifySshIpv4Acl::new(1, "").is_err());
        assert!(VerifySshIpv4Acl::new(1, "default").is_ok());
    }

    #[test]
    fn test_expected_acl_active() {
        let check = VerifySshIpv4Acl::new(1, "default").unwrap();
        let entries = vec![collected_json(
            "show management ssh ip access-list summary",
            acl_summary(serde_json::json!([
                {"name": "MGMT-SSH", "activeVrfs": ["default"]},
            ])),
        )];
        assert_eq!(evaluate(&check, &entries).status(), CheckStatus::Success);
    }

    #[test]
    fn test_wrong_acl_count() {
        let check = VerifySshIpv4Acl::new(2, "default").unwrap();
        let entries = vec![collected_json(
            "show management ssh ip access-list summary",
            acl_summary(serde_json::json!([
                {"name": "MGMT-SSH", "activeVrfs": ["default"]},
            ])),
        )];
        let result = evaluate(&check, &entries);
        assert_eq!(result.status(), CheckStatus::Failure);
        assert!(result.messages()[0].contains("expected 2"));
    }

    #[test]
    fn test_acl_missing_from_vrf() {
        let check = VerifySshIpv4Acl::new(1, "MGMT").unwrap();
        let entries = vec![collected_json(
            "show management ssh ip access-list summary",
            acl_summary(serde_json::json!([
                {"name": "MGMT-SSH", "activeVrfs": ["default"]},
            ])),
        )];
        let result = evaluate(&check, &entries);
        assert_eq!(result.status(), CheckStatus::Failure);
        assert!(result.messages()[0].contains("MGMT-SSH"));
    }
}
