//! Verdicts and result aggregation

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// Five-state verdict of one check run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Evaluation has not started
    Unset,

    /// The check declined to run
    Skipped,

    /// Every assertion held
    Success,

    /// The probe succeeded but an assertion did not hold
    Failure,

    /// The probe or the evaluation itself broke
    Error,
}

impl CheckStatus {
    /// Severity used for worst-verdict rollups: error > failure > skipped > success
    pub fn severity(&self) -> u8 {
        match self {
            CheckStatus::Unset => 0,
            CheckStatus::Success => 1,
            CheckStatus::Skipped => 2,
            CheckStatus::Failure => 3,
            CheckStatus::Error => 4,
        }
    }
}

/// Accumulating verdict of one check bound to one device
///
/// Success is the default outcome; failure is sticky once reported and
/// messages accumulate across repeated failure reports.
#[derive(Debug, Clone)]
pub struct CheckResult {
    status: CheckStatus,
    messages: Vec<String>,
}

impl CheckResult {
    pub fn new() -> Self {
        Self {
            status: CheckStatus::Unset,
            messages: Vec::new(),
        }
    }

    pub fn status(&self) -> CheckStatus {
        self.status
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Mark success. Only transitions from `Unset`; an earlier failure,
    /// skip or error is never reverted.
    pub fn record_success(&mut self) {
        if self.status == CheckStatus::Unset {
            self.status = CheckStatus::Success;
        }
    }

    /// Report one assertion violation. May be called repeatedly; each call
    /// appends its message and the verdict stays `Failure`. Ignored once
    /// skipped; an `Error` verdict keeps the message but stays `Error`.
    pub fn record_failure(&mut self, message: impl Into<String>) {
        if self.status == CheckStatus::Skipped {
            return;
        }
        self.messages.push(message.into());
        if self.status != CheckStatus::Error {
            self.status = CheckStatus::Failure;
        }
    }

    /// Decline to run. Terminal, and only reachable before any other verdict.
    pub fn record_skipped(&mut self, message: impl Into<String>) {
        if self.status == CheckStatus::Unset {
            self.status = CheckStatus::Skipped;
            self.messages.push(message.into());
        }
    }

    /// Record an unexpected probe or evaluation breakage. Overrides every
    /// verdict except a skip.
    pub fn record_error(&mut self, message: impl Into<String>) {
        if self.status == CheckStatus::Skipped {
            return;
        }
        self.messages.push(message.into());
        self.status = CheckStatus::Error;
    }
}

impl Default for CheckResult {
    fn default() -> Self {
        Self::new()
    }
}

/// One recorded verdict for a (device, check) pair
#[derive(Debug, Clone, Serialize)]
pub struct CheckRecord {
    /// Device name
    pub device: String,

    /// Check name
    pub check: String,

    /// Check categories
    pub categories: Vec<String>,

    /// Final verdict
    pub status: CheckStatus,

    /// Human-readable messages, in evaluation order
    pub messages: Vec<String>,

    /// When the record was appended
    pub completed_at: DateTime<Utc>,
}

/// Per-status counters inside a summary row
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusCounts {
    pub success: usize,
    pub failure: usize,
    pub skipped: usize,
    pub error: usize,
}

impl StatusCounts {
    fn bump(&mut self, status: CheckStatus) {
        match status {
            CheckStatus::Success => self.success += 1,
            CheckStatus::Failure => self.failure += 1,
            CheckStatus::Skipped => self.skipped += 1,
            CheckStatus::Error => self.error += 1,
            CheckStatus::Unset => {}
        }
    }
}

/// One row of a grouped summary view
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    /// Group key: a device name or a check name
    pub name: String,

    /// Total records in the group
    pub total: usize,

    /// Worst single verdict in the group
    pub rollup: CheckStatus,

    /// Per-status counts
    pub counts: StatusCounts,
}

/// Append-only accumulator of verdict records
///
/// The store is the only structure written by concurrent device tasks; the
/// append path takes a mutex. Query views are meant for after the run.
#[derive(Debug, Default)]
pub struct ResultStore {
    records: Mutex<Vec<CheckRecord>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// Append one verdict record
    pub fn record(
        &self,
        device: impl Into<String>,
        check: impl Into<String>,
        categories: Vec<String>,
        result: &CheckResult,
    ) {
        let record = CheckRecord {
            device: device.into(),
            check: check.into(),
            categories,
            status: result.status(),
            messages: result.messages().to_vec(),
            completed_at: Utc::now(),
        };
        debug!(
            device = %record.device,
            check = %record.check,
            status = ?record.status,
            "Recording result"
        );
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.push(record);
    }

    /// Number of records
    pub fn len(&self) -> usize {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unfiltered listing, in append order
    pub fn all(&self) -> Vec<CheckRecord> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.clone()
    }

    /// Records for one device
    pub fn by_device(&self, device: &str) -> Vec<CheckRecord> {
        self.all().into_iter().filter(|r| r.device == device).collect()
    }

    /// Records for one check name
    pub fn by_check(&self, check: &str) -> Vec<CheckRecord> {
        self.all().into_iter().filter(|r| r.check == check).collect()
    }

    /// Distinct device names, in first-seen order
    pub fn device_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for record in self.all() {
            if !names.contains(&record.device) {
                names.push(record.device);
            }
        }
        names
    }

    /// Distinct check names, in first-seen order
    pub fn check_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for record in self.all() {
            if !names.contains(&record.check) {
                names.push(record.check);
            }
        }
        names
    }

    /// One row per device with a worst-verdict rollup
    pub fn device_summary(&self) -> Vec<GroupSummary> {
        Self::summarize(self.all(), |r| r.device.clone())
    }

    /// One row per check name with a worst-verdict rollup
    pub fn check_summary(&self) -> Vec<GroupSummary> {
        Self::summarize(self.all(), |r| r.check.clone())
    }

    /// Flat serialization: one record per (device, check) pair
    pub fn flat(&self) -> serde_json::Value {
        serde_json::json!(self.all())
    }

    /// Nested serialization: device -> check -> record
    pub fn nested(&self) -> serde_json::Value {
        let mut tree: BTreeMap<String, BTreeMap<String, serde_json::Value>> = BTreeMap::new();
        for record in self.all() {
            tree.entry(record.device.clone())
                .or_default()
                .insert(record.check.clone(), serde_json::json!(record));
        }
        serde_json::json!(tree)
    }

    fn summarize<K>(records: Vec<CheckRecord>, key: K) -> Vec<GroupSummary>
    where
        K: Fn(&CheckRecord) -> String,
    {
        let mut order: Vec<String> = Vec::new();
        let mut groups: BTreeMap<String, GroupSummary> = BTreeMap::new();

        for record in records {
            let name = key(&record);
            if !order.contains(&name) {
                order.push(name.clone());
            }
            let summary = groups.entry(name.clone()).or_insert_with(|| GroupSummary {
                name,
                total: 0,
                rollup: CheckStatus::Success,
                counts: StatusCounts::default(),
            });
            summary.total += 1;
            summary.counts.bump(record.status);
            if record.status.severity() > summary.rollup.severity() {
                summary.rollup = record.status;
            }
        }

        order.into_iter().filter_map(|n| groups.remove(&n)).collect()
    }
}
