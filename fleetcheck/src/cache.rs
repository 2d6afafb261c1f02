//! Per-run command cache
//!
//! One cache per device per run. Checks that render the same command
//! identity receive the same shared entry, so the device collects it once
//! and every check reads the same output.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::command::{CommandEntry, CommandSpec};

/// In-memory cache of command entries keyed by command identity
#[derive(Debug, Default)]
pub struct CommandCache {
    entries: RwLock<HashMap<CommandSpec, Arc<CommandEntry>>>,
}

impl CommandCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Get the shared entry for a spec, inserting it on first render.
    ///
    /// The parameters of the first render are retained on the shared entry;
    /// identity does not include parameters.
    pub fn entry(&self, spec: CommandSpec, params: BTreeMap<String, String>) -> Arc<CommandEntry> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(spec.clone())
            .or_insert_with(|| Arc::new(CommandEntry::with_params(spec, params)))
            .clone()
    }

    /// Look up an entry without inserting
    pub fn get(&self, spec: &CommandSpec) -> Option<Arc<CommandEntry>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(spec).cloned()
    }

    /// All entries that have not been collected yet
    pub fn pending(&self) -> Vec<Arc<CommandEntry>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .values()
            .filter(|e| !e.is_collected())
            .cloned()
            .collect()
    }

    /// Number of distinct command identities registered
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
