//! Record shapes exchanged with the persistence layer.
//!
//! The engine reads [`Action`]s, reads and upserts [`RecurrenceRule`]s, and
//! reads and rewrites [`Occurrence`]s. A [`Snapshot`] bundles all three.

mod action;
mod occurrence;
mod rule;

pub use action::{Action, LegacySchedule, PriorityTier, RecurrenceKind, SlotSpec, TimePolicy};
pub use occurrence::{
    occurrence_id, Occurrence, OccurrenceKey, OccurrenceStatus, SlotKey, TimeType,
};
pub use rule::{source_key, RecurrenceRule, RuleKind, RuleTime};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Everything the persistence layer hands to the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub rules: Vec<RecurrenceRule>,
    #[serde(default)]
    pub occurrences: Vec<Occurrence>,
}

impl Snapshot {
    pub fn action(&self, id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }

    /// Active rules owned by `action_id`, in collection order.
    pub fn active_rules_for<'a>(&'a self, action_id: &'a str) -> impl Iterator<Item = &'a RecurrenceRule> + 'a {
        self.rules
            .iter()
            .filter(move |r| r.active && r.action_id == action_id)
    }

    /// Read a JSON snapshot from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid snapshot.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the snapshot to disk as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
