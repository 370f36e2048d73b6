//! Monitors: one telemetry command fanned out to several entries
//!
//! Entries are presumed to read disjoint bit ranges of one packed telemetry
//! word. No cross-entry validation is performed.

use crate::config::MonitorConfig;
use crate::evaluator::{Entry, StateSet};
use crate::types::ConfigError;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Point-in-time view of a monitor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub id: String,
    pub name: String,
    pub color: String,
    pub dock: String,
    pub entries: BTreeMap<String, StateSet>,
}

/// A named set of entries evaluated against the same value
#[derive(Debug, Clone)]
pub struct Monitor {
    id: String,
    name: String,
    color: String,
    dock: String,
    entries: BTreeMap<String, Entry>,
}

impl Monitor {
    /// Build a monitor from a validated configuration section
    pub fn from_config(id: impl Into<String>, config: &MonitorConfig) -> Self {
        let entries = config
            .entries
            .iter()
            .map(|(name, masks)| (name.clone(), Entry::new(name.clone(), masks.clone())))
            .collect();

        Self {
            id: id.into(),
            name: config.name.clone(),
            color: config.color.clone(),
            dock: config.dock.clone(),
            entries,
        }
    }

    /// Validate a raw configuration section and build the monitor from it
    pub fn from_value(id: &str, value: &Value) -> Result<Self, ConfigError> {
        let config = MonitorConfig::from_value(id, value)?;
        Ok(Self::from_config(id, &config))
    }

    /// Evaluate every entry against `value`
    pub fn process(&mut self, value: u64) -> BTreeMap<String, StateSet> {
        log::trace!("Monitor '{}' processing 0x{:X}", self.id, value);
        self.entries
            .iter_mut()
            .map(|(name, entry)| (name.clone(), entry.evaluate(value)))
            .collect()
    }

    /// Current state of every entry
    pub fn states(&self) -> BTreeMap<String, StateSet> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.states().clone()))
            .collect()
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            color: self.color.clone(),
            dock: self.dock.clone(),
            entries: self.states(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn dock(&self) -> &str {
        &self.dock
    }

    pub fn entries(&self) -> &BTreeMap<String, Entry> {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StateValue;
    use serde_json::json;

    fn power_panel() -> Monitor {
        Monitor::from_value(
            "power",
            &json!({
                "color": "yellow",
                "dock": "center",
                "entries": {
                    "main": { "masks": { "0x01": "On", "0x02": "Faulted" } },
                    "aux":  { "masks": { "0x10": "On", "0x20": "Faulted" } }
                }
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_from_value_defaults_name_to_id() {
        let monitor = power_panel();
        assert_eq!(monitor.name(), "power");
        assert_eq!(monitor.color(), "yellow");
        assert_eq!(monitor.entries().len(), 2);
    }

    #[test]
    fn test_process_fans_out_to_every_entry() {
        let mut monitor = power_panel();
        let result = monitor.process(0x21);

        assert_eq!(result["main"], StateSet::from([StateValue::On]));
        assert_eq!(result["aux"], StateSet::from([StateValue::Faulted]));
        assert_eq!(monitor.states(), result);
    }

    #[test]
    fn test_initial_states_unknown() {
        let monitor = power_panel();
        for states in monitor.states().values() {
            assert_eq!(states, &StateSet::from([StateValue::Unknown]));
        }
    }

    #[test]
    fn test_invalid_entries_field_fails_construction() {
        let err = Monitor::from_value(
            "power",
            &json!({ "color": "yellow", "dock": "center", "entries": [] }),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidType {
                field: "monitors.power.entries".to_string(),
                expected: "an object",
            }
        );
    }

    #[test]
    fn test_non_object_entry_fails_construction() {
        let err = Monitor::from_value(
            "power",
            &json!({ "color": "yellow", "dock": "center", "entries": { "main": 3 } }),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidType {
                field: "monitors.power.entries.main".to_string(),
                expected: "an object",
            }
        );
    }
}
