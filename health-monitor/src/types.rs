//! Core types for the health monitor library
//!
//! This module defines the semantic states produced by bitmask evaluation and
//! the error taxonomy shared by every component. Configuration problems are
//! fatal at load time, parse problems are isolated to a single message, and
//! transport problems are recovered by the connection manager's bounded retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp type used throughout the library
pub type Timestamp = DateTime<Utc>;

/// Result type for library operations
pub type Result<T> = std::result::Result<T, HealthError>;

/// Semantic state derived from a telemetry value
///
/// Ordering is declaration order, which keeps state sets deterministic when
/// rendered or serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StateValue {
    Unknown,
    Off,
    On,
    Faulted,
    Bluetooth,
    #[serde(rename = "Not Talking")]
    NotTalking,
    Talking,
}

impl StateValue {
    /// Every state, in declaration order
    pub const ALL: [StateValue; 7] = [
        StateValue::Unknown,
        StateValue::Off,
        StateValue::On,
        StateValue::Faulted,
        StateValue::Bluetooth,
        StateValue::NotTalking,
        StateValue::Talking,
    ];

    /// Human-readable name, also the spelling used in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            StateValue::Unknown => "Unknown",
            StateValue::Off => "Off",
            StateValue::On => "On",
            StateValue::Faulted => "Faulted",
            StateValue::Bluetooth => "Bluetooth",
            StateValue::NotTalking => "Not Talking",
            StateValue::Talking => "Talking",
        }
    }

    /// Display color tag for the view layer
    pub fn color(&self) -> &'static str {
        match self {
            StateValue::Unknown | StateValue::Off | StateValue::NotTalking => "gray",
            StateValue::On | StateValue::Talking => "green",
            StateValue::Faulted => "red",
            StateValue::Bluetooth => "blue",
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateValue {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        StateValue::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownState(s.to_string()))
    }
}

/// Errors raised while loading or validating configuration
///
/// Every variant names the offending key so a broken document can be fixed
/// without guessing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required field '{0}'")]
    MissingField(String),

    #[error("Field '{field}' must be {expected}")]
    InvalidType { field: String, expected: &'static str },

    #[error("Invalid mask key '{key}' in '{field}': {reason}")]
    InvalidMask {
        field: String,
        key: String,
        reason: String,
    },

    #[error("Unknown state name: '{0}'")]
    UnknownState(String),

    #[error("Field '{field}' is out of range: {reason}")]
    OutOfRange { field: String, reason: String },

    #[error("Failed to parse configuration document: {0}")]
    Document(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Errors raised while interpreting a single inbound message
///
/// These never take down the orchestrator; the offending message is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed message envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Unable to parse value for '{cmd}': expected {expected}, got {found}")]
    InvalidValue {
        cmd: String,
        expected: &'static str,
        found: String,
    },

    #[error("Invalid integer literal '{0}'")]
    InvalidInteger(String),
}

/// Errors reported by the broker transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Connection refused by {endpoint}: {reason}")]
    ConnectionRefused { endpoint: String, reason: String },

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Subscription to '{topic}' failed: {reason}")]
    SubscribeFailed { topic: String, reason: String },

    #[error("Transport is not connected")]
    NotConnected,
}

/// Top-level error type for the library
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
