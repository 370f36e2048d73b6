//! Configuration types
//!
//! Two documents configure the library:
//! - [`ConnectionConfig`]: broker endpoint, credentials, subscriptions and the
//!   retry policy. Plain serde struct with defaults and builder methods.
//! - [`HealthConfig`]: the monitors, heartbeats and seat decoder. Validated
//!   eagerly and strictly; every error names the offending key.

use crate::evaluator::MaskTable;
use crate::types::{ConfigError, ParseError, StateValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Command name reserved for the seat decoder
pub const SEAT_COMMAND: &str = "wdlm";

/// Broker connection settings and retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Broker host name or address
    pub host: String,
    /// Broker port
    pub port: u16,
    pub username: String,
    pub password: String,
    /// MQTT client identifier
    pub client_id: String,
    /// Topics subscribed on every successful connect
    pub subscriptions: Vec<String>,
    /// Failed attempts allowed before giving up (0 disables automatic retry)
    pub retries_max: u32,
    /// Fixed delay between a failure and the next attempt, in milliseconds
    pub retry_interval_ms: u64,
    /// MQTT keep-alive, in seconds
    pub keep_alive_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            client_id: "health-monitor".to_string(),
            subscriptions: vec!["ppss/health".to_string()],
            retries_max: 5,
            retry_interval_ms: 3000,
            keep_alive_secs: 30,
        }
    }
}

impl ConnectionConfig {
    /// Create a connection configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the broker endpoint
    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Builder method: set username/password authentication
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Builder method: set the client identifier
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Builder method: replace the subscribed topics
    pub fn with_subscriptions(mut self, topics: Vec<String>) -> Self {
        self.subscriptions = topics;
        self
    }

    /// Builder method: set the retry limit
    pub fn with_retries_max(mut self, retries_max: u32) -> Self {
        self.retries_max = retries_max;
        self
    }

    /// Builder method: set the delay between attempts
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval_ms = interval.as_millis() as u64;
        self
    }

    /// `host:port`, for logging and error messages
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Validated health document
#[derive(Debug, Clone, PartialEq)]
pub struct HealthConfig {
    pub version: i64,
    pub monitors: BTreeMap<String, MonitorConfig>,
    pub heartbeats: BTreeMap<String, HeartbeatConfig>,
    pub seats: SeatConfig,
}

/// One monitor: a telemetry command fanned out to several entries
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub name: String,
    pub color: String,
    pub dock: String,
    pub entries: BTreeMap<String, Arc<MaskTable>>,
}

/// One liveness watchdog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub name: String,
    pub retry_limit: u32,
    /// Seconds without a fresh ping before a retry is counted
    pub time_limit: u32,
}

/// Seat decoder presentation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatConfig {
    pub name: String,
    pub color: String,
    pub dock: String,
    /// Command routed to the decoder (compared case-insensitively)
    pub command: String,
}

impl Default for SeatConfig {
    fn default() -> Self {
        Self {
            name: "Seat Status".to_string(),
            color: "white".to_string(),
            dock: "left".to_string(),
            command: SEAT_COMMAND.to_string(),
        }
    }
}

impl HealthConfig {
    /// Load and validate a health document from a JSON file
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        log::info!("Loading health configuration: {:?}", path);
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{:?}: {}", path, e)))?;
        Self::from_json_str(&content)
    }

    /// Parse and validate a health document from JSON text
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let value: Value =
            serde_json::from_str(content).map_err(|e| ConfigError::Document(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Validate an already-parsed health document
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let root = value.as_object().ok_or_else(|| ConfigError::InvalidType {
            field: "<root>".to_string(),
            expected: "an object",
        })?;

        let version = require(root, "version", "")?
            .as_i64()
            .ok_or_else(|| invalid_type("version", "an integer"))?;

        let monitors = require_object(root, "monitors", "")?
            .iter()
            .map(|(id, cfg)| MonitorConfig::from_value(id, cfg).map(|monitor| (id.clone(), monitor)))
            .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

        let heartbeats = require_object(root, "heartbeats", "")?
            .iter()
            .map(|(id, cfg)| HeartbeatConfig::from_value(id, cfg).map(|heartbeat| (id.clone(), heartbeat)))
            .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

        let seats_key = if root.contains_key("seats") { "seats" } else { "wdlms" };
        let seats = SeatConfig::from_map(require_object(root, seats_key, "")?);

        log::debug!(
            "Health configuration v{}: {} monitors, {} heartbeats",
            version,
            monitors.len(),
            heartbeats.len()
        );

        Ok(Self {
            version,
            monitors,
            heartbeats,
            seats,
        })
    }
}

impl MonitorConfig {
    /// Validate one monitor section
    pub fn from_value(id: &str, value: &Value) -> Result<Self, ConfigError> {
        let path = format!("monitors.{}", id);
        let cfg = value
            .as_object()
            .ok_or_else(|| invalid_type(&path, "an object"))?;

        let name = optional_str(cfg, "name").unwrap_or(id).to_string();
        let color = require_str(cfg, "color", &path)?.to_string();
        let dock = require_str(cfg, "dock", &path)?.to_string();

        let mut entries = BTreeMap::new();
        for (entry_id, entry_cfg) in require_object(cfg, "entries", &path)? {
            let entry_path = format!("{}.entries.{}", path, entry_id);
            let entry_cfg = entry_cfg
                .as_object()
                .ok_or_else(|| invalid_type(&entry_path, "an object"))?;
            let masks = parse_mask_table(require_object(entry_cfg, "masks", &entry_path)?, &entry_path)?;
            entries.insert(entry_id.clone(), Arc::new(masks));
        }

        Ok(Self {
            name,
            color,
            dock,
            entries,
        })
    }
}

impl HeartbeatConfig {
    /// Validate one heartbeat section
    pub fn from_value(id: &str, value: &Value) -> Result<Self, ConfigError> {
        let path = format!("heartbeats.{}", id);
        let cfg = value
            .as_object()
            .ok_or_else(|| invalid_type(&path, "an object"))?;

        let name = optional_str(cfg, "name").unwrap_or(id).to_string();
        let retry_limit = require_u32(cfg, "retry_limit", &path)?;
        let time_limit = require_u32(cfg, "time_limit", &path)?;
        if time_limit == 0 {
            return Err(ConfigError::OutOfRange {
                field: format!("{}.time_limit", path),
                reason: "must be at least 1 second".to_string(),
            });
        }

        Ok(Self {
            name,
            retry_limit,
            time_limit,
        })
    }
}

impl SeatConfig {
    /// Presentation fields are optional; missing or non-string values fall back to defaults.
    fn from_map(cfg: &Map<String, Value>) -> Self {
        let defaults = Self::default();
        let pick = |key: &str, default: String| optional_str(cfg, key).map(str::to_string).unwrap_or(default);
        Self {
            name: pick("name", defaults.name),
            color: pick("color", defaults.color),
            dock: pick("dock", defaults.dock),
            command: pick("command", defaults.command),
        }
    }
}

/// Parse an integer literal with base-prefix auto-detection
///
/// Accepts an optional sign, `0x`/`0o`/`0b` prefixes (any case), single
/// underscores between digits and surrounding whitespace. A decimal literal
/// with a leading zero is rejected as ambiguous unless it is all zeros.
pub fn parse_int_literal(literal: &str) -> Result<i128, ParseError> {
    let invalid = || ParseError::InvalidInteger(literal.to_string());

    let trimmed = literal.trim();
    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let lower = unsigned.to_ascii_lowercase();
    let (radix, digits) = if let Some(rest) = lower.strip_prefix("0x") {
        (16, rest.strip_prefix('_').unwrap_or(rest))
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (8, rest.strip_prefix('_').unwrap_or(rest))
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (2, rest.strip_prefix('_').unwrap_or(rest))
    } else {
        (10, lower.as_str())
    };

    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return Err(invalid());
    }

    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    if !cleaned.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid());
    }
    if radix == 10 && cleaned.starts_with('0') && cleaned.chars().any(|c| c != '0') {
        return Err(invalid());
    }

    let magnitude = i128::from_str_radix(&cleaned, radix).map_err(|_| invalid())?;
    Ok(if negative { -magnitude } else { magnitude })
}

fn parse_mask_table(raw: &Map<String, Value>, path: &str) -> Result<MaskTable, ConfigError> {
    let field = format!("{}.masks", path);
    raw.iter()
        .map(|(key, state)| -> Result<(u64, StateValue), ConfigError> {
            let mask_error = |reason: String| ConfigError::InvalidMask {
                field: field.clone(),
                key: key.clone(),
                reason,
            };
            let mask = parse_int_literal(key).map_err(|e| mask_error(e.to_string()))?;
            let mask = u64::try_from(mask)
                .map_err(|_| mask_error("mask must be a non-negative 64-bit value".to_string()))?;
            let state = state
                .as_str()
                .ok_or_else(|| invalid_type(&format!("{}.{}", field, key), "a state name"))?
                .parse::<StateValue>()?;
            Ok((mask, state))
        })
        .collect()
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn invalid_type(field: &str, expected: &'static str) -> ConfigError {
    ConfigError::InvalidType {
        field: field.to_string(),
        expected,
    }
}

fn require<'a>(obj: &'a Map<String, Value>, key: &str, path: &str) -> Result<&'a Value, ConfigError> {
    obj.get(key).ok_or_else(|| ConfigError::MissingField(join(path, key)))
}

fn require_object<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    require(obj, key, path)?
        .as_object()
        .ok_or_else(|| invalid_type(&join(path, key), "an object"))
}

fn require_str<'a>(obj: &'a Map<String, Value>, key: &str, path: &str) -> Result<&'a str, ConfigError> {
    require(obj, key, path)?
        .as_str()
        .ok_or_else(|| invalid_type(&join(path, key), "a string"))
}

fn require_u32(obj: &Map<String, Value>, key: &str, path: &str) -> Result<u32, ConfigError> {
    let field = join(path, key);
    let value = require(obj, key, path)?
        .as_i64()
        .ok_or_else(|| invalid_type(&field, "an integer"))?;
    u32::try_from(value).map_err(|_| ConfigError::OutOfRange {
        field,
        reason: format!("{} is not a non-negative 32-bit integer", value),
    })
}

fn optional_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}
