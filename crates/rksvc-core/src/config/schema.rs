//! Recognised settings of the daemon's configuration document.

use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

use crate::error::LifecycleError;

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];
const MAX_WORKERS: u64 = 256;

/// A key the daemon understands. Everything else is carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SettingKey {
    LogLevel,
    ChromePath,
    Headless,
    DisableGpu,
    Timeout,
    Workers,
}

impl SettingKey {
    pub const ALL: [SettingKey; 6] = [
        SettingKey::LogLevel,
        SettingKey::ChromePath,
        SettingKey::Headless,
        SettingKey::DisableGpu,
        SettingKey::Timeout,
        SettingKey::Workers,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SettingKey::LogLevel => "log_level",
            SettingKey::ChromePath => "chrome_path",
            SettingKey::Headless => "headless",
            SettingKey::DisableGpu => "disable_gpu",
            SettingKey::Timeout => "timeout",
            SettingKey::Workers => "workers",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.name() == name)
    }

    /// Variable read by non-interactive configure.
    pub fn env_var(self) -> &'static str {
        match self {
            SettingKey::LogLevel => "REASONKIT_LOG_LEVEL",
            SettingKey::ChromePath => "REASONKIT_CHROME_PATH",
            SettingKey::Headless => "REASONKIT_HEADLESS",
            SettingKey::DisableGpu => "REASONKIT_DISABLE_GPU",
            SettingKey::Timeout => "REASONKIT_TIMEOUT",
            SettingKey::Workers => "REASONKIT_WORKERS",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SettingKey::LogLevel => "Diagnostic verbosity: error, warn, info, debug or trace.",
            SettingKey::ChromePath => {
                "Path to the browser engine binary. Empty means auto-detect."
            }
            SettingKey::Headless => "Run the browser engine without a display surface.",
            SettingKey::DisableGpu => "Do not request hardware acceleration from the engine.",
            SettingKey::Timeout => "Seconds a single operation may run before it is abandoned.",
            SettingKey::Workers => "Upper bound on concurrent worker threads (1-256).",
        }
    }

    pub fn default_value(self) -> SettingValue {
        match self {
            SettingKey::LogLevel => SettingValue::Text("info".to_string()),
            SettingKey::ChromePath => SettingValue::Text(String::new()),
            SettingKey::Headless => SettingValue::Flag(true),
            SettingKey::DisableGpu => SettingValue::Flag(true),
            SettingKey::Timeout => SettingValue::Number(30),
            SettingKey::Workers => SettingValue::Number(4),
        }
    }

    /// Parse operator input (environment or prompt) for this key.
    pub fn parse(self, raw: &str) -> Result<SettingValue, LifecycleError> {
        let raw = raw.trim();
        let invalid = |reason: &str| LifecycleError::InvalidSetting {
            key: self.name().to_string(),
            value: raw.to_string(),
            reason: reason.to_string(),
        };
        match self {
            SettingKey::LogLevel => {
                let level = raw.to_ascii_lowercase();
                if LOG_LEVELS.contains(&level.as_str()) {
                    Ok(SettingValue::Text(level))
                } else {
                    Err(invalid("expected one of error, warn, info, debug, trace"))
                }
            }
            SettingKey::ChromePath => {
                if raw.is_empty() || raw.starts_with('/') {
                    Ok(SettingValue::Text(raw.to_string()))
                } else {
                    Err(invalid("expected an absolute path or an empty value"))
                }
            }
            SettingKey::Headless | SettingKey::DisableGpu => parse_flag(raw)
                .map(SettingValue::Flag)
                .ok_or_else(|| invalid("expected true/false, yes/no, on/off or 1/0")),
            SettingKey::Timeout => match raw.parse::<u64>() {
                Ok(0) | Err(_) => Err(invalid("expected a whole number of seconds above zero")),
                Ok(secs) => Ok(SettingValue::Number(secs)),
            },
            SettingKey::Workers => match raw.parse::<u64>() {
                Ok(n) if (1..=MAX_WORKERS).contains(&n) => Ok(SettingValue::Number(n)),
                _ => Err(invalid("expected a whole number between 1 and 256")),
            },
        }
    }

    /// Interpret a value read from an existing document.
    pub fn from_toml(self, value: &toml::Value) -> Result<SettingValue, LifecycleError> {
        match value {
            toml::Value::String(s) => self.parse(s),
            toml::Value::Boolean(b) if matches!(self, SettingKey::Headless | SettingKey::DisableGpu) => {
                Ok(SettingValue::Flag(*b))
            }
            toml::Value::Integer(i) if matches!(self, SettingKey::Timeout | SettingKey::Workers) => {
                self.parse(&i.to_string())
            }
            other => Err(LifecycleError::InvalidSetting {
                key: self.name().to_string(),
                value: other.to_string(),
                reason: format!("unexpected {} value", other.type_str()),
            }),
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Text(String),
    Flag(bool),
    Number(u64),
}

impl SettingValue {
    pub fn to_toml(&self) -> toml::Value {
        match self {
            SettingValue::Text(s) => toml::Value::String(s.clone()),
            SettingValue::Flag(b) => toml::Value::Boolean(*b),
            SettingValue::Number(n) => toml::Value::Integer(i64::try_from(*n).unwrap_or(i64::MAX)),
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Text(s) => f.write_str(s),
            SettingValue::Flag(b) => write!(f, "{b}"),
            SettingValue::Number(n) => write!(f, "{n}"),
        }
    }
}

/// The persisted settings document.
///
/// Recognised keys are typed; anything else lives in `extra` and is written
/// back unchanged. A recognised key whose value does not validate is kept raw
/// in `rejected` until an override replaces it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDocument {
    values: BTreeMap<SettingKey, SettingValue>,
    rejected: BTreeMap<SettingKey, toml::Value>,
    extra: toml::Table,
}

impl ConfigDocument {
    /// Every recognised key at its default.
    pub fn defaults() -> Self {
        Self {
            values: SettingKey::ALL
                .into_iter()
                .map(|key| (key, key.default_value()))
                .collect(),
            ..Self::default()
        }
    }

    /// Split a parsed table into recognised keys and passthrough entries.
    pub fn from_table(table: toml::Table) -> Self {
        let mut document = ConfigDocument::default();
        for (name, value) in table {
            match SettingKey::from_name(&name) {
                Some(key) => match key.from_toml(&value) {
                    Ok(parsed) => {
                        document.values.insert(key, parsed);
                    }
                    Err(err) => {
                        warn!(key = %key, "keeping unrecognised value as written: {err}");
                        document.rejected.insert(key, value);
                    }
                },
                None => {
                    document.extra.insert(name, value);
                }
            }
        }
        document
    }

    pub fn to_table(&self) -> toml::Table {
        let mut table = self.extra.clone();
        for (key, value) in &self.rejected {
            table.insert(key.name().to_string(), value.clone());
        }
        for (key, value) in &self.values {
            table.insert(key.name().to_string(), value.to_toml());
        }
        table
    }

    /// Value present in the document, if any.
    pub fn get(&self, key: SettingKey) -> Option<&SettingValue> {
        self.values.get(&key)
    }

    /// Value present in the document, falling back to the default.
    pub fn effective(&self, key: SettingKey) -> SettingValue {
        self.get(key).cloned().unwrap_or_else(|| key.default_value())
    }

    pub fn set(&mut self, key: SettingKey, value: SettingValue) {
        self.rejected.remove(&key);
        self.values.insert(key, value);
    }

    /// Recognised keys absent from the document.
    pub fn missing_keys(&self) -> Vec<SettingKey> {
        SettingKey::ALL
            .into_iter()
            .filter(|key| !self.values.contains_key(key) && !self.rejected.contains_key(key))
            .collect()
    }

    /// Recognised keys whose value on disk did not validate.
    pub fn rejected_keys(&self) -> Vec<SettingKey> {
        self.rejected.keys().copied().collect()
    }

    /// Add defaults for every absent recognised key.
    pub fn fill_defaults(&mut self) {
        for key in self.missing_keys() {
            self.values.insert(key, key.default_value());
        }
    }

    pub fn extra(&self) -> &toml::Table {
        &self.extra
    }

    /// Configured engine path, `None` when auto-detection applies.
    pub fn chrome_path(&self) -> Option<&str> {
        match self.values.get(&SettingKey::ChromePath) {
            Some(SettingValue::Text(path)) if !path.is_empty() => Some(path),
            _ => None,
        }
    }
}
