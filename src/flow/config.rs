// SPDX-License-Identifier: MIT

//! Engine configuration
//!
//! Loaded from YAML (every field optional) and then overridden from the
//! environment:
//!
//! | Variable                              | Field                      |
//! |---------------------------------------|----------------------------|
//! | `TOKENFLOW_PUBLISH_LIFECYCLE_EVENTS`  | `publish_lifecycle_events` |
//! | `TOKENFLOW_DEFAULT_ASSIGNEE`          | `default_assignee`         |
//! | `TOKENFLOW_TRANSPORT`                 | `transport`                |
//! | `TOKENFLOW_EVENT_CAPACITY`            | `event_capacity`           |

use crate::base::error::TokenflowError;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Dispatcher wired between engine and step runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Local,
    /// Envelopes are encoded to JSON text in transit
    Wire,
}

impl FromStr for Transport {
    type Err = TokenflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Transport::Local),
            "wire" => Ok(Transport::Wire),
            other => Err(TokenflowError::config(format!("Unknown transport '{}'", other))),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Local => write!(f, "local"),
            Transport::Wire => write!(f, "wire"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Gates start, complete and fail broadcasts
    pub publish_lifecycle_events: bool,
    /// Subject that receives interaction tasks
    pub default_assignee: String,
    pub event_capacity: usize,
    pub transport: Transport,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            publish_lifecycle_events: true,
            default_assignee: "admin".to_string(),
            event_capacity: 256,
            transport: Transport::Local,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, TokenflowError> {
        let path = path.as_ref();
        log::info!("Loading engine config from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    pub fn parse_yaml(content: &str) -> Result<Self, TokenflowError> {
        let config: EngineConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Apply `TOKENFLOW_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, TokenflowError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, TokenflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("TOKENFLOW_PUBLISH_LIFECYCLE_EVENTS") {
            self.publish_lifecycle_events = parse_bool(&value).ok_or_else(|| {
                TokenflowError::config(format!(
                    "TOKENFLOW_PUBLISH_LIFECYCLE_EVENTS must be a boolean, got '{}'",
                    value
                ))
            })?;
        }
        if let Some(value) = lookup("TOKENFLOW_DEFAULT_ASSIGNEE") {
            if value.trim().is_empty() {
                return Err(TokenflowError::config("TOKENFLOW_DEFAULT_ASSIGNEE is empty"));
            }
            self.default_assignee = value.trim().to_string();
        }
        if let Some(value) = lookup("TOKENFLOW_TRANSPORT") {
            self.transport = value.parse()?;
        }
        if let Some(value) = lookup("TOKENFLOW_EVENT_CAPACITY") {
            self.event_capacity = value.trim().parse().map_err(|_| {
                TokenflowError::config(format!(
                    "TOKENFLOW_EVENT_CAPACITY must be a number, got '{}'",
                    value
                ))
            })?;
        }
        Ok(self)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.publish_lifecycle_events);
        assert_eq!(config.default_assignee, "admin");
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.transport, Transport::Local);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = EngineConfig::parse_yaml("transport: wire\n").unwrap();
        assert_eq!(config.transport, Transport::Wire);
        assert_eq!(config.default_assignee, "admin");
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::default()
            .apply_overrides(overrides(&[
                ("TOKENFLOW_PUBLISH_LIFECYCLE_EVENTS", "off"),
                ("TOKENFLOW_DEFAULT_ASSIGNEE", " clerk "),
                ("TOKENFLOW_TRANSPORT", "WIRE"),
                ("TOKENFLOW_EVENT_CAPACITY", "16"),
            ]))
            .unwrap();
        assert!(!config.publish_lifecycle_events);
        assert_eq!(config.default_assignee, "clerk");
        assert_eq!(config.transport, Transport::Wire);
        assert_eq!(config.event_capacity, 16);
    }

    #[test]
    fn test_bad_env_values() {
        for (key, value) in [
            ("TOKENFLOW_PUBLISH_LIFECYCLE_EVENTS", "maybe"),
            ("TOKENFLOW_TRANSPORT", "carrier-pigeon"),
            ("TOKENFLOW_EVENT_CAPACITY", "lots"),
            ("TOKENFLOW_DEFAULT_ASSIGNEE", "  "),
        ] {
            let result = EngineConfig::default().apply_overrides(overrides(&[(key, value)]));
            assert!(
                matches!(result, Err(TokenflowError::Config(_))),
                "{} = {}",
                key,
                value
            );
        }
    }
}
