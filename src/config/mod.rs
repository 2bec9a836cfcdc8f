use std::collections::HashSet;
use std::fs;

use log::{debug, trace, LevelFilter};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use validator::{Validate, ValidationError};

use crate::action::CacheOptions;
use crate::config_error;
use crate::core::ActResult;

#[derive(Default, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Config::validate_action_names"))]
pub struct Config {
    #[validate(nested)]
    pub log: Option<Log>,

    #[serde(default)]
    #[validate(nested)]
    pub transaction_id: TransactionId,

    #[serde(default)]
    #[validate(nested)]
    pub compose: Compose,

    #[serde(default)]
    #[validate(nested)]
    pub actions: Vec<Action>,
}

// Config file load and validation
impl Config {
    pub fn load_from_yaml<P>(path: P) -> ActResult<Self>
    where
        P: AsRef<std::path::Path> + std::fmt::Display,
    {
        let conf_str = fs::read_to_string(&path).map_err(|e| {
            config_error!("Unable to read conf file from {path}: {e}")
        })?;
        debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    pub fn from_yaml(conf_str: &str) -> ActResult<Self> {
        trace!("Read conf file: {conf_str}");
        let conf: Config = serde_yaml::from_str(conf_str)
            .map_err(|e| config_error!("Unable to parse yaml conf: {e}"))?;

        trace!("Loaded conf: {conf:?}");

        // use validator to validate conf file
        conf.validate()
            .map_err(|e| config_error!("Conf file validation failed: {e}"))?;

        Ok(conf)
    }

    pub fn to_yaml(&self) -> ActResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn validate_action_names(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for action in &self.actions {
            if !seen.insert(action.name.as_str()) {
                return Err(ValidationError::new("duplicate_action_name"));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Log {
    #[validate(length(min = 1))]
    pub path: String,
    #[serde(default = "Log::default_level")]
    #[validate(custom(function = "Log::validate_level"))]
    pub level: String,
}

impl Log {
    fn default_level() -> String {
        "info".to_string()
    }

    fn validate_level(level: &String) -> Result<(), ValidationError> {
        level
            .parse::<LevelFilter>()
            .map(|_| ())
            .map_err(|_| ValidationError::new("invalid_log_level"))
    }

    pub fn level_filter(&self) -> LevelFilter {
        self.level.parse().unwrap_or(LevelFilter::Info)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxAlgorithm {
    #[default]
    Uuid,
    RangeId,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate)]
pub struct TransactionId {
    #[serde(default)]
    pub algorithm: TxAlgorithm,
    #[serde(default)]
    #[validate(nested)]
    pub range_id: RangeId,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct RangeId {
    #[serde(default = "RangeId::default_char_set")]
    #[validate(length(min = 1))]
    pub char_set: String,
    #[serde(default = "RangeId::default_length")]
    #[validate(range(min = 1, max = 256))]
    pub length: u32,
}

impl RangeId {
    pub fn default_char_set() -> String {
        "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789".to_string()
    }

    pub fn default_length() -> u32 {
        16
    }
}

impl Default for RangeId {
    fn default() -> Self {
        Self {
            char_set: Self::default_char_set(),
            length: Self::default_length(),
        }
    }
}

/// Reserved keys recognized inside composition contexts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Compose::validate_distinct"))]
pub struct Compose {
    #[serde(default = "Compose::default_resolve_key")]
    #[validate(length(min = 1))]
    pub resolve_key: String,
    #[serde(default = "Compose::default_marker_suffix")]
    #[validate(length(min = 1))]
    pub marker_suffix: String,
}

impl Compose {
    fn default_resolve_key() -> String {
        "$resolve".to_string()
    }

    fn default_marker_suffix() -> String {
        "$".to_string()
    }

    fn validate_distinct(&self) -> Result<(), ValidationError> {
        if self.resolve_key == self.marker_suffix {
            Err(ValidationError::new("resolve_key_equals_marker_suffix"))
        } else {
            Ok(())
        }
    }
}

impl Default for Compose {
    fn default() -> Self {
        Self {
            resolve_key: Self::default_resolve_key(),
            marker_suffix: Self::default_marker_suffix(),
        }
    }
}

/// An action bound when the gateway starts
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Action {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(custom(function = "Action::validate_pattern"))]
    pub pattern: JsonValue,
    #[validate(nested)]
    pub cache: Option<CacheOptions>,
}

impl Action {
    fn validate_pattern(pattern: &JsonValue) -> Result<(), ValidationError> {
        match pattern {
            JsonValue::Object(_) | JsonValue::String(_) => Ok(()),
            _ => Err(ValidationError::new("pattern_must_be_object_or_string")),
        }
    }
}
