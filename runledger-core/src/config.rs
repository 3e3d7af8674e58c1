// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the history stores.
//!
//! Configuration is always passed in explicitly: there is no discovery of
//! config files and nothing is read from the environment. Built-in defaults
//! come from an embedded TOML document, and an optional file can override any
//! subset of them.

use crate::errors::ConfigError;
use camino::Utf8Path;
use serde::Deserialize;
use std::{collections::BTreeSet, io, num::NonZero};
use tracing::{debug, warn};

/// Specifies where to load configuration from.
#[derive(Clone, Copy, Debug)]
pub enum ConfigLocation<'a> {
    /// Use only the built-in defaults.
    Isolated,

    /// Load configuration from an explicit path.
    ///
    /// Returns an error if the file does not exist.
    Explicit(&'a Utf8Path),
}

/// Resolved configuration for both history stores.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LedgerConfig {
    /// Configuration for the JSON history directory.
    pub history: StoreConfig,

    /// Configuration for the trend workbook.
    pub workbook: StoreConfig,
}

/// Resolved configuration for one history store.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StoreConfig {
    /// Whether runs are recorded into this store.
    pub enabled: bool,

    /// The number of runs retained in this store.
    pub max_runs: NonZero<usize>,
}

impl LedgerConfig {
    /// Loads configuration from the given location.
    pub fn load(location: ConfigLocation<'_>) -> Result<Self, ConfigError> {
        Self::load_with_warnings(location, &mut DefaultConfigWarnings)
    }

    fn load_with_warnings(
        location: ConfigLocation<'_>,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigError> {
        let defaults = DefaultLedgerConfig::from_embedded();
        let overrides = match location {
            ConfigLocation::Isolated => {
                debug!("config: using built-in defaults");
                DeserializedLedgerConfig::default()
            }
            ConfigLocation::Explicit(path) => DeserializedLedgerConfig::from_path(path, warnings)?,
        };

        Ok(Self {
            history: StoreConfig::resolve(&defaults.history, &overrides.history),
            workbook: StoreConfig::resolve(&defaults.workbook, &overrides.workbook),
        })
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let defaults = DefaultLedgerConfig::from_embedded();
        Self {
            history: StoreConfig::from_default(&defaults.history),
            workbook: StoreConfig::from_default(&defaults.workbook),
        }
    }
}

impl StoreConfig {
    fn from_default(default: &DefaultStoreConfig) -> Self {
        Self {
            enabled: default.enabled,
            max_runs: default.max_runs,
        }
    }

    fn resolve(default: &DefaultStoreConfig, overrides: &DeserializedStoreConfig) -> Self {
        Self {
            enabled: overrides.enabled.unwrap_or(default.enabled),
            max_runs: overrides.max_runs.unwrap_or(default.max_runs),
        }
    }
}

/// Trait for handling configuration warnings.
///
/// The default implementation logs them; tests collect them instead.
trait ConfigWarnings {
    /// Handle unknown configuration keys found in a config file.
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>);
}

struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
        let keys = unknown.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
        warn!("in config file {config_file}, ignoring unknown configuration keys: {keys}");
    }
}

/// Configuration as written in a file; every field is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedLedgerConfig {
    #[serde(default)]
    history: DeserializedStoreConfig,

    #[serde(default)]
    workbook: DeserializedStoreConfig,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedStoreConfig {
    #[serde(default)]
    enabled: Option<bool>,

    #[serde(default)]
    max_runs: Option<NonZero<usize>>,
}

impl DeserializedLedgerConfig {
    fn from_path(path: &Utf8Path, warnings: &mut impl ConfigWarnings) -> Result<Self, ConfigError> {
        debug!("config: loading from {path}");
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::FileNotFound {
                    path: path.to_owned(),
                });
            }
            Err(error) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    error,
                });
            }
        };

        let (config, unknown) =
            Self::deserialize_toml(&contents).map_err(|error| ConfigError::Parse {
                path: path.to_owned(),
                error,
            })?;

        if !unknown.is_empty() {
            warnings.unknown_config_keys(path, &unknown);
        }

        Ok(config)
    }

    /// Deserializes TOML content and returns the config along with any unknown keys.
    fn deserialize_toml(contents: &str) -> Result<(Self, BTreeSet<String>), toml::de::Error> {
        let deserializer = toml::Deserializer::parse(contents)?;
        let mut unknown = BTreeSet::new();
        let config: DeserializedLedgerConfig = serde_ignored::deserialize(deserializer, |path| {
            unknown.insert(path.to_string());
        })?;
        Ok((config, unknown))
    }
}

/// Default configuration with all values required.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct DefaultLedgerConfig {
    history: DefaultStoreConfig,
    workbook: DefaultStoreConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct DefaultStoreConfig {
    enabled: bool,
    max_runs: NonZero<usize>,
}

impl DefaultLedgerConfig {
    const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Parses the embedded default config.
    ///
    /// Panics if the embedded TOML is invalid, since it ships with this crate.
    fn from_embedded() -> Self {
        toml::from_str(Self::DEFAULT_CONFIG).expect("embedded default config should be valid")
    }
}
