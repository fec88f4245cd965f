//! Configuration files layered under command line flags
//!
//! A config file maps section names to flag values. Section `core` targets
//! the root command, every other section targets the command of the same
//! name in the current path. Flags given on the command line always win over
//! the file.
//!
//! ```yaml
//! core:
//!   verbose: true
//! tick:
//!   interval: 250ms
//!   count: 3
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::Command;
use crate::container::Container;
use crate::context::Context;
use crate::flags::FlagError;

/// Section name addressing the root command's flags.
pub const CORE_SECTION: &str = "core";

/// Errors that can occur while loading or applying a config file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Unable to read config file {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("Unable to parse YAML config file {path}: {source}")]
    Yaml {
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("Unable to parse JSON config file {path}: {source}")]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("Unknown flag `{flag}` in config section `{section}`")]
    UnknownFlag { section: String, flag: String },
    #[error("Invalid config value for `{section}.{flag}`: {source}")]
    Value {
        section: String,
        flag: String,
        #[source]
        source: FlagError,
    },
}

/// A scalar flag value as written in a config file
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Uint(u) => write!(f, "{u}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::String(s) => f.write_str(s),
        }
    }
}

/// Parsed config file: section name to flag name to value
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct ConfigFile {
    pub sections: BTreeMap<String, BTreeMap<String, Scalar>>,
}

impl ConfigFile {
    /// Loads and parses a config file. Files ending in `.json` are read as
    /// JSON, anything else as YAML. An empty file yields no sections.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if the file does not exist,
    /// `ConfigError::Io` if it cannot be read, or
    /// `ConfigError::Yaml`/`ConfigError::Json` if parsing fails.
    pub fn from_file(file: &Path) -> Result<ConfigFile, ConfigError> {
        if !file.exists() {
            return Err(ConfigError::NotFound(file.to_path_buf()));
        }
        let contents = std::fs::read_to_string(file).map_err(|e| ConfigError::Io {
            source: e,
            path: file.to_path_buf(),
        })?;
        if contents.trim().is_empty() {
            return Ok(ConfigFile::default());
        }
        let config = if file.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents).map_err(|e| ConfigError::Json {
                source: e,
                path: file.to_path_buf(),
            })?
        } else {
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Yaml {
                source: e,
                path: file.to_path_buf(),
            })?
        };
        debug!("Loaded config file {}", file.display());
        Ok(config)
    }

    /// Set flags of every command in the path from the matching section.
    ///
    /// Flags already set explicitly are left alone. Sections naming commands
    /// that are not in the path are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownFlag` if a section names a flag its
    /// command does not define, or `ConfigError::Value` if a value does not
    /// parse as the flag's type.
    pub fn apply(&self, ctx: &mut Context<'_>) -> Result<(), ConfigError> {
        for (index, (name, flags)) in ctx.flag_sets_mut().enumerate() {
            let section_name = if index == 0 { CORE_SECTION } else { name };
            let Some(section) = self.sections.get(section_name) else {
                continue;
            };
            for (flag, value) in section {
                if flags.lookup(flag).is_none() {
                    return Err(ConfigError::UnknownFlag {
                        section: section_name.to_string(),
                        flag: flag.clone(),
                    });
                }
                if flags.is_set(flag) {
                    debug!("{section_name}.{flag} given on the command line, keeping it");
                    continue;
                }
                flags
                    .set(flag, &value.to_string())
                    .map_err(|source| ConfigError::Value {
                        section: section_name.to_string(),
                        flag: flag.clone(),
                        source,
                    })?;
            }
        }
        Ok(())
    }
}

/// Wrap `command` so the config file at `path` is applied before it runs.
///
/// Wrapping the target (deepest) command means the file is applied once,
/// after every command in the path has defined and parsed its flags. A
/// missing file is treated as empty.
pub fn with_config(command: impl Command + 'static, path: impl Into<PathBuf>) -> Container {
    let path = path.into();
    Container::new(command).with_run(move |inner, ctx, args| {
        match ConfigFile::from_file(&path) {
            Ok(config) => config.apply(ctx)?,
            Err(ConfigError::NotFound(path)) => {
                debug!("No config file at {}, using flags only", path.display());
            }
            Err(e) => return Err(e.into()),
        }
        inner.run(ctx, args)
    })
}
