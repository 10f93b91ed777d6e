//! Configuration sources and resolution for termhost.
//!
//! This module provides:
//! - [`TerminalConfig`]: the options a caller sets explicitly
//! - [`NamedSettings`]: process-level settings, usually loaded from
//!   `~/.termhost/terminal.toml`
//! - [`Environment`]: environment variables (real or synthetic)
//! - [`EffectiveSettings::resolve`]: merges the three into one fully
//!   resolved configuration
//!
//! # Configuration File
//!
//! ```toml
//! # Input/output encoding
//! encoding = "UTF-8"
//!
//! # Windows console codepage
//! codepage = 65001
//!
//! # Terminal type reported to applications
//! type = "xterm-256color"
//!
//! # Backend toggles; leave unset for the default
//! crossterm = true
//! sys = true
//! exec = false
//!
//! # Fall back to a dumb terminal when no backend works
//! dumb = true
//! ```
//!
//! Every key can also be given as an environment variable with a
//! `TERMHOST_` prefix (`TERMHOST_ENCODING`, `TERMHOST_EXEC`, ...). The terminal
//! type additionally falls back to `TERM`.
//!
//! # Priority
//!
//! explicit caller value > named setting > environment > default

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::attributes::{Attributes, Size};
use crate::core::terminal::SignalHandler;
use crate::decoder::Charset;

/// Setting keys shared by named settings and the environment
pub mod keys {
    pub const ENCODING: &str = "encoding";
    pub const CODEPAGE: &str = "codepage";
    pub const TYPE: &str = "type";
    pub const CROSSTERM: &str = "crossterm";
    pub const SYS: &str = "sys";
    pub const EXEC: &str = "exec";
    pub const DUMB: &str = "dumb";

    /// Ambient terminal type
    pub const TERM: &str = "TERM";

    /// Environment variable carrying a named key
    pub fn env_var(key: &str) -> String {
        format!("TERMHOST_{}", key.to_ascii_uppercase())
    }
}

/// Default terminal name
pub const DEFAULT_NAME: &str = "termhost terminal";

/// Terminal type used when nothing else is known
pub const TYPE_DUMB: &str = "dumb";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A read-only key/value source
pub trait SettingSource {
    fn get(&self, key: &str) -> Option<String>;
}

impl SettingSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl SettingSource for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}

/// Process-level named settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedSettings {
    values: BTreeMap<String, String>,
}

impl NamedSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `~/.termhost/terminal.toml`; empty when missing or broken
    pub fn load() -> Self {
        let Some(path) = Self::get_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => {
                debug!("Loaded named settings from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("Ignoring named settings: {}", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a flat TOML table. Scalars of any type are kept as strings so
    /// that malformed values are diagnosed during resolution.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        #[serde(transparent)]
        struct Raw(BTreeMap<String, toml::Value>);

        let Raw(raw) = toml::from_str(content)?;
        let mut settings = Self::new();
        for (key, value) in raw {
            let text = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                other => {
                    warn!("Ignoring setting {}: unsupported value {}", key, other.type_str());
                    continue;
                }
            };
            settings.set(key, text);
        }
        Ok(settings)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder-style [`set`](Self::set)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".termhost").join("terminal.toml"))
    }
}

impl SettingSource for NamedSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Environment variables, either the process environment or a fixed map
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: Option<HashMap<String, String>>,
}

impl Environment {
    /// The process environment
    pub fn system() -> Self {
        Self { vars: None }
    }

    /// A synthetic environment
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: Some(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }
}

impl SettingSource for Environment {
    fn get(&self, key: &str) -> Option<String> {
        match &self.vars {
            Some(vars) => vars.get(key).cloned(),
            None => std::env::var(key).ok(),
        }
    }
}

/// Caller-supplied input and output streams
pub struct Streams {
    pub input: Box<dyn Read + Send>,
    pub output: Box<dyn Write + Send>,
}

impl fmt::Debug for Streams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Streams { .. }")
    }
}

/// Explicit caller options. Unset fields are resolved from the other sources.
#[derive(Debug, Default)]
pub struct TerminalConfig {
    pub name: Option<String>,
    pub streams: Option<Streams>,
    pub term_type: Option<String>,
    pub encoding: Option<String>,
    /// Zero or negative means unset
    pub codepage: i32,
    pub system: Option<bool>,
    pub crossterm: Option<bool>,
    pub sys: Option<bool>,
    pub exec: Option<bool>,
    pub dumb: Option<bool>,
    /// Only used for non-system terminals
    pub attributes: Option<Attributes>,
    /// Only used for non-system terminals
    pub size: Option<Size>,
    pub native_signals: bool,
    pub signal_handler: SignalHandler,
}

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Explicit,
    Named,
    Environment,
    Default,
}

/// Fully resolved configuration for one negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSettings {
    pub name: String,
    pub charset: Charset,
    pub term_type: String,
    pub type_origin: Origin,
    pub codepage: Option<u32>,
    pub crossterm: bool,
    pub sys: bool,
    pub exec: bool,
    /// Kept tri-state: an unset flag changes how the fallback is reported
    pub dumb: Option<bool>,
    pub native_signals: bool,
}

impl EffectiveSettings {
    /// Merge explicit options, named settings and environment. Never fails:
    /// unusable values are reported and skipped.
    pub fn resolve(
        explicit: &TerminalConfig,
        named: &dyn SettingSource,
        env: &dyn SettingSource,
    ) -> Self {
        let name = explicit
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_NAME.to_string());

        let codepage = if explicit.codepage > 0 {
            Some(explicit.codepage as u32)
        } else {
            candidates(None, keys::CODEPAGE, named, env)
                .into_iter()
                .find_map(|(value, origin)| match value.trim().parse::<u32>() {
                    Ok(cp) if cp > 0 => Some(cp),
                    _ => {
                        warn!("Invalid codepage {:?} from {:?} setting, ignoring", value, origin);
                        None
                    }
                })
        };

        let charset = candidates(explicit.encoding.as_deref(), keys::ENCODING, named, env)
            .into_iter()
            .find_map(|(value, origin)| {
                let charset = Charset::for_label(&value);
                if charset.is_none() {
                    warn!("Unsupported encoding {:?} from {:?} setting, ignoring", value, origin);
                }
                charset
            })
            // A console codepage implies the byte encoding when none is named
            .or_else(|| codepage.and_then(Charset::for_codepage))
            .unwrap_or_else(|| platform_charset(env));

        let mut types = candidates(explicit.term_type.as_deref(), keys::TYPE, named, env);
        if let Some(term) = env.get(keys::TERM) {
            let term = term.trim();
            if !term.is_empty() {
                types.push((term.to_string(), Origin::Environment));
            }
        }
        let (term_type, type_origin) = types
            .into_iter()
            .next()
            .unwrap_or_else(|| (TYPE_DUMB.to_string(), Origin::Default));

        Self {
            name,
            charset,
            term_type,
            type_origin,
            codepage,
            crossterm: flag(explicit.crossterm, keys::CROSSTERM, named, env).unwrap_or(true),
            sys: flag(explicit.sys, keys::SYS, named, env).unwrap_or(true),
            exec: flag(explicit.exec, keys::EXEC, named, env).unwrap_or(true),
            dumb: flag(explicit.dumb, keys::DUMB, named, env),
            native_signals: explicit.native_signals,
        }
    }
}

/// Trimmed, non-empty values for `key` in priority order
fn candidates(
    explicit: Option<&str>,
    key: &str,
    named: &dyn SettingSource,
    env: &dyn SettingSource,
) -> Vec<(String, Origin)> {
    let sources = [
        (explicit.map(str::to_string), Origin::Explicit),
        (named.get(key), Origin::Named),
        (env.get(&keys::env_var(key)), Origin::Environment),
    ];
    sources
        .into_iter()
        .filter_map(|(value, origin)| Some((value?.trim().to_string(), origin)))
        .filter(|(value, _)| !value.is_empty())
        .collect()
}

fn flag(
    explicit: Option<bool>,
    key: &str,
    named: &dyn SettingSource,
    env: &dyn SettingSource,
) -> Option<bool> {
    explicit.or_else(|| {
        candidates(None, key, named, env)
            .into_iter()
            .find_map(|(value, origin)| {
                let parsed = parse_bool(&value);
                if parsed.is_none() {
                    warn!("Invalid boolean {:?} for {} from {:?} setting, ignoring", value, key, origin);
                }
                parsed
            })
    })
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Charset named by the locale (`en_US.ISO-8859-1@euro`), UTF-8 otherwise
fn platform_charset(env: &dyn SettingSource) -> Charset {
    let locale = ["LC_ALL", "LC_CTYPE", "LANG"]
        .iter()
        .find_map(|var| env.get(var).filter(|v| !v.is_empty()));

    locale
        .as_deref()
        .and_then(|l| l.split_once('.'))
        .map(|(_, rest)| rest.split('@').next().unwrap_or(rest))
        .and_then(Charset::for_label)
        .unwrap_or(Charset::Utf8)
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}
