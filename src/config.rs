use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
#[cfg(feature = "config")]
use std::fs;
#[cfg(feature = "config")]
use std::path::Path;

/// Runtime configuration, usually loaded from a `weft.toml`
///
/// ```toml
/// [template]
/// open = "{{"
/// close = "}}"
///
/// [reactive]
/// max_depth = 4
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub template: TemplateSettings,

    #[serde(default)]
    pub directives: DirectiveSettings,

    #[serde(default)]
    pub reactive: ReactiveConfig,
}

/// Delimiters and token grammar shared by one runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSettings {
    #[serde(default = "default_open")]
    pub open: String,

    #[serde(default = "default_close")]
    pub close: String,

    /// Leading flag character marking a closing token (`[/name]`)
    #[serde(default = "default_close_marker")]
    pub close_marker: char,

    /// Leading flag character reserved for raw output (`[!name]`); parsed but inert
    #[serde(default = "default_raw_flag")]
    pub raw_flag: char,

    /// Regular grammar for a token name, without anchors
    #[serde(default = "default_name_pattern")]
    pub name_pattern: String,

    /// Tag of the element a mounted template renders into
    #[serde(default = "default_container_tag")]
    pub container_tag: String,

    /// Attribute carrying the iteration context identifier
    #[serde(default = "default_context_attr")]
    pub context_attr: String,
}

/// Attribute names the binder consumes from the live tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectiveSettings {
    /// Prefix of event directive attributes (`@click.prevent="save()"`)
    #[serde(default = "default_event_prefix")]
    pub event_prefix: String,

    /// Attribute registering an element into `$refs`
    #[serde(default = "default_ref_attr")]
    pub ref_attr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactiveConfig {
    /// Nesting depth beyond which reads return raw values; unbounded when absent
    #[serde(default)]
    pub max_depth: Option<usize>,

    /// Upper bound on consecutive re-renders triggered from inside a pass
    #[serde(default = "default_max_rerenders")]
    pub max_rerenders: usize,
}

fn default_open() -> String {
    "[".to_string()
}
fn default_close() -> String {
    "]".to_string()
}
fn default_close_marker() -> char {
    '/'
}
fn default_raw_flag() -> char {
    '!'
}
fn default_name_pattern() -> String {
    r"[a-z0-9_$]+(?:\.[a-z0-9_$]+)*".to_string()
}
fn default_container_tag() -> String {
    "div".to_string()
}
fn default_context_attr() -> String {
    "data-ctx".to_string()
}
fn default_event_prefix() -> String {
    "@".to_string()
}
fn default_ref_attr() -> String {
    "#ref".to_string()
}
fn default_max_rerenders() -> usize {
    32
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            open: default_open(),
            close: default_close(),
            close_marker: default_close_marker(),
            raw_flag: default_raw_flag(),
            name_pattern: default_name_pattern(),
            container_tag: default_container_tag(),
            context_attr: default_context_attr(),
        }
    }
}

impl Default for DirectiveSettings {
    fn default() -> Self {
        Self {
            event_prefix: default_event_prefix(),
            ref_attr: default_ref_attr(),
        }
    }
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            max_rerenders: default_max_rerenders(),
        }
    }
}

impl DirectiveSettings {
    pub fn is_event_attr(&self, name: &str) -> bool {
        name.starts_with(&self.event_prefix) && name.len() > self.event_prefix.len()
    }

    /// Attributes the reconciler must leave alone
    pub fn is_binder_owned(&self, name: &str) -> bool {
        self.is_event_attr(name) || name == self.ref_attr
    }
}

impl Config {
    /// Load configuration from TOML file
    #[cfg(feature = "config")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let content = fs::read_to_string(path_ref).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}",
                path_ref.display(),
                e
            ))
        })?;

        let config = Self::from_toml_str(&content).map_err(|e| {
            e.with_context(format!(
                "Failed to load config file '{}'",
                path_ref.display()
            ))
        })?;

        log::debug!(
            "Successfully loaded configuration from: {}",
            path_ref.display()
        );
        Ok(config)
    }

    #[cfg(feature = "config")]
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate delimiters, the name grammar and directive attribute names
    pub fn validate(&self) -> Result<()> {
        let t = &self.template;

        if t.open.is_empty() || t.close.is_empty() {
            return Err(Error::config("Template delimiters cannot be empty"));
        }
        if t.open == t.close {
            return Err(Error::config(format!(
                "Open and close delimiters must differ (both are '{}')",
                t.open
            )));
        }
        if t.close_marker == t.raw_flag {
            return Err(Error::config(
                "Close marker and raw flag must be different characters",
            ));
        }

        Regex::new(&t.name_pattern).map_err(|e| {
            Error::config(format!("Invalid name_pattern '{}': {}", t.name_pattern, e))
        })?;

        for (key, value) in [
            ("container_tag", &t.container_tag),
            ("context_attr", &t.context_attr),
            ("event_prefix", &self.directives.event_prefix),
            ("ref_attr", &self.directives.ref_attr),
        ] {
            if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '=') {
                return Err(Error::config(format!(
                    "'{}' is not a usable attribute or tag name: {:?}",
                    key, value
                )));
            }
        }

        if self.reactive.max_rerenders == 0 {
            return Err(Error::config("reactive.max_rerenders must be at least 1"));
        }

        Ok(())
    }
}
