//! Pipeline configuration.
//!
//! Every field has a default matching the stock project layout, so an empty
//! TOML document (or [`Config::default`]) describes the standard build:
//!
//! ```toml
//! root = "."
//!
//! [styles]
//! inputs = ["static/css/chessboard-0.3.0.css", "static/css/style.css"]
//! output = "static/css/style.min.css"
//! compatibility = "ie8"
//! special_comments = "strip"
//!
//! [script]
//! entry = "src/client.js"
//! output = "static/js/client.min.js"
//! debug = true
//! minify = false
//!
//! [watch]
//! debounce_ms = 100
//! ```

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory every relative path is resolved against.
    pub root: Utf8PathBuf,
    pub styles: StylesConfig,
    pub script: ScriptConfig,
    pub watch: WatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: Utf8PathBuf::from("."),
            styles: StylesConfig::default(),
            script: ScriptConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl Config {
    /// Reads a TOML config file. Missing sections fall back to defaults.
    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_owned(), e))?;

        Self::parse(&text).map_err(|e| ConfigError::Parse(path.to_owned(), e))
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Resolves a configured path against [`Config::root`].
    pub fn resolve(&self, path: impl AsRef<Utf8Path>) -> Utf8PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_owned()
        } else {
            self.root.join(path)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StylesConfig {
    /// Input stylesheets; concatenated in exactly this order.
    pub inputs: Vec<Utf8PathBuf>,
    pub output: Utf8PathBuf,
    pub compatibility: Compatibility,
    pub special_comments: SpecialComments,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            inputs: vec![
                "static/css/chessboard-0.3.0.css".into(),
                "static/css/chessground.css".into(),
                "static/css/cburnett.css".into(),
                "static/css/style.css".into(),
            ],
            output: "static/css/style.min.css".into(),
            compatibility: Compatibility::default(),
            special_comments: SpecialComments::default(),
        }
    }
}

/// The CSS feature subset the minified output has to stay within.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compatibility {
    /// Legacy engines: no `@charset` rule or byte-order mark in any unit.
    #[default]
    Ie8,
    Modern,
}

/// What happens to `/*! ... */` annotations after minification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialComments {
    #[default]
    Strip,
    Keep,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptConfig {
    pub entry: Utf8PathBuf,
    pub output: Utf8PathBuf,
    /// Embed an inline source map.
    pub debug: bool,
    /// Run the bundler's minifier over the bundle.
    pub minify: bool,
    /// Bundler executable.
    pub bundler: String,
    /// Extra paths or globs that trigger a rebuild; empty means the entry alone.
    pub watch: Vec<String>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            entry: "src/client.js".into(),
            output: "static/js/client.min.js".into(),
            debug: true,
            minify: false,
            bundler: "esbuild".into(),
            watch: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Window within which bursts of filesystem events are merged.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}
