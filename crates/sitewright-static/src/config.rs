//! Site configuration (sitewright.toml).
//!
//! Every key has a built-in default, so a missing or empty file is valid. The
//! file is read once; the resulting [`SiteConfig`] is immutable and shared by
//! every task.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sitewright_tasks::{GlobGroup, MatchError};

/// Default config file name.
pub const CONFIG_FILE: &str = "sitewright.toml";

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    src: Option<String>,
    dist: Option<String>,
    temp: Option<String>,
    public: Option<String>,
    #[serde(default)]
    paths: PathsFile,
    #[serde(default)]
    server: ServerFile,
    #[serde(default)]
    data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PathsFile {
    styles: Option<Patterns>,
    scripts: Option<Patterns>,
    pages: Option<Patterns>,
    images: Option<Patterns>,
    fonts: Option<Patterns>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ServerFile {
    port: Option<u16>,
    open: Option<bool>,
    host: Option<String>,
    debounce_ms: Option<u64>,
}

/// A single pattern or a list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Patterns {
    One(String),
    Many(Vec<String>),
}

impl From<Patterns> for Vec<String> {
    fn from(patterns: Patterns) -> Self {
        match patterns {
            Patterns::One(p) => vec![p],
            Patterns::Many(p) => p,
        }
    }
}

/// Glob patterns per asset class, relative to their source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPaths {
    pub styles: Vec<String>,
    pub scripts: Vec<String>,
    pub pages: Vec<String>,
    pub images: Vec<String>,
    pub fonts: Vec<String>,
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self {
            styles: vec!["assets/styles/*.scss".to_string()],
            scripts: vec!["assets/scripts/*.js".to_string()],
            pages: vec!["*.html".to_string()],
            images: vec!["assets/images/**".to_string()],
            fonts: vec!["assets/fonts/**".to_string()],
        }
    }
}

/// Development server options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub port: u16,
    pub open: bool,
    pub host: String,
    /// Debounce window for file change bursts
    pub debounce_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 2080,
            open: false,
            host: "127.0.0.1".to_string(),
            debounce_ms: 100,
        }
    }
}

/// Effective configuration for one process.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteConfig {
    /// Project root; every other path is resolved against it
    pub root: PathBuf,
    pub src: PathBuf,
    pub dist: PathBuf,
    pub temp: PathBuf,
    pub public: PathBuf,
    pub paths: AssetPaths,
    pub server: ServerSettings,
    /// Extra template locals
    pub data: serde_json::Map<String, serde_json::Value>,
    /// Production builds skip source maps
    pub production: bool,
}

impl SiteConfig {
    /// Defaults rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            src: root.join("src"),
            dist: root.join("dist"),
            temp: root.join("temp"),
            public: root.join("public"),
            root,
            paths: AssetPaths::default(),
            server: ServerSettings::default(),
            data: serde_json::Map::new(),
            production: false,
        }
    }

    /// Load `path` if it exists and merge it over the defaults.
    ///
    /// The project root is the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let root = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        if !path.exists() {
            tracing::debug!("No {} found, using defaults", path.display());
            return Ok(Self::with_root(root));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config = Self::from_toml(&root, &content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;

        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse TOML `content` and merge it over the defaults rooted at `root`.
    pub fn from_toml(root: &Path, content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;

        let defaults = Self::with_root(root);
        let resolve = |value: Option<String>, default: PathBuf| {
            value.map(|v| root.join(v)).unwrap_or(default)
        };
        let pick = |value: Option<Patterns>, default: Vec<String>| {
            value.map(Vec::from).unwrap_or(default)
        };

        let config = Self {
            src: resolve(file.src, defaults.src),
            dist: resolve(file.dist, defaults.dist),
            temp: resolve(file.temp, defaults.temp),
            public: resolve(file.public, defaults.public),
            paths: AssetPaths {
                styles: pick(file.paths.styles, defaults.paths.styles),
                scripts: pick(file.paths.scripts, defaults.paths.scripts),
                pages: pick(file.paths.pages, defaults.paths.pages),
                images: pick(file.paths.images, defaults.paths.images),
                fonts: pick(file.paths.fonts, defaults.paths.fonts),
            },
            server: ServerSettings {
                port: file.server.port.unwrap_or(defaults.server.port),
                open: file.server.open.unwrap_or(defaults.server.open),
                host: file.server.host.unwrap_or(defaults.server.host),
                debounce_ms: file.server.debounce_ms.unwrap_or(defaults.server.debounce_ms),
            },
            data: file.data,
            root: defaults.root,
            production: false,
        };

        config.validate()?;
        Ok(config)
    }

    /// Toggle production mode.
    pub fn production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Compile every configured pattern so bad globs fail before any task runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (dir, patterns) in [
            (&self.src, &self.paths.styles),
            (&self.src, &self.paths.scripts),
            (&self.src, &self.paths.pages),
            (&self.src, &self.paths.images),
            (&self.src, &self.paths.fonts),
        ] {
            GlobGroup::new(dir, patterns.iter().cloned())?;
        }

        if self.dist == self.temp {
            return Err(ConfigError::Invalid(
                "dist and temp must be different directories".to_string(),
            ));
        }

        // Clean deletes dist and temp, so neither may hold the sources.
        for (label, output) in [("dist", &self.dist), ("temp", &self.temp)] {
            let inputs = [("src", &self.src), ("public", &self.public), ("root", &self.root)];
            for (other, input) in inputs {
                if input.starts_with(output) {
                    return Err(ConfigError::Invalid(format!(
                        "{} ({}) must not contain {} ({})",
                        label,
                        output.display(),
                        other,
                        input.display()
                    )));
                }
            }
        }

        Ok(())
    }

    /// Glob group for `patterns` resolved in `dir`.
    pub fn group(&self, dir: &Path, patterns: &[String]) -> Result<GlobGroup, ConfigError> {
        Ok(GlobGroup::new(dir, patterns.iter().cloned())?)
    }

    /// Directory of template data files.
    pub fn data_dir(&self) -> PathBuf {
        self.src.join("data")
    }
}

/// Production mode as set by the environment.
///
/// The first of `SITEWRIGHT_ENV` and `NODE_ENV` that is set decides; `None`
/// when neither is set, leaving the choice to the command line.
pub fn production_from_env() -> Option<bool> {
    production_from(|key| std::env::var(key).ok())
}

fn production_from(lookup: impl Fn(&str) -> Option<String>) -> Option<bool> {
    ["SITEWRIGHT_ENV", "NODE_ENV"]
        .iter()
        .find_map(|key| lookup(key))
        .map(|value| value.eq_ignore_ascii_case("production"))
}

/// Errors in the site configuration. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Glob(#[from] MatchError),

    #[error(transparent)]
    Registry(#[from] sitewright_tasks::RegistryError),
}
