//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: `brass.toml`, `config.toml`
//! - `yaml-config`: `brass.yaml`, `brass.yml`, `config.yaml`, `config.yml`
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic merges ([`ConfigLoader::merge`])
//! 3. Profile-specific file (`brass.{profile}.toml`)
//! 4. Main file (`brass.toml`)
//! 5. Environment variables (`BRASS_*`)
//!
//! # Environment Variable Mapping
//!
//! Nested keys are separated by `__`:
//!
//! - `BRASS_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `BRASS_DISPATCH__MAX_CONCURRENT_HANDLERS=16` → `dispatch.max_concurrent_handlers = 16`
//!
//! `BRASS_PROFILE` picks the profile and is not a configuration key.
//!
//! # Example
//!
//! ```rust,ignore
//! use brass_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("/etc/brass/brass.toml")
//!     .load()?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::BrassConfig;
use super::validation::validate_config;

const ENV_PREFIX: &str = "BRASS_";
const PROFILE_VAR: &str = "BRASS_PROFILE";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    /// Returns the profile name as used in file names.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Reads `BRASS_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_VAR)
            .map(|name| Self::from(name.as_str()))
            .unwrap_or_default()
    }
}

impl From<&str> for Profile {
    fn from(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// File formats
// =============================================================================

/// A configuration file format enabled at compile time.
#[derive(Debug, Clone, Copy)]
enum FileFormat {
    #[cfg(feature = "toml-config")]
    Toml,
    #[cfg(feature = "yaml-config")]
    Yaml,
}

impl FileFormat {
    fn enabled() -> Vec<Self> {
        let mut formats = Vec::new();
        #[cfg(feature = "toml-config")]
        formats.push(Self::Toml);
        #[cfg(feature = "yaml-config")]
        formats.push(Self::Yaml);
        formats
    }

    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(|e| e.to_str())?;
        Self::enabled()
            .into_iter()
            .find(|format| format.extensions().contains(&ext))
    }

    fn extensions(self) -> &'static [&'static str] {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => &["toml"],
            #[cfg(feature = "yaml-config")]
            Self::Yaml => &["yaml", "yml"],
        }
    }

    fn base_names(self) -> &'static [&'static str] {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => &["brass.toml", "config.toml"],
            #[cfg(feature = "yaml-config")]
            Self::Yaml => &["brass.yaml", "brass.yml", "config.yaml", "config.yml"],
        }
    }

    #[allow(unused_variables)]
    fn merge(self, figment: Figment, path: &Path) -> Figment {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => figment.merge(Toml::file(path)),
            #[cfg(feature = "yaml-config")]
            Self::Yaml => figment.merge(Yaml::file(path)),
        }
    }
}

// =============================================================================
// ConfigLoader
// =============================================================================

/// Layered configuration loader.
///
/// Without [`search_path`](Self::search_path) calls, the current directory
/// and the user config directory (`~/.config/brass` on Linux) are searched.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader using the profile from `BRASS_PROFILE`.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::from(profile.as_ref());
        self
    }

    /// Adds a directory to search for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables `BRASS_*` environment variables (the default).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Ignores environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges a configuration on top of the defaults.
    ///
    /// Files and environment variables still override it.
    pub fn merge(mut self, config: BrassConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads, extracts and validates the configuration.
    pub fn load(self) -> ConfigResult<BrassConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: BrassConfig = figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            max_concurrent_handlers = config.dispatch.max_concurrent_handlers,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let user = std::mem::take(&mut self.figment);
        let mut figment = Figment::from(Serialized::defaults(BrassConfig::default())).merge(user);

        figment = match &self.config_file {
            Some(path) => Self::merge_file(figment, path)?,
            None => self.merge_search_results(figment),
        };

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["profile"]).split("__"));
        }
        Ok(figment)
    }

    fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let format = FileFormat::from_path(path).ok_or_else(|| {
            ConfigError::ParseError(format!(
                "unsupported or disabled configuration format: {}",
                path.display()
            ))
        })?;
        info!(path = %path.display(), "Loading configuration file");
        Ok(format.merge(figment, path))
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        std::env::current_dir()
            .ok()
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join("brass")))
            .collect()
    }

    /// Merges the first main file found per enabled format, preceded by its
    /// profile-specific sibling.
    fn merge_search_results(&self, mut figment: Figment) -> Figment {
        let search_paths = self.resolve_search_paths();
        let mut found = false;

        for format in FileFormat::enabled() {
            if let Some(base) = Self::find_base(&search_paths, format) {
                if let Some(profiled) = self.profile_sibling(&base) {
                    debug!(path = %profiled.display(), "Loading profile-specific config");
                    figment = format.merge(figment, &profiled);
                }
                info!(path = %base.display(), "Loading configuration file");
                figment = format.merge(figment, &base);
                found = true;
            }
        }

        if !found {
            warn!("No configuration file found, using defaults");
        }
        figment
    }

    fn find_base(search_paths: &[PathBuf], format: FileFormat) -> Option<PathBuf> {
        search_paths
            .iter()
            .flat_map(|dir| format.base_names().iter().map(move |name| dir.join(name)))
            .find(|path| path.exists())
    }

    /// `brass.toml` → `brass.{profile}.toml`, if it exists.
    fn profile_sibling(&self, base: &Path) -> Option<PathBuf> {
        let stem = base.file_stem()?.to_str()?;
        let ext = base.extension()?.to_str()?;
        let path = base.with_file_name(format!("{stem}.{}.{ext}", self.profile));
        path.exists().then_some(path)
    }
}

// =============================================================================
// Tests
// =============================================================================
