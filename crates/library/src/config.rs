use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

const DEFAULT_FORMATS: &[&str] = &["mp3", "ogg", "oga", "flac", "wav", "opus", "m4a"];

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub basedir: String,
    pub transcode: bool,
    pub supported_formats: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            basedir: String::new(),
            transcode: false,
            supported_formats: DEFAULT_FORMATS.iter().map(|ext| ext.to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub maxresults: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { maxresults: 20 }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Listings longer than this are folded into prefix groups; 0 disables it.
    pub max_show_files: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub version: u32,
    pub media: MediaConfig,
    pub search: SearchConfig,
    pub browser: BrowserConfig,
    pub index_path: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            media: MediaConfig::default(),
            search: SearchConfig::default(),
            browser: BrowserConfig::default(),
            index_path: "library.redb".to_string(),
        }
    }
}

/// The validated, read-only view of [`LibraryConfig`] a model runs against.
#[derive(Clone, Debug)]
pub struct ModelSettings {
    pub basedir: PathBuf,
    pub transcode: bool,
    pub maxresults: usize,
    pub supported_formats: HashSet<String>,
    pub max_show_files: usize,
}

impl ModelSettings {
    pub fn from_config(config: &LibraryConfig) -> Result<Self, ConfigError> {
        let basedir = config.media.basedir.trim();
        if basedir.is_empty() {
            return Err(ConfigError::MissingBasedir);
        }
        if config.search.maxresults == 0 {
            return Err(ConfigError::InvalidMaxResults);
        }
        Ok(Self {
            basedir: PathBuf::from(basedir),
            transcode: config.media.transcode,
            maxresults: config.search.maxresults,
            supported_formats: normalize_formats(&config.media.supported_formats),
            max_show_files: config.browser.max_show_files,
        })
    }
}

pub fn normalize_formats<S: AsRef<str>>(formats: &[S]) -> HashSet<String> {
    formats
        .iter()
        .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    MissingBasedir,
    InvalidMaxResults,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
            ConfigError::MissingBasedir => write!(f, "media.basedir is not configured"),
            ConfigError::InvalidMaxResults => {
                write!(f, "search.maxresults must be a positive number")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("TRACKCACHE_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(LibraryConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: LibraryConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.index_path.trim().is_empty() {
            config.index_path = "library.redb".to_string();
        }
        return Ok((config, false));
    }

    let config = LibraryConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &LibraryConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_basedir_is_fatal() {
        let config = LibraryConfig::default();
        assert!(matches!(
            ModelSettings::from_config(&config),
            Err(ConfigError::MissingBasedir)
        ));
    }

    #[test]
    fn zero_maxresults_is_fatal() {
        let mut config = LibraryConfig::default();
        config.media.basedir = "/music".to_string();
        config.search.maxresults = 0;
        assert!(matches!(
            ModelSettings::from_config(&config),
            Err(ConfigError::InvalidMaxResults)
        ));
    }

    #[test]
    fn non_numeric_maxresults_fails_to_parse() {
        let yaml = "media:\n  basedir: /music\nsearch:\n  maxresults: lots\n";
        assert!(serde_yaml::from_str::<LibraryConfig>(yaml).is_err());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "media:\n  basedir: /music\n  transcode: true\n";
        let config: LibraryConfig = serde_yaml::from_str(yaml).unwrap();
        let settings = ModelSettings::from_config(&config).unwrap();
        assert_eq!(settings.basedir, PathBuf::from("/music"));
        assert!(settings.transcode);
        assert_eq!(settings.maxresults, 20);
        assert!(settings.supported_formats.contains("mp3"));
        assert_eq!(settings.max_show_files, 0);
    }

    #[test]
    fn formats_are_normalized() {
        let formats = normalize_formats(&[".MP3", " ogg ", ""]);
        assert_eq!(formats.len(), 2);
        assert!(formats.contains("mp3"));
        assert!(formats.contains("ogg"));
    }

    #[test]
    fn creates_default_config_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("config.yaml");

        let (_, created) = load_or_create_config(&path).unwrap();
        assert!(created);

        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.index_path, "library.redb");
    }

    #[test]
    fn resolves_relative_to_config_dir() {
        let config_path = Path::new("/etc/trackcache/config.yaml");
        assert_eq!(
            resolve_path(config_path, "library.redb"),
            PathBuf::from("/etc/trackcache/library.redb")
        );
        assert_eq!(
            resolve_path(config_path, "/var/lib/index.redb"),
            PathBuf::from("/var/lib/index.redb")
        );
    }
}
