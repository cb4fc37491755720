//! Configuration for dispatch-triage.
//!
//! Sources (highest priority first):
//! 1. Environment variables (DISPATCH_HOME, DISPATCH_INDEX_URL,
//!    DISPATCH_INDEX_API_KEY)
//! 2. Config file (.dispatch/config.yaml, discovered by searching the
//!    current directory and parents)
//! 3. Defaults (~/.dispatch, lexical index, default dedup policy)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::dedup::DedupConfig;
use crate::index::HttpIndexConfig;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub index: Option<IndexConfig>,
    #[serde(default)]
    pub dedup: Option<DedupConfig>,
    #[serde(default)]
    pub queue: Option<QueueConfig>,
    #[serde(default)]
    pub archive: Option<ArchiveConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to the config file's parent)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    /// "memory" (file-backed lexical) or "http" (hosted service)
    pub backend: String,
    #[serde(flatten)]
    pub http: Option<HttpIndexConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub decay_seconds_per_level: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    pub require_transcript: Option<bool>,
}

/// Which similarity backend to construct
#[derive(Debug, Clone)]
pub enum IndexSettings {
    Memory,
    Http(HttpIndexConfig),
}

/// Resolved configuration with absolute paths and full defaults applied
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to the dispatch state directory
    pub home: PathBuf,
    pub index: IndexSettings,
    pub dedup: DedupConfig,
    pub queue_decay_seconds: i64,
    pub require_transcript: bool,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".dispatch").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn resolve_index(file: Option<&IndexConfig>) -> Result<IndexSettings> {
    // Env vars trump the config file entirely
    if let Ok(url) = std::env::var("DISPATCH_INDEX_URL") {
        return Ok(IndexSettings::Http(HttpIndexConfig {
            url,
            api_key: std::env::var("DISPATCH_INDEX_API_KEY").ok(),
            rerank_model: None,
            timeout_seconds: 10,
        }));
    }

    match file {
        Some(config) if config.backend == "http" => {
            let mut http = config
                .http
                .clone()
                .context("index.backend is \"http\" but no url is configured")?;
            if http.api_key.is_none() {
                http.api_key = std::env::var("DISPATCH_INDEX_API_KEY").ok();
            }
            Ok(IndexSettings::Http(http))
        }
        Some(config) if config.backend == "memory" => Ok(IndexSettings::Memory),
        Some(config) => anyhow::bail!("unknown index backend: {}", config.backend),
        None => Ok(IndexSettings::Memory),
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".dispatch");

    let config_file = find_config_file();

    let file = match &config_file {
        Some(path) => Some(load_config_file(path)?),
        None => None,
    };

    let home = if let Ok(env_home) = std::env::var("DISPATCH_HOME") {
        PathBuf::from(env_home)
    } else if let Some(home_path) = file.as_ref().and_then(|f| f.paths.home.as_ref()) {
        // home is relative to the .dispatch/ directory
        let dispatch_dir = config_file
            .as_ref()
            .and_then(|p| p.parent())
            .unwrap_or(Path::new("."));
        resolve_path(dispatch_dir, home_path)
    } else {
        default_home
    };

    let index = resolve_index(file.as_ref().and_then(|f| f.index.as_ref()))?;

    let dedup = file
        .as_ref()
        .and_then(|f| f.dedup.clone())
        .unwrap_or_default();

    let queue_decay_seconds = file
        .as_ref()
        .and_then(|f| f.queue.as_ref())
        .and_then(|q| q.decay_seconds_per_level)
        .unwrap_or(1800);

    let require_transcript = file
        .as_ref()
        .and_then(|f| f.archive.as_ref())
        .and_then(|a| a.require_transcript)
        .unwrap_or(false);

    Ok(ResolvedConfig {
        home,
        index,
        dedup,
        queue_decay_seconds,
        require_transcript,
        config_file,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let dispatch_dir = temp.path().join(".dispatch");
        std::fs::create_dir_all(&dispatch_dir).unwrap();

        let config_path = dispatch_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./
index:
  backend: http
  url: https://index.example.com
  timeout_seconds: 5
dedup:
  score_threshold: 0.70
  time_window_minutes: 45
  fail_open: false
queue:
  decay_seconds_per_level: 900
archive:
  require_transcript: true
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1.0");

        let index = config.index.as_ref().unwrap();
        assert_eq!(index.backend, "http");
        assert_eq!(
            index.http.as_ref().unwrap().url,
            "https://index.example.com"
        );

        let dedup = config.dedup.as_ref().unwrap();
        assert!((dedup.score_threshold - 0.70).abs() < 1e-9);
        assert_eq!(dedup.time_window_minutes, 45);
        assert!(!dedup.fail_open);
        // Unlisted filters keep their defaults
        assert!(dedup.match_incident_type);

        assert_eq!(
            config.queue.unwrap().decay_seconds_per_level,
            Some(900)
        );
        assert_eq!(config.archive.unwrap().require_transcript, Some(true));
    }

    #[test]
    fn test_memory_backend_is_the_default() {
        let settings = resolve_index(None).unwrap();
        assert!(matches!(settings, IndexSettings::Memory));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let config = IndexConfig {
            backend: "quantum".to_string(),
            http: None,
        };
        assert!(resolve_index(Some(&config)).is_err());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
