//! Configuration for acta paths and policies.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (ACTA_HOME)
//! 2. Config file (.acta/config.yaml)
//! 3. Defaults (~/.acta)
//!
//! Config file discovery:
//! - Searches current directory and parents for .acta/config.yaml
//! - Paths in config file are relative to the config file's parent directory

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::merge::{MergePolicy, DEFAULT_SIMILARITY_THRESHOLD};
use crate::core::orchestrator::RetryPolicy;
use crate::domain::ActionType;
use crate::scoring::{GatePolicy, DEFAULT_ACCEPT_THRESHOLD};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub validation: Option<ValidationConfig>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub extractor: Option<ExtractorConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to config file)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    pub accept_threshold: Option<u8>,
    /// Per-action-type threshold overrides, keyed by type name
    #[serde(default)]
    pub type_thresholds: HashMap<ActionType, u8>,
    pub similarity_threshold: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorConfig {
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub timeout_seconds: Option<u64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to acta home (engine state)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Validation settings
    pub validation: ValidationSettings,
    /// Retry policy for extractor calls
    pub retry: RetryPolicy,
    /// Extractor settings
    pub extractor: ExtractorSettings,
}

#[derive(Debug, Clone)]
pub struct ValidationSettings {
    pub accept_threshold: u8,
    pub type_thresholds: HashMap<ActionType, u8>,
    pub similarity_threshold: f64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            accept_threshold: DEFAULT_ACCEPT_THRESHOLD,
            type_thresholds: HashMap::new(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl ValidationSettings {
    /// Build the gate policy these settings describe
    pub fn gate_policy(&self) -> GatePolicy {
        let mut gate = GatePolicy::new(self.accept_threshold);
        for (action_type, threshold) in &self.type_thresholds {
            gate = gate.with_override(*action_type, *threshold);
        }
        gate
    }

    /// Build the merge policy these settings describe
    pub fn merge_policy(&self) -> MergePolicy {
        MergePolicy::new(self.similarity_threshold)
    }
}

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub command: String,
    pub args: Vec<String>,
    pub timeout_seconds: u64,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            command: "acta-extract".to_string(),
            args: Vec::new(),
            timeout_seconds: 120,
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".acta").join("config.yaml");
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

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    // Default home directory
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".acta");

    // Check for config file
    let config_file = find_config_file();

    let (home, validation, retry, extractor) = if let Some(ref config_path) = config_file {
        // Config file found - use it as base
        let config = load_config_file(config_path)?;

        // Resolve home path
        let home = if let Ok(env_home) = std::env::var("ACTA_HOME") {
            PathBuf::from(env_home)
        } else if let Some(ref home_path) = config.paths.home {
            // home is relative to .acta/ directory
            let acta_dir = config_path.parent().unwrap_or(Path::new("."));
            resolve_path(acta_dir, home_path)
        } else {
            default_home.clone()
        };

        // Validation settings
        let validation = match config.validation {
            Some(v) => ValidationSettings {
                accept_threshold: v.accept_threshold.unwrap_or(DEFAULT_ACCEPT_THRESHOLD),
                type_thresholds: v.type_thresholds,
                similarity_threshold: v
                    .similarity_threshold
                    .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD),
            },
            None => ValidationSettings::default(),
        };

        // Retry policy
        let retry = config.retry.unwrap_or_default();

        // Extractor settings
        let extractor = match config.extractor {
            Some(e) => {
                let defaults = ExtractorSettings::default();
                ExtractorSettings {
                    command: e.command.unwrap_or(defaults.command),
                    args: e.args.unwrap_or(defaults.args),
                    timeout_seconds: e.timeout_seconds.unwrap_or(defaults.timeout_seconds),
                }
            }
            None => ExtractorSettings::default(),
        };

        (home, validation, retry, extractor)
    } else {
        // No config file - use env vars or defaults
        let home = std::env::var("ACTA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home.clone());

        (
            home,
            ValidationSettings::default(),
            RetryPolicy::default(),
            ExtractorSettings::default(),
        )
    };

    Ok(ResolvedConfig {
        home,
        config_file,
        validation,
        retry,
        extractor,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn settings() -> Result<&'static ResolvedConfig> {
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

// ============================================================================
// Convenience functions
// ============================================================================

/// Get the acta home directory (engine state).
pub fn acta_home() -> Result<PathBuf> {
    Ok(settings()?.home.clone())
}

/// Get the recordings directory ($ACTA_HOME/recordings)
pub fn recordings_dir() -> Result<PathBuf> {
    Ok(settings()?.home.join("recordings"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_without_file() {
        // Without a config file or env vars, should use defaults
        let config = load_config().unwrap();

        assert_eq!(config.validation.accept_threshold, DEFAULT_ACCEPT_THRESHOLD);
        assert!(config.validation.type_thresholds.is_empty());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.extractor.timeout_seconds, 120);
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let acta_dir = temp.path().join(".acta");
        std::fs::create_dir_all(&acta_dir).unwrap();

        let config_path = acta_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./
validation:
  accept_threshold: 75
  type_thresholds:
    commitment: 85
  similarity_threshold: 0.5
retry:
  max_attempts: 5
extractor:
  command: my-extractor
  timeout_seconds: 30
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.paths.home, Some("./".to_string()));

        let validation = config.validation.unwrap();
        assert_eq!(validation.accept_threshold, Some(75));
        assert_eq!(
            validation.type_thresholds.get(&ActionType::Commitment),
            Some(&85)
        );
        assert_eq!(validation.similarity_threshold, Some(0.5));

        assert_eq!(config.retry.unwrap().max_attempts, 5);

        let extractor = config.extractor.unwrap();
        assert_eq!(extractor.command, Some("my-extractor".to_string()));
        assert_eq!(extractor.timeout_seconds, Some(30));
    }

    #[test]
    fn test_gate_policy_from_settings() {
        let settings = ValidationSettings {
            accept_threshold: 70,
            type_thresholds: [(ActionType::Commitment, 85)].into_iter().collect(),
            similarity_threshold: 0.6,
        };

        let gate = settings.gate_policy();
        assert_eq!(gate.effective_threshold(ActionType::Commitment), 85);
        assert_eq!(gate.effective_threshold(ActionType::Reminder), 70);

        let merge = settings.merge_policy();
        assert_eq!(merge.similarity_threshold, 0.6);
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "../sibling"),
            PathBuf::from("/home/user/project/../sibling")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
