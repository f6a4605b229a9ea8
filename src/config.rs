//! Configuration for reclift.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags (applied by the CLI on top of the resolved config)
//! 2. Environment variables (RECLIFT_HOME, RECLIFT_DESTINATION)
//! 3. Config file (.reclift/config.yaml, else ~/.reclift/config.yaml)
//! 4. Defaults (~/.reclift)
//!
//! Config file discovery:
//! - Searches current directory and parents for .reclift/config.yaml
//! - Paths in config file are relative to the project root (the parent of .reclift/)
//!
//! The resolved configuration is a plain value handed to the pipeline; there
//! is no process-wide cached copy.

pub mod paths;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::{ClassifierConfig, IngestError, TransferSettings};
use crate::domain::ProcessingOptions;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub processing: ProcessingOptions,
    #[serde(default)]
    pub grouping: ClassifierConfig,
    #[serde(default)]
    pub transfer: TransferSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (journal, lock)
    pub home: Option<String>,
    /// Folder consolidated recordings are written to
    pub destination: Option<String>,
    /// Directory whose children are mounted volumes
    pub volumes_dir: Option<String>,
}

/// Values taken from the environment
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub home: Option<String>,
    pub destination: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            home: std::env::var("RECLIFT_HOME").ok(),
            destination: std::env::var("RECLIFT_DESTINATION").ok(),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to reclift home (state)
    pub home: PathBuf,
    /// Destination folder, if configured
    pub destination: Option<PathBuf>,
    /// Directory watched for mounted volumes
    pub volumes_dir: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub processing: ProcessingOptions,
    pub grouping: ClassifierConfig,
    pub transfer: TransferSettings,
}

impl ResolvedConfig {
    /// Destination folder, or a configuration error when none is set
    pub fn destination(&self) -> Result<&Path, IngestError> {
        self.destination.as_deref().ok_or_else(|| {
            IngestError::ConfigurationError(
                "No destination folder configured (set paths.destination or RECLIFT_DESTINATION)"
                    .to_string(),
            )
        })
    }

    /// Job journal path ($RECLIFT_HOME/jobs.jsonl)
    pub fn journal_path(&self) -> PathBuf {
        paths::journal(&self.home)
    }

    /// Job lock path ($RECLIFT_HOME/ingest.lock)
    pub fn lock_path(&self) -> PathBuf {
        paths::job_lock(&self.home)
    }
}

/// Find config file by searching `start` and its parents, then the user's home
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(paths::STATE_DIR).join(paths::CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    let user_config = paths::default_home().ok()?.join(paths::CONFIG_FILE);
    user_config.exists().then_some(user_config)
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's project root
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

/// Combine file contents, environment and defaults
fn resolve(
    config_path: Option<PathBuf>,
    file: ConfigFile,
    env: &EnvOverrides,
    default_home: PathBuf,
) -> ResolvedConfig {
    // Base directory is the parent of .reclift/ (i.e., grandparent of config.yaml)
    let base_dir = config_path
        .as_deref()
        .and_then(|p| p.parent())
        .and_then(|p| p.parent())
        .unwrap_or(Path::new("."))
        .to_path_buf();

    let home = match (&env.home, &file.paths.home) {
        (Some(env_home), _) => PathBuf::from(env_home),
        (None, Some(home)) => resolve_path(&base_dir, home),
        (None, None) => default_home,
    };

    let destination = match (&env.destination, &file.paths.destination) {
        (Some(env_dest), _) => Some(PathBuf::from(env_dest)),
        (None, Some(dest)) => Some(resolve_path(&base_dir, dest)),
        (None, None) => None,
    };

    let volumes_dir = file
        .paths
        .volumes_dir
        .as_deref()
        .map(|dir| resolve_path(&base_dir, dir))
        .unwrap_or_else(paths::default_volumes_dir);

    ResolvedConfig {
        home,
        destination,
        volumes_dir,
        config_file: config_path,
        processing: file.processing,
        grouping: file.grouping,
        transfer: file.transfer,
    }
}

/// Load configuration, discovering the config file from `start_dir`
pub fn load_config_from(start_dir: &Path) -> Result<ResolvedConfig> {
    let config_path = find_config_file(start_dir);

    let file = match &config_path {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    Ok(resolve(
        config_path,
        file,
        &EnvOverrides::from_env(),
        paths::default_home()?,
    ))
}

/// Load configuration from all sources, starting at the current directory
pub fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_from(&cwd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OutputFormat;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(temp: &TempDir, body: &str) -> PathBuf {
        let state_dir = temp.path().join(".reclift");
        std::fs::create_dir_all(&state_dir).unwrap();

        let config_path = state_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "{}", body).unwrap();
        config_path
    }

    #[test]
    fn test_defaults_without_file() {
        let resolved = resolve(
            None,
            ConfigFile::default(),
            &EnvOverrides::default(),
            PathBuf::from("/home/u/.reclift"),
        );

        assert_eq!(resolved.home, PathBuf::from("/home/u/.reclift"));
        assert!(resolved.destination.is_none());
        assert!(resolved.destination().is_err());
        assert_eq!(resolved.processing, ProcessingOptions::default());
        assert_eq!(resolved.grouping.large_file_threshold_bytes, 268_000_000);
        assert_eq!(resolved.grouping.proximity_window_secs, 300);
        assert_eq!(resolved.journal_path(), PathBuf::from("/home/u/.reclift/jobs.jsonl"));
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(
            &temp,
            r#"
version: "1.0"
paths:
  destination: ./recordings
processing:
  output_format: wav
  small_file_threshold_bytes: 1024
grouping:
  proximity_window_secs: 120
transfer:
  verify_checksums: true
"#,
        );

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version.as_deref(), Some("1.0"));
        assert_eq!(config.processing.output_format, OutputFormat::Wav);
        assert_eq!(config.processing.small_file_threshold_bytes, 1024);
        assert!(config.processing.merge_enabled);
        assert_eq!(config.grouping.proximity_window_secs, 120);
        assert_eq!(config.grouping.raw_extension, "wav");
        assert!(config.transfer.verify_checksums);
        assert_eq!(config.transfer.verify_delay_ms, 100);

        let resolved = resolve(
            Some(config_path),
            config,
            &EnvOverrides::default(),
            PathBuf::from("/unused"),
        );
        assert_eq!(
            resolved.destination.unwrap(),
            temp.path().join("recordings")
        );
    }

    #[test]
    fn test_env_overrides_file() {
        let file = ConfigFile {
            paths: PathsConfig {
                home: Some("/from/file".to_string()),
                destination: Some("/from/file/out".to_string()),
                volumes_dir: Some("/mnt".to_string()),
            },
            ..ConfigFile::default()
        };
        let env = EnvOverrides {
            home: Some("/from/env".to_string()),
            destination: Some("/from/env/out".to_string()),
        };

        let resolved = resolve(None, file, &env, PathBuf::from("/unused"));
        assert_eq!(resolved.home, PathBuf::from("/from/env"));
        assert_eq!(resolved.destination, Some(PathBuf::from("/from/env/out")));
        assert_eq!(resolved.volumes_dir, PathBuf::from("/mnt"));
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(&temp, "version: \"1.0\"");
        let nested = temp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config_file(&nested), Some(config_path));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
