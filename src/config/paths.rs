//! Canonical paths for reclift state.
//!
//! Single source of truth - import this instead of hardcoding paths.
//!
//! | Location | Purpose |
//! |----------|---------|
//! | `~/.reclift/config.yaml` | User-level configuration |
//! | `~/.reclift/jobs.jsonl` | Job journal |
//! | `~/.reclift/ingest.lock` | Single-job lock |

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Name of the state directory
pub const STATE_DIR: &str = ".reclift";

/// Name of the config file inside the state directory
pub const CONFIG_FILE: &str = "config.yaml";

const JOURNAL_FILE: &str = "jobs.jsonl";
const LOCK_FILE: &str = "ingest.lock";

/// Default home directory (~/.reclift)
pub fn default_home() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(STATE_DIR))
}

/// Job journal inside `home`
pub fn journal(home: &Path) -> PathBuf {
    home.join(JOURNAL_FILE)
}

/// Job lock file inside `home`
pub fn job_lock(home: &Path) -> PathBuf {
    home.join(LOCK_FILE)
}

/// Where the OS mounts removable volumes
#[cfg(target_os = "macos")]
pub fn default_volumes_dir() -> PathBuf {
    PathBuf::from("/Volumes")
}

/// Where the OS mounts removable volumes
#[cfg(not(target_os = "macos"))]
pub fn default_volumes_dir() -> PathBuf {
    let media = PathBuf::from("/media");
    match std::env::var("USER") {
        Ok(user) if media.join(&user).is_dir() => media.join(user),
        _ => media,
    }
}
