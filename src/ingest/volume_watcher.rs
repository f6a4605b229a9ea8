//! Mounted volume watcher.
//!
//! Watches the directory the OS mounts removable volumes under (e.g.
//! `/Volumes` on macOS) and emits a [`VolumeMounted`] event once a new mount
//! point has been present for the stability delay.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur with the watcher
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Volumes directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn default_stability_delay_secs() -> u64 {
    3
}

/// Configuration for the watcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeWatcherConfig {
    /// Directory whose children are mount points
    pub volumes_dir: PathBuf,

    /// How long a mount point must exist before it is reported (seconds)
    #[serde(default = "default_stability_delay_secs")]
    pub stability_delay_secs: u64,
}

impl VolumeWatcherConfig {
    pub fn new(volumes_dir: impl Into<PathBuf>) -> Self {
        Self {
            volumes_dir: volumes_dir.into(),
            stability_delay_secs: default_stability_delay_secs(),
        }
    }

    /// Check if the volumes directory exists
    pub fn validate(&self) -> Result<(), WatcherError> {
        if !self.volumes_dir.is_dir() {
            return Err(WatcherError::DirectoryNotFound(self.volumes_dir.clone()));
        }
        Ok(())
    }
}

/// A volume that appeared and settled
#[derive(Debug, Clone)]
pub struct VolumeMounted {
    /// Mount point of the volume
    pub root: PathBuf,

    /// When the volume was reported
    pub detected_at: DateTime<Utc>,
}

/// Watches for newly mounted volumes
pub struct VolumeWatcher {
    config: VolumeWatcherConfig,
}

impl VolumeWatcher {
    pub fn new(config: VolumeWatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VolumeWatcherConfig {
        &self.config
    }

    /// Start watching. Volumes already mounted at start are not reported.
    pub fn watch(&self) -> Result<(mpsc::Receiver<VolumeMounted>, WatchHandle), WatcherError> {
        self.config.validate()?;

        let known = list_volumes(&self.config.volumes_dir)?;

        let (event_tx, event_rx) = mpsc::channel::<VolumeMounted>(16);
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = run_watcher(config, known, event_tx, &mut stop_rx).await {
                tracing::error!("Volume watcher error: {}", e);
            }
        });

        Ok((
            event_rx,
            WatchHandle {
                stop_tx,
                task: handle,
            },
        ))
    }
}

/// Handle to control the watcher
pub struct WatchHandle {
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    /// Stop the watcher
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop_tx.send(()).await;
        self.task.await?;
        Ok(())
    }
}

/// Visible directories directly under `volumes_dir`
pub fn list_volumes(volumes_dir: &Path) -> std::io::Result<HashSet<PathBuf>> {
    let mut volumes = HashSet::new();

    for entry in std::fs::read_dir(volumes_dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        if entry.path().is_dir() {
            volumes.insert(entry.path());
        }
    }

    Ok(volumes)
}

/// Mount point an event path belongs to: its component directly under
/// `volumes_dir`
fn mount_point(volumes_dir: &Path, path: &Path) -> Option<PathBuf> {
    let relative = path.strip_prefix(volumes_dir).ok()?;
    let first = relative.components().next()?;
    let name = first.as_os_str();
    if name.to_string_lossy().starts_with('.') {
        return None;
    }
    Some(volumes_dir.join(name))
}

async fn run_watcher(
    config: VolumeWatcherConfig,
    mut known: HashSet<PathBuf>,
    event_tx: mpsc::Sender<VolumeMounted>,
    stop_rx: &mut mpsc::Receiver<()>,
) -> Result<()> {
    // Mount points waiting out the stability delay
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    let (tx, rx) = std::sync::mpsc::channel();
    let mut debouncer = new_debouncer(Duration::from_secs(1), tx)?;
    debouncer
        .watcher()
        .watch(&config.volumes_dir, RecursiveMode::NonRecursive)?;

    let stability_delay = Duration::from_secs(config.stability_delay_secs);

    tracing::info!("Watching {} for volumes", config.volumes_dir.display());

    loop {
        if stop_rx.try_recv().is_ok() {
            tracing::info!("Volume watcher stopping...");
            break;
        }

        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(Ok(events)) => {
                for event in events {
                    let Some(root) = mount_point(&config.volumes_dir, &event.path) else {
                        continue;
                    };

                    if root.is_dir() {
                        if !known.contains(&root) && !pending.contains_key(&root) {
                            tracing::debug!("Volume appeared: {}", root.display());
                            pending.insert(root, Instant::now());
                        }
                    } else {
                        // Unmounted: a later mount of the same name is new again
                        known.remove(&root);
                        pending.remove(&root);
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("Watcher error: {:?}", e);
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                tracing::error!("Watcher channel disconnected");
                break;
            }
        }

        let now = Instant::now();
        let settled: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) >= stability_delay)
            .map(|(root, _)| root.clone())
            .collect();

        for root in settled {
            pending.remove(&root);
            if !root.is_dir() {
                continue;
            }

            tracing::info!("Volume mounted: {}", root.display());
            known.insert(root.clone());

            let event = VolumeMounted {
                root,
                detected_at: Utc::now(),
            };
            if event_tx.send(event).await.is_err() {
                // Receiver dropped
                return Ok(());
            }
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_volumes_skips_hidden_and_files() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("RECORDER")).unwrap();
        std::fs::create_dir(temp.path().join(".Trashes")).unwrap();
        std::fs::write(temp.path().join("note.txt"), b"x").unwrap();

        let volumes = list_volumes(temp.path()).unwrap();
        assert_eq!(volumes.len(), 1);
        assert!(volumes.contains(&temp.path().join("RECORDER")));
    }

    #[test]
    fn test_mount_point() {
        let base = Path::new("/Volumes");
        assert_eq!(
            mount_point(base, Path::new("/Volumes/DJI/REC/a.wav")),
            Some(PathBuf::from("/Volumes/DJI"))
        );
        assert_eq!(mount_point(base, Path::new("/Volumes/.hidden")), None);
        assert_eq!(mount_point(base, Path::new("/tmp/x")), None);
    }

    #[test]
    fn test_missing_volumes_dir() {
        let temp = TempDir::new().unwrap();
        let config = VolumeWatcherConfig::new(temp.path().join("missing"));
        assert!(matches!(
            config.validate(),
            Err(WatcherError::DirectoryNotFound(_))
        ));
    }
}
