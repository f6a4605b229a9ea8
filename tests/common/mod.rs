//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reclift::adapters::{AudioCodec, AudioTrack, ExportSource};
use reclift::domain::OutputFormat;

/// Scripted codec: exports write the source bytes (concatenated for
/// timelines) and can be told to fail a number of times first
#[derive(Default)]
pub struct FakeCodec {
    failures_left: AtomicU32,
    export_calls: AtomicU32,
    leave_partial: bool,
    trackless: Mutex<HashSet<String>>,
    unmeasurable: Mutex<HashSet<String>>,
}

impl FakeCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` exports, writing a truncated file each time
    pub fn failing(n: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(n),
            leave_partial: true,
            ..Self::default()
        }
    }

    /// Report no audio track for `file_name`
    pub fn without_track(self, file_name: &str) -> Self {
        self.trackless.lock().unwrap().insert(file_name.to_string());
        self
    }

    /// Fail duration probes for `file_name`
    pub fn without_duration(self, file_name: &str) -> Self {
        self.unmeasurable.lock().unwrap().insert(file_name.to_string());
        self
    }

    pub fn export_calls(&self) -> u32 {
        self.export_calls.load(Ordering::SeqCst)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

#[async_trait]
impl AudioCodec for FakeCodec {
    fn name(&self) -> &str {
        "fake"
    }

    async fn load_duration(&self, path: &Path) -> Result<Duration> {
        if self.unmeasurable.lock().unwrap().contains(&file_name(path)) {
            anyhow::bail!("unreadable header");
        }
        // One millisecond per byte keeps durations easy to predict
        let len = tokio::fs::metadata(path).await?.len();
        Ok(Duration::from_millis(len))
    }

    async fn load_audio_track(&self, path: &Path) -> Result<Option<AudioTrack>> {
        if self.trackless.lock().unwrap().contains(&file_name(path)) {
            return Ok(None);
        }
        Ok(Some(AudioTrack {
            index: 0,
            codec: "pcm_s24le".to_string(),
            sample_rate: Some(48_000),
            channels: Some(2),
        }))
    }

    async fn export(
        &self,
        source: &ExportSource,
        destination: &Path,
        _format: OutputFormat,
    ) -> Result<()> {
        self.export_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            if self.leave_partial {
                tokio::fs::write(destination, b"trunc").await?;
            }
            anyhow::bail!("encoder crashed");
        }

        let sources: Vec<PathBuf> = match source {
            ExportSource::File(path) => vec![path.clone()],
            ExportSource::Timeline(timeline) => {
                timeline.segments().iter().map(|s| s.source.clone()).collect()
            }
        };

        let mut bytes = Vec::new();
        for path in sources {
            bytes.extend(tokio::fs::read(&path).await?);
        }
        tokio::fs::write(destination, bytes).await?;
        Ok(())
    }
}

/// Write `size` bytes of `fill` to `dir/name`
pub fn write_file(dir: &Path, name: &str, size: usize, fill: u8) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, vec![fill; size]).unwrap();
    path
}

/// Visible entries of a directory, sorted
pub fn visible_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    names
}

/// Every entry of a directory, hidden ones included, sorted
pub fn all_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
