//! ffmpeg-backed audio codec.
//!
//! Shells out to `ffprobe` for probing and `ffmpeg` for exporting.
//! Timelines are rendered through the concat demuxer.

use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::{AudioCodec, AudioTrack, ExportSource, Timeline};
use crate::domain::OutputFormat;

/// AAC bitrate for compressed output
const AAC_BITRATE: &str = "256k";

/// Audio codec using the ffmpeg command-line tools
pub struct FfmpegCodec {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl Default for FfmpegCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegCodec {
    /// Create a codec using `FFMPEG_PATH`/`FFPROBE_PATH` or the binaries on `PATH`
    pub fn new() -> Self {
        Self {
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: std::env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
        }
    }

    /// Create a codec with explicit binary paths
    pub fn with_paths(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    async fn probe(&self, path: &Path, args: &[&str]) -> Result<ProbeOutput> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error", "-of", "json"])
            .args(args)
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run ffprobe on {}", path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffprobe failed for {}: {}", path.display(), stderr.trim());
        }

        serde_json::from_slice(&output.stdout).context("Failed to parse ffprobe JSON")
    }

    async fn run_ffmpeg(&self, args: Vec<String>) -> Result<()> {
        let output = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to run ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!("ffmpeg failed with exit code {}: {}", exit_code, stderr.trim());
        }

        Ok(())
    }
}

/// Subset of ffprobe's JSON output
#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: usize,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    sample_rate: Option<String>,
    #[serde(default)]
    channels: Option<u16>,
}

/// Encoder arguments for a target format
fn codec_args(format: OutputFormat, keep_pcm: bool) -> Vec<String> {
    let args: &[&str] = match format {
        OutputFormat::Wav if keep_pcm => &["-c:a", "copy", "-f", "wav"],
        OutputFormat::Wav => &["-c:a", "pcm_s16le", "-f", "wav"],
        OutputFormat::Aac => &[
            "-c:a",
            "aac",
            "-b:a",
            AAC_BITRATE,
            "-movflags",
            "+faststart",
            "-f",
            "ipod",
        ],
    };
    args.iter().map(|s| s.to_string()).collect()
}

/// Seconds as printed by ffprobe; rejects values no `Duration` can hold
fn parse_duration(raw: &str) -> Result<Duration> {
    let seconds: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration from ffprobe: {}", raw))?;

    Duration::try_from_secs_f64(seconds.max(0.0))
        .with_context(|| format!("Duration out of range: {}", raw))
}

/// Concat demuxer list for a timeline
fn concat_list(timeline: &Timeline) -> String {
    let mut list = String::from("ffconcat version 1.0\n");
    for segment in timeline.segments() {
        // Single quotes inside a quoted path are written as '\''
        let path = segment.source.to_string_lossy().replace('\'', r"'\''");
        list.push_str(&format!("file '{}'\n", path));
        list.push_str(&format!("duration {:.6}\n", segment.duration.as_secs_f64()));
    }
    list
}

#[async_trait]
impl AudioCodec for FfmpegCodec {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn load_duration(&self, path: &Path) -> Result<Duration> {
        let probe = self.probe(path, &["-show_entries", "format=duration"]).await?;

        let raw = probe
            .format
            .and_then(|f| f.duration)
            .with_context(|| format!("No duration reported for {}", path.display()))?;

        parse_duration(&raw)
    }

    async fn load_audio_track(&self, path: &Path) -> Result<Option<AudioTrack>> {
        let probe = self
            .probe(
                path,
                &[
                    "-select_streams",
                    "a",
                    "-show_entries",
                    "stream=index,codec_name,sample_rate,channels",
                ],
            )
            .await?;

        Ok(probe.streams.into_iter().next().map(|s| AudioTrack {
            index: s.index,
            codec: s.codec_name.unwrap_or_default(),
            sample_rate: s.sample_rate.and_then(|r| r.parse().ok()),
            channels: s.channels,
        }))
    }

    async fn export(
        &self,
        source: &ExportSource,
        destination: &Path,
        format: OutputFormat,
    ) -> Result<()> {
        let destination = destination.to_string_lossy().to_string();

        match source {
            ExportSource::File(path) => {
                let mut args = vec![
                    "-i".to_string(),
                    path.to_string_lossy().to_string(),
                    "-vn".to_string(),
                ];
                args.extend(codec_args(format, false));
                args.push(destination);
                self.run_ffmpeg(args).await
            }
            ExportSource::Timeline(timeline) => {
                if timeline.is_empty() {
                    anyhow::bail!("Cannot export an empty timeline");
                }

                let mut list_file = tempfile::Builder::new()
                    .prefix("reclift-concat-")
                    .suffix(".txt")
                    .tempfile()
                    .context("Failed to create concat list")?;
                list_file
                    .write_all(concat_list(timeline).as_bytes())
                    .context("Failed to write concat list")?;
                list_file.flush()?;

                let mut args = vec![
                    "-f".to_string(),
                    "concat".to_string(),
                    "-safe".to_string(),
                    "0".to_string(),
                    "-i".to_string(),
                    list_file.path().to_string_lossy().to_string(),
                    "-vn".to_string(),
                ];
                args.extend(codec_args(format, timeline.is_uniform_pcm()));
                args.push(destination);

                // list_file lives until ffmpeg has exited
                self.run_ffmpeg(args).await
            }
        }
    }
}
