//! Audio codec interface.
//!
//! The core never decodes or encodes audio itself. It talks to an
//! [`AudioCodec`] that can probe files, and export either a single file or
//! an ordered concatenation ([`Timeline`]) into the target format.

pub mod ffmpeg;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::domain::OutputFormat;

// Re-export the ffmpeg codec
pub use ffmpeg::FfmpegCodec;

/// Description of a decodable audio track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    /// Stream index within the container
    pub index: usize,

    /// Codec name as reported by the prober (e.g. "pcm_s24le")
    pub codec: String,

    /// Sample rate in Hz (if known)
    pub sample_rate: Option<u32>,

    /// Channel count (if known)
    pub channels: Option<u16>,
}

impl AudioTrack {
    /// True for uncompressed PCM tracks
    pub fn is_pcm(&self) -> bool {
        self.codec.starts_with("pcm_")
    }
}

/// One member handed to [`AudioCodec::concatenate`]
#[derive(Debug, Clone)]
pub struct TimelinePart {
    pub source: PathBuf,
    pub track: Option<AudioTrack>,
    pub duration: Duration,
}

/// A placed segment of a timeline
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineSegment {
    pub source: PathBuf,
    pub track: AudioTrack,
    /// Offset of this segment from the start of the timeline
    pub start: Duration,
    pub duration: Duration,
}

/// Ordered concatenation of audio segments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    segments: Vec<TimelineSegment>,
}

impl Timeline {
    /// Append parts in order at the running end-of-timeline cursor.
    ///
    /// Parts without a decodable track are skipped and contribute no duration.
    pub fn concatenate(parts: Vec<TimelinePart>) -> Self {
        let mut segments = Vec::with_capacity(parts.len());
        let mut cursor = Duration::ZERO;

        for part in parts {
            let Some(track) = part.track else {
                warn!(file = %part.source.display(), "No decodable audio track, skipping segment");
                continue;
            };

            segments.push(TimelineSegment {
                source: part.source,
                track,
                start: cursor,
                duration: part.duration,
            });
            cursor += part.duration;
        }

        Self { segments }
    }

    pub fn segments(&self) -> &[TimelineSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Sum of segment durations
    pub fn total_duration(&self) -> Duration {
        self.segments.iter().map(|s| s.duration).sum()
    }

    /// True when the segments can be joined by stream copy: every track is
    /// PCM with the same codec, sample rate and channel count
    pub fn is_uniform_pcm(&self) -> bool {
        let Some(first) = self.segments.first() else {
            return false;
        };
        let reference = &first.track;

        reference.is_pcm()
            && self.segments.iter().all(|s| {
                s.track.codec == reference.codec
                    && s.track.sample_rate == reference.sample_rate
                    && s.track.channels == reference.channels
            })
    }
}

/// What to export
#[derive(Debug, Clone)]
pub enum ExportSource {
    /// Transcode a single file
    File(PathBuf),

    /// Render a concatenation
    Timeline(Timeline),
}

/// Trait for audio codec backends
#[async_trait]
pub trait AudioCodec: Send + Sync {
    /// Human-readable codec name
    fn name(&self) -> &str;

    /// Playback duration of a file
    async fn load_duration(&self, path: &Path) -> Result<Duration>;

    /// First decodable audio track, or `None` when the file has none
    async fn load_audio_track(&self, path: &Path) -> Result<Option<AudioTrack>>;

    /// Build an ordered concatenation of parts
    fn concatenate(&self, parts: Vec<TimelinePart>) -> Timeline {
        Timeline::concatenate(parts)
    }

    /// Write `source` to `destination` in `format`
    async fn export(
        &self,
        source: &ExportSource,
        destination: &Path,
        format: OutputFormat,
    ) -> Result<()>;
}
