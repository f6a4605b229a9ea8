//! Per-job processing options.

use serde::{Deserialize, Serialize};

/// Output container/codec for consolidated recordings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Lossless PCM in a WAV container
    Wav,

    /// AAC in an MPEG-4 audio container
    Aac,
}

impl OutputFormat {
    /// File extension (without dot) for this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Aac => "m4a",
        }
    }

    /// True when a file with this extension needs no transcode
    pub fn matches_extension(&self, extension: &str) -> bool {
        extension
            .trim_start_matches('.')
            .eq_ignore_ascii_case(self.extension())
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Aac
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wav => write!(f, "wav"),
            Self::Aac => write!(f, "aac"),
        }
    }
}

/// Configuration snapshot for one ingestion job.
///
/// Passed by value into the pipeline and never mutated while a job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    /// Reconstruct split recordings (default: true)
    #[serde(default = "default_true")]
    pub merge_enabled: bool,

    /// Physically delete recordings under the threshold (default: true)
    #[serde(default = "default_true")]
    pub delete_small_files: bool,

    /// Small-file threshold in bytes (default: 5 MiB)
    #[serde(default = "default_small_file_threshold")]
    pub small_file_threshold_bytes: u64,

    /// Output format (default: AAC)
    #[serde(default)]
    pub output_format: OutputFormat,

    /// Keep the source files instead of retiring them (default: false)
    #[serde(default)]
    pub preserve_originals: bool,
}

fn default_true() -> bool {
    true
}

fn default_small_file_threshold() -> u64 {
    5 * 1024 * 1024
} // 5 MiB

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            merge_enabled: true,
            delete_small_files: true,
            small_file_threshold_bytes: default_small_file_threshold(),
            output_format: OutputFormat::default(),
            preserve_originals: false,
        }
    }
}
