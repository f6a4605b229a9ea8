//! Recording group classification.
//!
//! Partitions discovered audio files into logical recordings. Two detectors
//! run over the input:
//!
//! - **Device fragments**: names shaped `<PREFIX>_<seq>_<date>_<time>.<ext>`
//!   are chained by consecutive sequence number when the predecessor hit the
//!   device's split size or the two files were created close together.
//! - **Generic fragments**: everything else is grouped by base name (the stem
//!   with a trailing `_N`, ` N` or `(N)` removed) and merged only when the
//!   base carries a recorder vendor token or the numbers form a tight
//!   ascending sequence.
//!
//! Classification is pure: it only looks at the metadata snapshot held by
//! each [`SourceFile`].

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{RecordingGroup, SourceFile};

static DEVICE_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<prefix>.+?)_(?P<seq>\d{1,3})_(?P<date>\d{8})_(?P<time>\d{6})$")
        .expect("device fragment pattern is valid")
});

static GENERIC_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<base>.*?)(?:_(?P<underscore>\d+)|\s+(?P<space>\d+)|\s*\((?P<paren>\d+)\))$")
        .expect("generic suffix pattern is valid")
});

/// Tunables for grouping. The defaults match the split behaviour of the
/// recorders this was built for and must stay stable for existing archives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Extension of raw recordings (case-insensitive, default: "wav")
    #[serde(default = "default_raw_extension")]
    pub raw_extension: String,

    /// Size at/above which a fragment is a device-imposed split (default: 268 MB)
    #[serde(default = "default_large_file_threshold")]
    pub large_file_threshold_bytes: u64,

    /// Max creation-time distance for chaining fragments (default: 300 s)
    #[serde(default = "default_proximity_window")]
    pub proximity_window_secs: u64,

    /// Vendor tokens that make a generic base name mergeable
    #[serde(default = "default_vendor_tokens")]
    pub vendor_tokens: Vec<String>,
}

fn default_raw_extension() -> String {
    "wav".to_string()
}
fn default_large_file_threshold() -> u64 {
    268_000_000
}
fn default_proximity_window() -> u64 {
    300
}
fn default_vendor_tokens() -> Vec<String> {
    ["dji", "zoom", "tascam", "rode", "sony", "olympus"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            raw_extension: default_raw_extension(),
            large_file_threshold_bytes: default_large_file_threshold(),
            proximity_window_secs: default_proximity_window(),
            vendor_tokens: default_vendor_tokens(),
        }
    }
}

impl ClassifierConfig {
    /// Whether a file name carries the raw-audio extension
    pub fn is_raw_audio(&self, file_name: &str) -> bool {
        std::path::Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(self.raw_extension.trim_start_matches('.')))
            .unwrap_or(false)
    }

    fn has_vendor_token(&self, base_name: &str) -> bool {
        let lower = base_name.to_lowercase();
        self.vendor_tokens
            .iter()
            .any(|token| !token.is_empty() && lower.contains(&token.to_lowercase()))
    }
}

/// Parsed pieces of a device fragment name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceName {
    pub prefix: String,
    pub sequence: u32,
    /// `<date>_<time>` as written by the device
    pub timestamp_key: String,
}

impl DeviceName {
    /// Recording identity with the sequence marker removed
    pub fn base_name(&self) -> String {
        format!("{}_{}", self.prefix, self.timestamp_key)
    }
}

/// Parse a stem shaped `<PREFIX>_<seq>_<date>_<time>`
pub fn parse_device_name(stem: &str) -> Option<DeviceName> {
    let caps = DEVICE_FRAGMENT.captures(stem)?;
    let sequence = caps["seq"].parse().ok()?;

    Some(DeviceName {
        prefix: caps["prefix"].to_string(),
        sequence,
        timestamp_key: format!("{}_{}", &caps["date"], &caps["time"]),
    })
}

/// Split a stem into its base name and trailing number (`_N`, ` N`, `(N)`).
///
/// Stems without such a suffix come back unchanged with no number.
pub fn generic_base_name(stem: &str) -> (String, Option<u32>) {
    if let Some(caps) = GENERIC_SUFFIX.captures(stem) {
        let base = &caps["base"];
        let number = caps
            .name("underscore")
            .or_else(|| caps.name("space"))
            .or_else(|| caps.name("paren"))
            .and_then(|m| m.as_str().parse().ok());

        if !base.is_empty() {
            if let Some(number) = number {
                return (base.to_string(), Some(number));
            }
        }
    }
    (stem.to_string(), None)
}

/// Sequence number encoded in a file name, device pattern first
pub fn parse_sequence(file_name: &str) -> Option<u32> {
    let stem = std::path::Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    parse_device_name(stem)
        .map(|d| d.sequence)
        .or_else(|| generic_base_name(stem).1)
}

/// Group discovered files into logical recordings.
///
/// Deterministic for identical input. Result is sorted by base name, ties
/// broken by the first member's file name.
pub fn group_recordings(files: &[SourceFile], config: &ClassifierConfig) -> Vec<RecordingGroup> {
    let mut device = Vec::new();
    let mut generic = Vec::new();

    for file in files.iter().filter(|f| config.is_raw_audio(&f.file_name)) {
        match parse_device_name(file.stem()) {
            Some(name) => device.push(DeviceFragment {
                file: file.clone(),
                name,
            }),
            None => generic.push(file.clone()),
        }
    }

    let mut groups = group_device_fragments(device, config);
    groups.extend(group_generic(generic, config));

    groups.sort_by(|a, b| {
        a.base_name()
            .cmp(b.base_name())
            .then_with(|| a.first().file_name.cmp(&b.first().file_name))
    });

    debug!(
        input = files.len(),
        groups = groups.len(),
        merged = groups.iter().filter(|g| g.is_merge()).count(),
        "Classified recordings"
    );

    groups
}

#[derive(Debug, Clone)]
struct DeviceFragment {
    file: SourceFile,
    name: DeviceName,
}

/// A device group still accepting continuations, keyed by the
/// `(timestamp_key, sequence)` of the fragment that opened it
struct OpenGroup {
    key: (String, u32),
    members: Vec<DeviceFragment>,
}

impl OpenGroup {
    fn start(fragment: DeviceFragment) -> Self {
        Self {
            key: (fragment.name.timestamp_key.clone(), fragment.name.sequence),
            members: vec![fragment],
        }
    }

    fn last(&self) -> &DeviceFragment {
        // Never empty: created with one member, only ever appended to
        &self.members[self.members.len() - 1]
    }

    fn accepts(&self, candidate: &DeviceFragment, config: &ClassifierConfig) -> bool {
        let last = self.last();
        if last.name.prefix != candidate.name.prefix
            || last.name.sequence + 1 != candidate.name.sequence
        {
            return false;
        }

        if last.file.size >= config.large_file_threshold_bytes {
            return true;
        }

        // Missing creation times only participate through the size clause
        match (last.file.created, candidate.file.created) {
            (Some(a), Some(b)) => {
                (b - a).num_seconds().unsigned_abs() <= config.proximity_window_secs
            }
            _ => false,
        }
    }

    fn into_group(self) -> Option<RecordingGroup> {
        let base = self.members.first()?.name.base_name();
        RecordingGroup::new(base, self.members.into_iter().map(|f| f.file).collect())
    }
}

fn group_device_fragments(
    mut fragments: Vec<DeviceFragment>,
    config: &ClassifierConfig,
) -> Vec<RecordingGroup> {
    fragments.sort_by(|a, b| {
        a.name
            .sequence
            .cmp(&b.name.sequence)
            .then_with(|| a.file.file_name.cmp(&b.file.file_name))
    });

    let present: HashSet<(String, u32)> = fragments
        .iter()
        .map(|f| (f.name.prefix.clone(), f.name.sequence))
        .collect();

    // Greedy first-fit: the most recently opened group that accepts wins
    let mut open: Vec<OpenGroup> = Vec::new();
    for fragment in fragments {
        match open.iter().rposition(|g| g.accepts(&fragment, config)) {
            Some(idx) => {
                debug!(
                    file = %fragment.file.file_name,
                    group = ?open[idx].key,
                    "Fragment continues open group"
                );
                open[idx].members.push(fragment);
            }
            None => open.push(OpenGroup::start(fragment)),
        }
    }

    let mut groups = Vec::new();
    let mut deferred = Vec::new();

    for group in open {
        if group.members.len() >= 2 {
            groups.extend(group.into_group());
            continue;
        }

        let only = &group.members[0];
        let continuation = (only.name.prefix.clone(), only.name.sequence + 1);
        if only.file.size >= config.large_file_threshold_bytes && present.contains(&continuation) {
            deferred.push(group);
        } else {
            groups.extend(group.into_group());
        }
    }

    // A deferred split whose continuation was claimed by another chain is
    // still a recording of its own; never drop it
    for group in deferred {
        debug!(
            file = %group.last().file.file_name,
            "Continuation claimed elsewhere, keeping split fragment standalone"
        );
        groups.extend(group.into_group());
    }

    groups
}

fn group_generic(files: Vec<SourceFile>, config: &ClassifierConfig) -> Vec<RecordingGroup> {
    let mut by_base: BTreeMap<String, Vec<(SourceFile, Option<u32>)>> = BTreeMap::new();
    for file in files {
        let (base, number) = generic_base_name(file.stem());
        by_base.entry(base).or_default().push((file, number));
    }

    let mut groups = Vec::new();
    for (base, entries) in by_base {
        if entries.len() == 1 {
            let files = entries.into_iter().map(|(f, _)| f).collect();
            groups.extend(RecordingGroup::new(base, files));
            continue;
        }

        let numbers: Vec<Option<u32>> = entries.iter().map(|(_, n)| *n).collect();
        if config.has_vendor_token(&base) || is_bounded_sequence(&numbers) {
            let files = entries.into_iter().map(|(f, _)| f).collect();
            groups.extend(RecordingGroup::new(base, files));
        } else {
            debug!(base = %base, files = entries.len(), "Same base name but not sequential, keeping apart");
            for (file, _) in entries {
                groups.extend(RecordingGroup::new(base.clone(), vec![file]));
            }
        }
    }

    groups
}

/// Strictly increasing when sorted, every gap within `1..=10`
fn is_bounded_sequence(numbers: &[Option<u32>]) -> bool {
    let mut values: Vec<u32> = match numbers.iter().copied().collect::<Option<Vec<u32>>>() {
        Some(values) => values,
        None => return false,
    };
    values.sort_unstable();

    values
        .windows(2)
        .all(|pair| (1..=10).contains(&(pair[1] - pair[0])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::path::PathBuf;

    const MB: u64 = 1_000_000;

    fn at(secs: i64) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap() + Duration::seconds(secs))
    }

    fn file(name: &str, size: u64, created: Option<DateTime<Utc>>) -> SourceFile {
        SourceFile::new(PathBuf::from("/Volumes/MIC").join(name), size, created)
    }

    fn names(group: &RecordingGroup) -> Vec<&str> {
        group.members().iter().map(|m| m.file_name.as_str()).collect()
    }

    #[test]
    fn test_parse_device_name() {
        let name = parse_device_name("DJI_01_20250101_100000").unwrap();
        assert_eq!(name.prefix, "DJI");
        assert_eq!(name.sequence, 1);
        assert_eq!(name.timestamp_key, "20250101_100000");
        assert_eq!(name.base_name(), "DJI_20250101_100000");

        let name = parse_device_name("MIC_A_12_20250101_100000").unwrap();
        assert_eq!(name.prefix, "MIC_A");
        assert_eq!(name.sequence, 12);

        assert!(parse_device_name("DJI_20250101_100000").is_none());
        assert!(parse_device_name("REC_1").is_none());
    }

    #[test]
    fn test_generic_base_name() {
        assert_eq!(generic_base_name("REC_3"), ("REC".to_string(), Some(3)));
        assert_eq!(generic_base_name("Interview 12"), ("Interview".to_string(), Some(12)));
        assert_eq!(generic_base_name("Memo (2)"), ("Memo".to_string(), Some(2)));
        assert_eq!(generic_base_name("Memo(2)"), ("Memo".to_string(), Some(2)));
        assert_eq!(generic_base_name("Memo"), ("Memo".to_string(), None));
        assert_eq!(generic_base_name("_7"), ("_7".to_string(), None));
    }

    #[test]
    fn test_non_raw_files_ignored() {
        let files = vec![file("REC_1.mp3", MB, None), file("notes.txt", 10, None)];
        assert!(group_recordings(&files, &ClassifierConfig::default()).is_empty());
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        let files = vec![file("take.WAV", MB, None)];
        assert_eq!(group_recordings(&files, &ClassifierConfig::default()).len(), 1);
    }

    #[test]
    fn test_large_predecessor_chains() {
        let files = vec![
            file("DJI_01_20250101_100000.WAV", 300 * MB, None),
            file("DJI_02_20250101_100512.WAV", 50 * MB, None),
        ];

        let groups = group_recordings(&files, &ClassifierConfig::default());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].base_name(), "DJI_20250101_100000");
        assert_eq!(
            names(&groups[0]),
            vec!["DJI_01_20250101_100000.WAV", "DJI_02_20250101_100512.WAV"]
        );
    }

    #[test]
    fn test_gap_in_sequence_does_not_chain() {
        let files = vec![
            file("DJI_01_20250101_100000.WAV", 300 * MB, None),
            file("DJI_05_20250101_100512.WAV", 50 * MB, None),
        ];

        let groups = group_recordings(&files, &ClassifierConfig::default());
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.len() == 1));
    }

    #[test]
    fn test_proximity_chains_small_fragments() {
        let files = vec![
            file("DJI_01_20250101_100000.WAV", 10 * MB, at(0)),
            file("DJI_02_20250101_100200.WAV", 10 * MB, at(120)),
            file("DJI_03_20250101_110000.WAV", 10 * MB, at(3600)),
        ];

        let groups = group_recordings(&files, &ClassifierConfig::default());
        assert_eq!(groups.len(), 2);

        let merged = groups.iter().find(|g| g.is_merge()).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.first().sequence, Some(1));
    }

    #[test]
    fn test_missing_creation_time_uses_size_only() {
        let files = vec![
            file("DJI_01_20250101_100000.WAV", 10 * MB, None),
            file("DJI_02_20250101_100010.WAV", 10 * MB, at(10)),
        ];

        let groups = group_recordings(&files, &ClassifierConfig::default());
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_most_recent_open_group_wins() {
        // Two large seq-1 fragments, one continuation: first-fit goes to the
        // most recently opened chain, the other split stays standalone
        let files = vec![
            file("DJI_01_20250101_090000.WAV", 300 * MB, None),
            file("DJI_01_20250101_100000.WAV", 300 * MB, None),
            file("DJI_02_20250101_100512.WAV", 10 * MB, None),
        ];

        let groups = group_recordings(&files, &ClassifierConfig::default());
        assert_eq!(groups.len(), 2);

        let merged = groups.iter().find(|g| g.is_merge()).unwrap();
        assert_eq!(merged.base_name(), "DJI_20250101_100000");

        let standalone = groups.iter().find(|g| !g.is_merge()).unwrap();
        assert_eq!(names(standalone), vec!["DJI_01_20250101_090000.WAV"]);
    }

    #[test]
    fn test_terminal_large_file_is_standalone() {
        let files = vec![file("DJI_03_20250101_100000.WAV", 300 * MB, None)];
        let groups = group_recordings(&files, &ClassifierConfig::default());
        assert_eq!(groups.len(), 1);
        assert!(!groups[0].is_merge());
    }

    #[test]
    fn test_generic_sequence_merges() {
        let files = vec![
            file("Lecture_1.wav", MB, None),
            file("Lecture_2.wav", MB, None),
            file("Lecture_4.wav", MB, None),
        ];

        let groups = group_recordings(&files, &ClassifierConfig::default());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].base_name(), "Lecture");
        assert_eq!(groups[0].output_file_name("m4a"), "Lecture_merged.m4a");
    }

    #[test]
    fn test_generic_wide_gap_explodes() {
        let files = vec![file("Lecture_1.wav", MB, None), file("Lecture_40.wav", MB, None)];

        let groups = group_recordings(&files, &ClassifierConfig::default());
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| !g.is_merge()));
    }

    #[test]
    fn test_vendor_token_merges_without_sequence() {
        let files = vec![file("ZOOM0001 (1).wav", MB, None), file("ZOOM0001 (40).wav", MB, None)];

        let groups = group_recordings(&files, &ClassifierConfig::default());
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_merge());
    }

    #[test]
    fn test_unnumbered_same_base_not_merged() {
        let files = vec![file("Memo.wav", MB, None), file("Memo_1.wav", MB, None)];

        let groups = group_recordings(&files, &ClassifierConfig::default());
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_result_sorted_by_base_name() {
        let files = vec![
            file("zeta.wav", MB, None),
            file("Alpha_2.wav", MB, None),
            file("DJI_01_20250101_100000.WAV", MB, None),
            file("Alpha_1.wav", MB, None),
        ];

        let groups = group_recordings(&files, &ClassifierConfig::default());
        let bases: Vec<&str> = groups.iter().map(|g| g.base_name()).collect();
        assert_eq!(bases, vec!["Alpha", "DJI_20250101_100000", "zeta"]);
    }

    #[test]
    fn test_bounded_sequence() {
        assert!(is_bounded_sequence(&[Some(3), Some(1), Some(2)]));
        assert!(is_bounded_sequence(&[Some(1), Some(11)]));
        assert!(!is_bounded_sequence(&[Some(1), Some(12)]));
        assert!(!is_bounded_sequence(&[Some(1), Some(1)]));
        assert!(!is_bounded_sequence(&[Some(1), None]));
    }
}
