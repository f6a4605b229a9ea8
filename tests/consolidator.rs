//! Consolidator Integration Tests
//!
//! Tests for single-file export, multi-file merges, retry behaviour and
//! original-file handling.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{all_entries, write_file, FakeCodec};
use reclift::core::{AudioConsolidator, IngestError, MAX_EXPORT_ATTEMPTS};
use reclift::domain::{OutputFormat, ProcessingOptions, RecordingGroup, SourceFile};
use tempfile::TempDir;

fn consolidator(codec: &Arc<FakeCodec>) -> AudioConsolidator {
    AudioConsolidator::new(codec.clone()).with_retry_delay(Duration::from_millis(5))
}

async fn group(base: &str, paths: &[std::path::PathBuf]) -> RecordingGroup {
    let mut members = Vec::new();
    for path in paths {
        members.push(SourceFile::from_path(path).await.unwrap());
    }
    RecordingGroup::new(base, members).unwrap()
}

#[tokio::test]
async fn test_export_retries_once_and_leaves_no_partial() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let path = write_file(src.path(), "REC_2.wav", 1000, 7);

    let codec = Arc::new(FakeCodec::failing(1));
    let group = group("REC", &[path.clone()]).await;

    let out = consolidator(&codec)
        .consolidate(&group, dest.path(), &ProcessingOptions::default())
        .await
        .unwrap();

    assert_eq!(codec.export_calls(), 2);
    assert_eq!(out.path, dest.path().join("REC_2.m4a"));
    assert!(!out.merged);
    assert_eq!(all_entries(dest.path()), vec!["REC_2.m4a"]);
    assert_eq!(std::fs::read(&out.path).unwrap(), vec![7u8; 1000]);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_export_gives_up_after_two_attempts() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let path = write_file(src.path(), "REC_2.wav", 1000, 7);

    // Would succeed on a third attempt, which must never happen
    let codec = Arc::new(FakeCodec::failing(2));
    let group = group("REC", &[path.clone()]).await;

    let result = consolidator(&codec)
        .consolidate(&group, dest.path(), &ProcessingOptions::default())
        .await;

    match result {
        Err(IngestError::ExportFailed {
            attempts, message, ..
        }) => {
            assert_eq!(attempts, MAX_EXPORT_ATTEMPTS);
            assert!(message.contains("encoder crashed"));
        }
        other => panic!("expected ExportFailed, got {:?}", other),
    }

    assert_eq!(codec.export_calls(), 2);
    assert!(all_entries(dest.path()).is_empty());
    assert!(path.exists(), "source must survive a failed export");
}

#[tokio::test]
async fn test_merge_concatenates_in_member_order() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let first = write_file(src.path(), "DJI_01_20250101_100000.WAV", 300, 1);
    let second = write_file(src.path(), "DJI_02_20250101_100512.WAV", 200, 2);

    let codec = Arc::new(FakeCodec::new());
    // Deliberately passed out of order; the group sorts its members
    let group = group("DJI_20250101_100000", &[second.clone(), first.clone()]).await;

    let out = consolidator(&codec)
        .consolidate(&group, dest.path(), &ProcessingOptions::default())
        .await
        .unwrap();

    assert!(out.merged);
    assert_eq!(out.members, 2);
    assert_eq!(out.path, dest.path().join("DJI_20250101_100000_merged.m4a"));
    assert_eq!(out.duration, Some(Duration::from_millis(500)));

    let mut expected = vec![1u8; 300];
    expected.extend(vec![2u8; 200]);
    assert_eq!(std::fs::read(&out.path).unwrap(), expected);

    assert!(!first.exists());
    assert!(!second.exists());
}

#[tokio::test]
async fn test_merge_rejects_member_without_track() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let a = write_file(src.path(), "Memo (1).wav", 100, 1);
    let b = write_file(src.path(), "Memo (2).wav", 100, 2);

    let codec = Arc::new(FakeCodec::new().without_track("Memo (2).wav"));
    let group = group("Memo", &[a.clone(), b.clone()]).await;
    let consolidator = consolidator(&codec);

    let err = consolidator.validate_for_merge(&group).await.unwrap_err();
    assert!(matches!(err, IngestError::InvalidInputFile(ref p) if p == &b));

    let result = consolidator
        .consolidate(&group, dest.path(), &ProcessingOptions::default())
        .await;
    assert!(matches!(result, Err(IngestError::InvalidInputFile(_))));
    assert_eq!(codec.export_calls(), 0);
    assert!(a.exists() && b.exists());
}

#[tokio::test]
async fn test_merge_rejects_member_without_duration() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let a = write_file(src.path(), "DJI_01_20250101_100000.WAV", 200, 1);
    let b = write_file(src.path(), "DJI_02_20250101_100512.WAV", 50, 2);

    let codec = Arc::new(FakeCodec::new().without_duration("DJI_02_20250101_100512.WAV"));
    let group = group("DJI_20250101_100000", &[a.clone(), b.clone()]).await;

    let result = consolidator(&codec)
        .consolidate(&group, dest.path(), &ProcessingOptions::default())
        .await;

    assert!(matches!(result, Err(IngestError::InvalidInputFile(ref p)) if p == &b));
    assert_eq!(codec.export_calls(), 0);
    assert!(all_entries(dest.path()).is_empty());
    assert!(a.exists() && b.exists());
}

#[tokio::test]
async fn test_preserve_originals_keeps_members() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let a = write_file(src.path(), "Memo (1).wav", 100, 1);
    let b = write_file(src.path(), "Memo (2).wav", 100, 2);

    let codec = Arc::new(FakeCodec::new());
    let group = group("Memo", &[a.clone(), b.clone()]).await;
    let options = ProcessingOptions {
        preserve_originals: true,
        ..ProcessingOptions::default()
    };

    let out = consolidator(&codec)
        .consolidate(&group, dest.path(), &options)
        .await
        .unwrap();

    assert!(out.path.exists());
    assert!(a.exists() && b.exists());
}

#[tokio::test]
async fn test_target_format_single_is_moved_without_transcode() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let path = write_file(src.path(), "take.wav", 640, 9);

    let codec = Arc::new(FakeCodec::new());
    let group = group("take", &[path.clone()]).await;
    let options = ProcessingOptions {
        output_format: OutputFormat::Wav,
        ..ProcessingOptions::default()
    };

    let out = consolidator(&codec)
        .consolidate(&group, dest.path(), &options)
        .await
        .unwrap();

    assert_eq!(codec.export_calls(), 0);
    assert_eq!(out.path, dest.path().join("take.wav"));
    assert_eq!(std::fs::read(&out.path).unwrap(), vec![9u8; 640]);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_target_format_single_is_copied_when_preserving() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let path = write_file(src.path(), "take.wav", 640, 9);

    let codec = Arc::new(FakeCodec::new());
    let group = group("take", &[path.clone()]).await;
    let options = ProcessingOptions {
        output_format: OutputFormat::Wav,
        preserve_originals: true,
        ..ProcessingOptions::default()
    };

    let out = consolidator(&codec)
        .consolidate(&group, dest.path(), &options)
        .await
        .unwrap();

    assert_eq!(codec.export_calls(), 0);
    assert!(path.exists());
    assert_eq!(all_entries(dest.path()), vec!["take.wav"]);
    assert_eq!(std::fs::read(&out.path).unwrap(), vec![9u8; 640]);
}

#[tokio::test]
async fn test_existing_output_is_never_overwritten() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    write_file(dest.path(), "REC_2.m4a", 3, 0);
    write_file(dest.path(), "REC_2_1.m4a", 3, 0);
    let path = write_file(src.path(), "REC_2.wav", 50, 4);

    let codec = Arc::new(FakeCodec::new());
    let group = group("REC", &[path]).await;

    let out = consolidator(&codec)
        .consolidate(&group, dest.path(), &ProcessingOptions::default())
        .await
        .unwrap();

    assert_eq!(out.path, dest.path().join("REC_2_2.m4a"));
    assert_eq!(std::fs::read(dest.path().join("REC_2.m4a")).unwrap(), vec![0u8; 3]);
    assert_eq!(
        all_entries(dest.path()),
        vec!["REC_2.m4a", "REC_2_1.m4a", "REC_2_2.m4a"]
    );
}
