//! Tests for folder validation.

use std::fs;
use std::path::Path;

use crate::item::{AssetKind, RequiredAsset};

use super::{AssetDefect, AssetValidator, ValidationIoError, ValidationPolicy};

fn required() -> Vec<RequiredAsset> {
    vec![
        RequiredAsset {
            kind: AssetKind::Primary,
            filename: "v1.mp4".to_string(),
        },
        RequiredAsset {
            kind: AssetKind::Metadata,
            filename: "v1.json".to_string(),
        },
        RequiredAsset {
            kind: AssetKind::Preview,
            filename: "v1.jpg".to_string(),
        },
    ]
}

fn mp4_bytes(len: usize) -> Vec<u8> {
    let mut v = b"\x00\x00\x00\x18ftypmp42".to_vec();
    v.resize(len, 0xAB);
    v
}

fn jpeg_bytes(len: usize) -> Vec<u8> {
    let mut v = b"\xFF\xD8\xFF\xE0".to_vec();
    v.resize(len, 0x11);
    v
}

fn write_complete(dir: &Path) {
    fs::write(dir.join("v1.mp4"), mp4_bytes(4096)).unwrap();
    fs::write(dir.join("v1.json"), br#"{"id":"v1","title":"clip"}"#).unwrap();
    fs::write(dir.join("v1.jpg"), jpeg_bytes(512)).unwrap();
}

#[test]
fn complete_folder_passes() {
    let dir = tempfile::tempdir().unwrap();
    write_complete(dir.path());
    let v = AssetValidator::default()
        .validate(dir.path(), &required())
        .unwrap();
    assert!(v.complete);
    assert!(v.missing.is_empty());
}

#[test]
fn absent_folder_reports_everything_missing_without_error() {
    let dir = tempfile::tempdir().unwrap();
    let v = AssetValidator::default()
        .validate(&dir.path().join("nope"), &required())
        .unwrap();
    assert!(!v.complete);
    assert_eq!(
        v.missing,
        vec![AssetKind::Primary, AssetKind::Metadata, AssetKind::Preview]
    );
}

#[test]
fn missing_primary_is_listed() {
    let dir = tempfile::tempdir().unwrap();
    write_complete(dir.path());
    fs::remove_file(dir.path().join("v1.mp4")).unwrap();
    let v = AssetValidator::default()
        .validate(dir.path(), &required())
        .unwrap();
    assert!(!v.complete);
    assert_eq!(v.missing, vec![AssetKind::Primary]);
    assert!(v.is_missing_file("v1.mp4"));
    assert_eq!(v.problems[0].defect, AssetDefect::Absent);
}

#[test]
fn small_or_unmarked_primary_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_complete(dir.path());
    fs::write(dir.path().join("v1.mp4"), mp4_bytes(100)).unwrap();
    let v = AssetValidator::default()
        .validate(dir.path(), &required())
        .unwrap();
    assert!(matches!(
        v.problems[0].defect,
        AssetDefect::TooSmall { size: 100, min: 1024 }
    ));

    fs::write(dir.path().join("v1.mp4"), vec![0u8; 4096]).unwrap();
    let v = AssetValidator::default()
        .validate(dir.path(), &required())
        .unwrap();
    assert_eq!(v.problems[0].defect, AssetDefect::NoFormatMarker);
}

#[test]
fn empty_file_is_not_present() {
    let dir = tempfile::tempdir().unwrap();
    write_complete(dir.path());
    fs::write(dir.path().join("v1.json"), b"").unwrap();
    let v = AssetValidator::default()
        .validate(dir.path(), &required())
        .unwrap();
    assert_eq!(v.missing, vec![AssetKind::Metadata]);
    assert_eq!(v.problems[0].defect, AssetDefect::Empty);
}

#[test]
fn metadata_must_parse_and_carry_required_fields() {
    let dir = tempfile::tempdir().unwrap();
    write_complete(dir.path());
    fs::write(dir.path().join("v1.json"), b"{not json").unwrap();
    let v = AssetValidator::default()
        .validate(dir.path(), &required())
        .unwrap();
    assert!(matches!(
        v.problems[0].defect,
        AssetDefect::MalformedMetadata(_)
    ));

    let policy = ValidationPolicy {
        required_metadata_fields: vec!["id".to_string(), "title".to_string()],
        ..ValidationPolicy::default()
    };
    fs::write(dir.path().join("v1.json"), br#"{"id":"v1","title":"  "}"#).unwrap();
    let v = AssetValidator::new(policy.clone())
        .validate(dir.path(), &required())
        .unwrap();
    assert_eq!(
        v.problems[0].defect,
        AssetDefect::MissingField("title".to_string())
    );

    fs::write(dir.path().join("v1.json"), br#"{"id":"v1","title":"ok"}"#).unwrap();
    let v = AssetValidator::new(policy)
        .validate(dir.path(), &required())
        .unwrap();
    assert!(v.complete);
}

#[test]
fn metadata_must_be_an_object_even_without_required_fields() {
    let dir = tempfile::tempdir().unwrap();
    write_complete(dir.path());
    let bodies: [&[u8]; 4] = [b"null", b"42", b"[\"v1\"]", b"\"v1\""];
    for body in bodies {
        fs::write(dir.path().join("v1.json"), body).unwrap();
        let v = AssetValidator::default()
            .validate(dir.path(), &required())
            .unwrap();
        assert!(!v.complete, "accepted {:?}", String::from_utf8_lossy(body));
        assert_eq!(v.missing, vec![AssetKind::Metadata]);
        assert!(matches!(
            v.problems[0].defect,
            AssetDefect::MalformedMetadata(_)
        ));
    }
}

#[test]
fn preview_needs_image_signature() {
    let dir = tempfile::tempdir().unwrap();
    write_complete(dir.path());
    fs::write(dir.path().join("v1.jpg"), vec![b'x'; 512]).unwrap();
    let v = AssetValidator::default()
        .validate(dir.path(), &required())
        .unwrap();
    assert_eq!(v.missing, vec![AssetKind::Preview]);

    let policy = ValidationPolicy {
        check_preview_format: false,
        ..ValidationPolicy::default()
    };
    let v = AssetValidator::new(policy)
        .validate(dir.path(), &required())
        .unwrap();
    assert!(v.complete);
}

#[test]
fn webp_preview_accepted() {
    let dir = tempfile::tempdir().unwrap();
    write_complete(dir.path());
    let mut webp = b"RIFF\x00\x10\x00\x00WEBPVP8 ".to_vec();
    webp.resize(300, 0);
    fs::write(dir.path().join("v1.jpg"), webp).unwrap();
    let v = AssetValidator::default()
        .validate(dir.path(), &required())
        .unwrap();
    assert!(v.complete);
}

#[test]
fn folder_that_is_a_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let not_dir = dir.path().join("item");
    fs::write(&not_dir, b"x").unwrap();
    let err = AssetValidator::default()
        .validate(&not_dir, &required())
        .unwrap_err();
    assert!(matches!(err, ValidationIoError::NotADirectory { .. }));
}
