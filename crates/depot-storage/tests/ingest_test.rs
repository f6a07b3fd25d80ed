//! Archive Ingestor behavior against a real temporary storage tree.

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use depot_catalog::MemoryCatalog;
use depot_core::{Error, Item};
use depot_storage::{FolderPayload, ListedFile, Storage, StorageConfig};
use flate2::write::GzEncoder;
use flate2::Compression;

const PREFIX: &str = "http://localhost:3000/files/view/";

fn annual_report() -> Item {
    Item::new(7, "docs", "pdf", "Annual Report")
}

async fn setup() -> (tempfile::TempDir, Storage, Arc<MemoryCatalog>) {
    let tmp = tempfile::tempdir().unwrap();
    let config = StorageConfig::default()
        .with_root(tmp.path().join("db"))
        .with_view_prefix(PREFIX);
    let storage = Storage::open(&config).await.unwrap();
    let catalog = Arc::new(MemoryCatalog::new(vec![annual_report()]));
    (tmp, storage, catalog)
}

fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (path, data) in entries {
        writer.start_file(*path, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn entries_of(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_tar_single_chain_wrapper_is_collapsed() {
    let (_tmp, storage, catalog) = setup().await;
    let body = tar_bytes(&[("a/b/c/file1", b"one"), ("a/b/c/file2", b"two")]);

    let upload = storage
        .ingest_tar_stream(catalog.as_ref(), &annual_report(), Cursor::new(body))
        .await
        .unwrap();

    assert!(upload.folder_path.starts_with("docs/pdf/annual_report_7_"));
    let folder = storage.root().join(&upload.folder_path);
    assert_eq!(entries_of(&folder), vec!["file1", "file2"]);
    assert_eq!(std::fs::read(folder.join("file1")).unwrap(), b"one");

    let paths: Vec<_> = upload.files.iter().map(|f| f.file_path.clone()).collect();
    assert_eq!(
        paths,
        vec![
            format!("{}/file1", upload.folder_path),
            format!("{}/file2", upload.folder_path)
        ]
    );
    assert!(upload.files.iter().all(|f| f.updated));
    assert_eq!(
        catalog.binding(7).await,
        Some(format!("{}{}/file2", PREFIX, upload.folder_path))
    );
}

#[tokio::test]
async fn test_tar_multiple_top_level_entries_kept() {
    let (_tmp, storage, catalog) = setup().await;
    let body = tar_bytes(&[("x/one.txt", b"1"), ("y/two.txt", b"2")]);

    let upload = storage
        .ingest_tar_stream(catalog.as_ref(), &annual_report(), Cursor::new(body))
        .await
        .unwrap();

    let folder = storage.root().join(&upload.folder_path);
    assert_eq!(entries_of(&folder), vec!["x", "y"]);
    assert!(folder.join("x/one.txt").is_file());
    assert!(folder.join("y/two.txt").is_file());
    assert_eq!(upload.files.len(), 2);
}

#[tokio::test]
async fn test_gzipped_tar_is_detected() {
    let (_tmp, storage, catalog) = setup().await;
    let raw = tar_bytes(&[("project/src/main.rs", b"fn main() {}"), ("project/README", b"hi")]);
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw).unwrap();
    let body = encoder.finish().unwrap();

    let upload = storage
        .ingest_tar_stream(catalog.as_ref(), &annual_report(), Cursor::new(body))
        .await
        .unwrap();

    let folder = storage.root().join(&upload.folder_path);
    assert_eq!(entries_of(&folder), vec!["README", "src"]);
}

#[tokio::test]
async fn test_malformed_tar_leaves_no_partial_state() {
    let (_tmp, storage, catalog) = setup().await;
    let garbage = vec![0x5au8; 4096];

    let err = storage
        .ingest_tar_stream(catalog.as_ref(), &annual_report(), Cursor::new(garbage))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Archive(_)));

    let base = storage.root().join("docs/pdf");
    let leftovers = entries_of(&base);
    assert!(leftovers.iter().all(|n| !n.starts_with(".staging_")));
    for name in leftovers {
        assert!(entries_of(&base.join(name)).is_empty());
    }
    assert_eq!(catalog.binding(7).await, None);
}

#[tokio::test]
async fn test_zip_gets_root_discovery() {
    let (tmp, storage, catalog) = setup().await;
    let archive = tmp.path().join("upload.zip");
    std::fs::write(
        &archive,
        zip_bytes(&[("site/index.html", b"<html>"), ("site/css/app.css", b"body{}")]),
    )
    .unwrap();

    let upload = storage
        .ingest_folder(
            catalog.as_ref(),
            &annual_report(),
            FolderPayload::Zip { archive },
        )
        .await
        .unwrap();

    let folder = storage.root().join(&upload.folder_path);
    assert_eq!(entries_of(&folder), vec!["css", "index.html"]);
    assert_eq!(upload.files.len(), 2);
}

#[tokio::test]
async fn test_file_list_preserves_relative_paths() {
    let (tmp, storage, catalog) = setup().await;
    let spool = tmp.path().join("spool");
    std::fs::create_dir_all(&spool).unwrap();
    std::fs::write(spool.join("0"), b"a").unwrap();
    std::fs::write(spool.join("1"), b"b").unwrap();
    std::fs::write(spool.join("2"), b"c").unwrap();

    let files = vec![
        ListedFile {
            relative_path: "notes/a.txt".to_string(),
            source: spool.join("0"),
        },
        ListedFile {
            relative_path: "notes/sub/b.txt".to_string(),
            source: spool.join("1"),
        },
        ListedFile {
            relative_path: "c.txt".to_string(),
            source: spool.join("2"),
        },
    ];

    let upload = storage
        .ingest_folder(catalog.as_ref(), &annual_report(), FolderPayload::FileList(files))
        .await
        .unwrap();

    let folder = storage.root().join(&upload.folder_path);
    assert_eq!(entries_of(&folder), vec!["c.txt", "notes"]);
    assert_eq!(std::fs::read(folder.join("notes/sub/b.txt")).unwrap(), b"b");
    assert_eq!(upload.files.len(), 3);
}

#[tokio::test]
async fn test_file_list_rejects_traversal() {
    let (tmp, storage, catalog) = setup().await;
    let source = tmp.path().join("evil");
    std::fs::write(&source, b"x").unwrap();
    let files = vec![ListedFile {
        relative_path: "../../escape.txt".to_string(),
        source,
    }];

    let err = storage
        .ingest_folder(catalog.as_ref(), &annual_report(), FolderPayload::FileList(files))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
    assert!(!tmp.path().join("escape.txt").exists());
}

#[tokio::test]
async fn test_single_file_renamed_to_item_name() {
    let (_tmp, storage, catalog) = setup().await;
    let item = annual_report();

    let first = storage
        .ingest_file(catalog.as_ref(), &item, "scan 01.pdf", Cursor::new(b"v1".to_vec()))
        .await
        .unwrap();
    assert_eq!(first.new_filename, "Annual_Report.pdf");
    assert_eq!(first.path, "docs/pdf/Annual_Report.pdf");
    assert_eq!(first.static_path, format!("{}docs/pdf/Annual_Report.pdf", PREFIX));
    assert!(first.binding_updated);

    let second = storage
        .ingest_file(catalog.as_ref(), &item, "scan 02.pdf", Cursor::new(b"v2".to_vec()))
        .await
        .unwrap();
    assert_eq!(second.new_filename, "Annual_Report_1.pdf");

    let dir = storage.root().join("docs/pdf");
    assert_eq!(entries_of(&dir), vec!["Annual_Report.pdf", "Annual_Report_1.pdf"]);
    assert_eq!(std::fs::read(dir.join("Annual_Report.pdf")).unwrap(), b"v1");
}

#[tokio::test]
async fn test_binding_failure_does_not_lose_upload() {
    let (_tmp, storage, catalog) = setup().await;
    catalog.set_reject_upserts(true);

    let upload = storage
        .ingest_file(catalog.as_ref(), &annual_report(), "a.pdf", Cursor::new(b"data".to_vec()))
        .await
        .unwrap();

    assert!(!upload.binding_updated);
    assert!(storage.root().join(&upload.path).is_file());
}

#[tokio::test]
async fn test_item_without_type_is_rejected_before_writing() {
    let (_tmp, storage, catalog) = setup().await;
    let item = Item::new(9, "docs", "", "No Type");

    let err = storage
        .ingest_file(catalog.as_ref(), &item, "a.pdf", Cursor::new(b"x".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert!(entries_of(storage.root()).is_empty());
}
