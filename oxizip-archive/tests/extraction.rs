use oxizip_archive::zip::{
    EntryOptions, ExtractOptions, Extracted, OverwritePolicy, PromptDecision, ZipArchive,
    ZipWriter,
};
use oxizip_core::{ArchiveEvent, CancellationToken, DosDateTime, OxiZipError};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn sample() -> Result<ZipArchive, OxiZipError> {
    let stamp = DosDateTime::from_fields(2021, 3, 4, 5, 6, 8).unwrap_or_default();
    let mut archive = ZipArchive::new();
    archive.add_directory_entry("docs")?;
    archive.add_bytes_with(
        "docs/readme.txt",
        b"read me first".repeat(50),
        &EntryOptions::new().modified(stamp),
    )?;
    archive.add_bytes_with(
        "secret.txt",
        b"the password is swordfish".to_vec(),
        &EntryOptions::new().password("swordfish").modified(stamp),
    )?;
    ZipArchive::from_bytes(archive.to_bytes()?)
}

#[test]
fn test_extract_all_with_mtime() -> TestResult {
    let out = tempfile::tempdir()?;
    let mut archive = sample()?;
    let report = archive.extract_all(out.path(), &ExtractOptions::new().password("swordfish"))?;
    assert_eq!(report.extracted, 3);
    assert!(out.path().join("docs").is_dir());
    assert_eq!(
        fs::read(out.path().join("docs/readme.txt"))?,
        b"read me first".repeat(50)
    );

    let expected = DosDateTime::from_fields(2021, 3, 4, 5, 6, 8)
        .ok_or("bad stamp")?
        .to_system_time();
    let actual = fs::metadata(out.path().join("secret.txt"))?.modified()?;
    assert_eq!(actual, expected);
    Ok(())
}

#[test]
fn test_failed_extraction_leaves_no_file() -> TestResult {
    let out = tempfile::tempdir()?;
    let mut archive = sample()?;
    let dest = out.path().join("secret.txt");

    let err = archive
        .extract_entry("secret.txt", out.path(), &ExtractOptions::new().password("tuna"))
        .unwrap_err();
    assert!(matches!(err, OxiZipError::BadPassword { .. }));
    assert!(!dest.exists());
    assert_eq!(fs::read_dir(out.path())?.count(), 0);

    let done = archive.extract_entry(
        "secret.txt",
        out.path(),
        &ExtractOptions::new().password("swordfish"),
    )?;
    assert_eq!(done, Extracted::Written(dest.clone()));
    assert_eq!(fs::read(&dest)?, b"the password is swordfish");
    Ok(())
}

#[test]
fn test_overwrite_policies() -> TestResult {
    let out = tempfile::tempdir()?;
    let dest = out.path().join("docs/readme.txt");
    fs::create_dir_all(out.path().join("docs"))?;
    fs::write(&dest, b"local edits")?;
    let mut archive = sample()?;

    let err = archive
        .extract_entry("docs/readme.txt", out.path(), &ExtractOptions::new())
        .unwrap_err();
    assert!(matches!(err, OxiZipError::DestinationExists { .. }));

    let skipped = archive.extract_entry(
        "docs/readme.txt",
        out.path(),
        &ExtractOptions::new().overwrite(OverwritePolicy::Skip),
    )?;
    assert_eq!(skipped, Extracted::Skipped(dest.clone()));
    assert_eq!(fs::read(&dest)?, b"local edits");

    let asked = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&asked);
    let prompt = OverwritePolicy::Prompt(Arc::new(move |_: &Path| {
        counter.fetch_add(1, Ordering::SeqCst);
        PromptDecision::Overwrite
    }));
    archive.extract_entry(
        "docs/readme.txt",
        out.path(),
        &ExtractOptions::new().overwrite(prompt),
    )?;
    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert_eq!(fs::read(&dest)?, b"read me first".repeat(50));
    Ok(())
}

#[test]
fn test_traversal_entry_is_refused() -> TestResult {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.add_bytes("../escape.txt", b"gotcha", &EntryOptions::new())?;
    let bytes = writer.finish()?.into_inner();

    let work = tempfile::tempdir()?;
    let out = work.path().join("out");
    let mut archive = ZipArchive::from_bytes(bytes)?;
    let report = archive.extract_all(&out, &ExtractOptions::new())?;
    assert_eq!(report.extracted, 0);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(report.failures[0].1, OxiZipError::PathTraversal { .. }));
    assert!(!work.path().join("escape.txt").exists());
    Ok(())
}

#[test]
fn test_extract_before_save_is_invalid() {
    let out = tempfile::tempdir().unwrap();
    let mut archive = ZipArchive::new();
    archive.add_bytes("a.txt", b"a".to_vec()).unwrap();
    let err = archive
        .extract_all(out.path(), &ExtractOptions::new())
        .unwrap_err();
    assert!(matches!(err, OxiZipError::InvalidState { .. }));
}

#[test]
fn test_cancelled_extraction() -> TestResult {
    let out = tempfile::tempdir()?;
    let mut archive = sample()?;
    let token = CancellationToken::new();
    token.cancel();

    let err = archive
        .extract_all(
            out.path(),
            &ExtractOptions::new().password("swordfish").with_cancel(token),
        )
        .unwrap_err();
    assert!(matches!(err, OxiZipError::Cancelled));
    assert_eq!(fs::read_dir(out.path())?.count(), 0);
    Ok(())
}

#[test]
fn test_extract_progress() -> TestResult {
    let out = tempfile::tempdir()?;
    let mut archive = sample()?;
    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&events);
    let sink = move |event: &ArchiveEvent<'_>| {
        if let (ArchiveEvent::EntryExtracted { name, .. }, Ok(mut seen)) = (event, seen.lock()) {
            seen.push(name.to_string());
        }
    };

    archive.extract_all(
        out.path(),
        &ExtractOptions::new()
            .password("swordfish")
            .with_progress(Arc::new(sink)),
    )?;
    let names = events.lock().map_err(|_| "poisoned")?.clone();
    assert_eq!(names, ["docs/", "docs/readme.txt", "secret.txt"]);
    Ok(())
}
