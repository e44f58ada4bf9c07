use oxizip_archive::zip::{
    ArchiveOptions, EncodingPolicy, EntryOptions, TextEncoding, ZipArchive, ZipReader,
};
use oxizip_core::OxiZipError;
use std::io::Cursor;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn shift_jis() -> TextEncoding {
    TextEncoding::for_label("shift_jis").expect("shift_jis is a WHATWG label")
}

fn archive_with(name: &str, policy: EncodingPolicy) -> Result<Vec<u8>, OxiZipError> {
    let mut archive = ZipArchive::new();
    archive.add_bytes_with(name, b"content".to_vec(), &EntryOptions::new().encoding(policy))?;
    archive.to_bytes()
}

#[test]
fn test_always_utf8_with_shift_jis_reader() -> TestResult {
    let bytes = archive_with("Привет.txt", EncodingPolicy::always_utf8())?;

    let reader = ZipReader::with_fallback(Cursor::new(bytes.clone()), shift_jis())?;
    let entry = &reader.entries()[0];
    assert!(entry.is_unicode());
    assert_eq!(entry.name, "Привет.txt");

    let mut archive = ZipArchive::from_reader(
        Cursor::new(bytes),
        ArchiveOptions::new().with_fallback_encoding(shift_jis()),
    )?;
    assert_eq!(archive.read_entry("Привет.txt", None)?, b"content");
    Ok(())
}

#[test]
fn test_as_necessary_keeps_ascii_legacy() -> TestResult {
    let bytes = archive_with("plain-name.txt", EncodingPolicy::as_necessary(TextEncoding::Cp437))?;
    let reader = ZipReader::new(Cursor::new(bytes))?;
    assert!(!reader.entries()[0].is_unicode());
    assert_eq!(reader.entries()[0].name, "plain-name.txt");
    Ok(())
}

#[test]
fn test_as_necessary_switches_to_utf8() -> TestResult {
    let bytes = archive_with("ไทย.txt", EncodingPolicy::as_necessary(shift_jis()))?;
    let reader = ZipReader::with_fallback(Cursor::new(bytes), shift_jis())?;
    assert!(reader.entries()[0].is_unicode());
    assert_eq!(reader.entries()[0].name, "ไทย.txt");
    Ok(())
}

#[test]
fn test_fixed_code_page_round_trip() -> TestResult {
    let name = "日本語のファイル.txt";
    let bytes = archive_with(name, EncodingPolicy::Fixed(shift_jis()))?;

    let reader = ZipReader::with_fallback(Cursor::new(bytes.clone()), shift_jis())?;
    assert!(!reader.entries()[0].is_unicode());
    assert_eq!(reader.entries()[0].name, name);

    // The same bytes read as CP437 come out as different text
    let reader = ZipReader::new(Cursor::new(bytes))?;
    assert_ne!(reader.entries()[0].name, name);
    Ok(())
}

#[test]
fn test_fixed_rejects_unrepresentable_name() {
    let err = archive_with("ไทย.txt", EncodingPolicy::Fixed(TextEncoding::Cp437)).unwrap_err();
    assert!(matches!(err, OxiZipError::Encoding { .. }));
}

#[test]
fn test_cp437_default_names() -> TestResult {
    let name = "Übersicht_ñ.txt";
    let bytes = archive_with(name, EncodingPolicy::default())?;
    let reader = ZipReader::new(Cursor::new(bytes))?;
    assert!(!reader.entries()[0].is_unicode());
    assert_eq!(reader.entries()[0].name, name);
    Ok(())
}

#[test]
fn test_comment_follows_name_encoding() -> TestResult {
    let mut archive = ZipArchive::new();
    archive.add_bytes_with(
        "notes.txt",
        b"x".to_vec(),
        &EntryOptions::new().comment("Заметки"),
    )?;
    let reopened = ZipArchive::from_bytes(archive.to_bytes()?)?;
    let entry = reopened.entry("notes.txt").ok_or("missing entry")?;
    assert_eq!(entry.comment, "Заметки");
    assert!(entry.is_unicode());
    Ok(())
}

#[test]
fn test_archive_comment_encoding_is_independent() -> TestResult {
    let mut archive = ZipArchive::with_options(
        ArchiveOptions::new()
            .with_comment_encoding(TextEncoding::UTF8)
            .with_fallback_encoding(TextEncoding::UTF8),
    );
    archive.set_comment("Архив")?;
    archive.add_bytes("a.txt", b"a".to_vec())?;
    let bytes = archive.to_bytes()?;

    let reopened = ZipArchive::from_reader(
        Cursor::new(bytes),
        ArchiveOptions::new().with_fallback_encoding(TextEncoding::UTF8),
    )?;
    assert_eq!(reopened.comment(), "Архив");
    Ok(())
}
