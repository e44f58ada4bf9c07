//! Create command implementation.

use crate::utils::{create_progress_bar, parse_encoding, progress_sink, resolve_password};
use clap::ValueEnum;
use oxizip_archive::zip::{
    AesStrength, ArchiveOptions, CompressionLevel, DuplicateNamePolicy, EncodingPolicy,
    Encryption, EntryOptions, SaveOptions, TextEncoding, ZipArchive,
};
use std::path::{Path, PathBuf};

/// Compression level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompressionArg {
    /// Store without compression
    Store,
    /// Fast compression
    Fast,
    /// Normal compression (default)
    Normal,
    /// Best compression
    Best,
}

impl From<CompressionArg> for CompressionLevel {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::Store => Self::Store,
            CompressionArg::Fast => Self::Fast,
            CompressionArg::Normal => Self::Normal,
            CompressionArg::Best => Self::Best,
        }
    }
}

/// Encryption algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EncryptionArg {
    /// No encryption
    None,
    /// Traditional PKWARE encryption
    Zipcrypto,
    /// WinZip AES-128
    Aes128,
    /// WinZip AES-192
    Aes192,
    /// WinZip AES-256
    Aes256,
}

impl From<EncryptionArg> for Encryption {
    fn from(arg: EncryptionArg) -> Self {
        match arg {
            EncryptionArg::None => Self::None,
            EncryptionArg::Zipcrypto => Self::Traditional,
            EncryptionArg::Aes128 => Self::Aes(AesStrength::Aes128),
            EncryptionArg::Aes192 => Self::Aes(AesStrength::Aes192),
            EncryptionArg::Aes256 => Self::Aes(AesStrength::Aes256),
        }
    }
}

/// When file names are written as UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NamePolicyArg {
    /// Always the chosen code page
    Never,
    /// The code page when it fits, UTF-8 otherwise
    AsNecessary,
    /// Always UTF-8
    Always,
}

impl NamePolicyArg {
    fn policy(self, encoding: TextEncoding) -> EncodingPolicy {
        match self {
            Self::Never => EncodingPolicy::Fixed(encoding),
            Self::AsNecessary => EncodingPolicy::as_necessary(encoding),
            Self::Always => EncodingPolicy::always_utf8(),
        }
    }
}

/// Arguments of the create command.
pub struct CreateOptions<'a> {
    pub archive: &'a Path,
    pub files: &'a [PathBuf],
    pub compression: CompressionArg,
    pub encryption: Option<EncryptionArg>,
    pub password: Option<String>,
    pub ask_password: bool,
    pub encoding: &'a str,
    pub names: NamePolicyArg,
    pub comment: Option<&'a str>,
    pub update: bool,
    pub verbose: bool,
}

fn entry_options(args: &CreateOptions) -> Result<EntryOptions, Box<dyn std::error::Error>> {
    let encoding = parse_encoding(args.encoding)?;
    let mut options = EntryOptions::new()
        .compression(args.compression.into())
        .encoding(args.names.policy(encoding));

    let password = resolve_password(args.password.clone(), args.ask_password, true)?;
    let encryption = match (args.encryption, &password) {
        (Some(encryption), _) => encryption.into(),
        (None, Some(_)) => Encryption::Traditional,
        (None, None) => Encryption::None,
    };
    if encryption.is_encrypted() && password.is_none() {
        return Err(format!("{} requires --password or --ask-password", encryption).into());
    }
    if let Some(password) = password {
        options = options.password(password);
    }
    Ok(options.encryption(encryption))
}

/// Archive name of a command line path: its final component.
fn archive_name(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| format!("cannot derive an entry name from {}", path.display()).into())
}

pub fn cmd_create(args: &CreateOptions) -> Result<(), Box<dyn std::error::Error>> {
    let entry = entry_options(args)?;
    let encoding = parse_encoding(args.encoding)?;
    let options = ArchiveOptions::new()
        .with_default_entry(entry)
        .with_comment_encoding(encoding)
        .with_fallback_encoding(encoding);

    let mut archive = if args.update && args.archive.exists() {
        ZipArchive::open_with(
            args.archive,
            options.with_duplicates(DuplicateNamePolicy::Replace),
        )?
    } else {
        ZipArchive::with_options(options)
    };
    let existing = archive.len();

    for path in args.files {
        let name = archive_name(path)?;
        if path.is_dir() {
            archive.add_directory_entry(&name)?;
            let added = archive.add_directory(path, &name)?;
            if args.verbose {
                println!("  Adding: {}/ ({} entries)", name, added);
            }
        } else {
            archive.add_file(path, &name)?;
            if args.verbose {
                println!("  Adding: {}", name);
            }
        }
    }

    if let Some(comment) = args.comment {
        archive.set_comment(comment)?;
    }

    let pb = create_progress_bar(archive.len() as u64, args.verbose);
    let save = SaveOptions::new().with_progress(progress_sink(&pb));
    archive.save_as_with(args.archive, &save)?;

    println!(
        "Created {} ({} entries, {} new)",
        args.archive.display(),
        archive.len(),
        archive.len().saturating_sub(existing)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args<'a>(archive: &'a Path, files: &'a [PathBuf]) -> CreateOptions<'a> {
        CreateOptions {
            archive,
            files,
            compression: CompressionArg::Normal,
            encryption: None,
            password: None,
            ask_password: false,
            encoding: "cp437",
            names: NamePolicyArg::AsNecessary,
            comment: None,
            update: false,
            verbose: false,
        }
    }

    #[test]
    fn test_password_implies_zipcrypto() {
        let files: [PathBuf; 0] = [];
        let mut create = args(Path::new("a.zip"), &files);
        create.password = Some("pw".to_string());
        let options = entry_options(&create).unwrap();
        assert_eq!(options.encryption, Encryption::Traditional);
    }

    #[test]
    fn test_encryption_without_password_fails() {
        let files: [PathBuf; 0] = [];
        let mut create = args(Path::new("a.zip"), &files);
        create.encryption = Some(EncryptionArg::Aes256);
        assert!(entry_options(&create).is_err());
    }

    #[test]
    fn test_create_and_update() {
        let work = tempfile::tempdir().unwrap();
        let dir = work.path().join("docs");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("a.txt"), b"alpha").unwrap();
        let single = work.path().join("b.txt");
        std::fs::write(&single, b"beta").unwrap();
        let target = work.path().join("out.zip");

        let files = [dir.clone()];
        cmd_create(&args(&target, &files)).unwrap();
        let archive = ZipArchive::open(&target).unwrap();
        let names: Vec<_> = archive.entries().map(|e| e.name.clone()).collect();
        assert_eq!(names, ["docs/", "docs/a.txt"]);

        let files = [single];
        let mut update = args(&target, &files);
        update.update = true;
        update.comment = Some("updated");
        cmd_create(&update).unwrap();
        let archive = ZipArchive::open(&target).unwrap();
        assert_eq!(archive.len(), 3);
        assert_eq!(archive.comment(), "updated");
    }
}
