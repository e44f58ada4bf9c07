//! Extract command implementation.

use crate::utils::{
    create_progress_bar, matches_filters, parse_encoding, progress_sink, resolve_password,
};
use clap::ValueEnum;
use dialoguer::Select;
use oxizip_archive::zip::{
    ArchiveOptions, ExtractOptions, Extracted, FailurePolicy, OverwritePolicy, PromptDecision,
    ZipArchive,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Handling of existing destination files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OverwriteArg {
    /// Stop with an error
    Fail,
    /// Replace the file
    Overwrite,
    /// Keep the file
    Skip,
    /// Ask for each file
    Prompt,
}

impl OverwriteArg {
    fn policy(self) -> OverwritePolicy {
        match self {
            Self::Fail => OverwritePolicy::Fail,
            Self::Overwrite => OverwritePolicy::Overwrite,
            Self::Skip => OverwritePolicy::Skip,
            Self::Prompt => OverwritePolicy::Prompt(Arc::new(ask_overwrite)),
        }
    }
}

fn ask_overwrite(path: &Path) -> PromptDecision {
    let choice = Select::new()
        .with_prompt(format!("{} exists", path.display()))
        .items(&["Overwrite", "Skip", "Abort"])
        .default(1)
        .interact();
    match choice {
        Ok(0) => PromptDecision::Overwrite,
        Ok(1) => PromptDecision::Skip,
        _ => PromptDecision::Abort,
    }
}

/// Arguments of the extract command.
pub struct ExtractArgs<'a> {
    pub archive: &'a Path,
    pub entries: &'a [String],
    pub output: &'a PathBuf,
    pub password: Option<String>,
    pub ask_password: bool,
    pub overwrite: OverwriteArg,
    pub stop_on_error: bool,
    pub restore_mtime: bool,
    pub encoding: &'a str,
    pub include: &'a [String],
    pub exclude: &'a [String],
    pub progress: bool,
    pub verbose: bool,
}

impl ExtractArgs<'_> {
    fn selects_everything(&self) -> bool {
        self.entries.is_empty() && self.include.is_empty() && self.exclude.is_empty()
    }

    fn selects(&self, name: &str) -> bool {
        let named = self.entries.is_empty()
            || self
                .entries
                .iter()
                .any(|e| e == name || e.trim_end_matches('/') == name.trim_end_matches('/'));
        named && matches_filters(name, self.include, self.exclude)
    }
}

pub fn cmd_extract(args: &ExtractArgs) -> Result<(), Box<dyn std::error::Error>> {
    let encoding = parse_encoding(args.encoding)?;
    let mut zip = ZipArchive::open_with(
        args.archive,
        ArchiveOptions::new()
            .with_fallback_encoding(encoding)
            .with_comment_encoding(encoding),
    )?;

    let mut options = ExtractOptions::new()
        .overwrite(args.overwrite.policy())
        .restore_mtime(args.restore_mtime)
        .failure(if args.stop_on_error {
            FailurePolicy::StopOnFirst
        } else {
            FailurePolicy::Continue
        });
    if let Some(password) = resolve_password(args.password.clone(), args.ask_password, false)? {
        options = options.password(password);
    }

    std::fs::create_dir_all(args.output)?;

    // A prompt would fight the bar for the terminal
    let show_bar = args.progress && args.overwrite != OverwriteArg::Prompt;
    let pb = create_progress_bar(zip.len() as u64, show_bar);
    options = options.with_progress(progress_sink(&pb));

    if args.selects_everything() {
        let report = zip.extract_all(args.output, &options)?;
        for (name, error) in &report.failures {
            eprintln!("  FAILED: {} ({})", name, error);
        }
        println!(
            "Extracted {} entries to {} ({} skipped, {} failed)",
            report.extracted,
            args.output.display(),
            report.skipped,
            report.failures.len()
        );
        return if report.is_success() {
            Ok(())
        } else {
            Err(format!("{} entries could not be extracted", report.failures.len()).into())
        };
    }

    let selected: Vec<String> = zip
        .entries()
        .filter(|e| args.selects(&e.name))
        .map(|e| e.name.clone())
        .collect();
    if selected.is_empty() {
        return Err("no entries match the selection".into());
    }
    pb.set_length(selected.len() as u64);

    let (mut extracted, mut skipped, mut failed) = (0usize, 0usize, 0usize);
    for name in &selected {
        pb.set_message(name.clone());
        match zip.extract_entry(name, args.output, &options) {
            Ok(Extracted::Written(path)) => {
                extracted += 1;
                if args.verbose {
                    pb.println(format!("  Extracted: {}", path.display()));
                }
            }
            Ok(Extracted::Skipped(_)) => skipped += 1,
            Err(err) if !args.stop_on_error => {
                failed += 1;
                pb.println(format!("  FAILED: {} ({})", name, err));
            }
            Err(err) => return Err(err.into()),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!(
        "Extracted {} entries to {} ({} skipped, {} failed)",
        extracted,
        args.output.display(),
        skipped,
        failed
    );
    if failed > 0 {
        return Err(format!("{} entries could not be extracted", failed).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args<'a>(archive: &'a Path, output: &'a PathBuf, entries: &'a [String]) -> ExtractArgs<'a> {
        ExtractArgs {
            archive,
            entries,
            output,
            password: Some("pw".to_string()),
            ask_password: false,
            overwrite: OverwriteArg::Fail,
            stop_on_error: false,
            restore_mtime: true,
            encoding: "cp437",
            include: &[],
            exclude: &[],
            progress: false,
            verbose: false,
        }
    }

    fn sample(path: &Path) {
        let mut archive = ZipArchive::new();
        archive.add_bytes("a.txt", b"alpha".to_vec()).unwrap();
        archive.add_directory_entry("sub").unwrap();
        archive
            .add_bytes_with(
                "sub/b.txt",
                b"beta".to_vec(),
                &oxizip_archive::zip::EntryOptions::new().password("pw"),
            )
            .unwrap();
        archive.save_as(path).unwrap();
    }

    #[test]
    fn test_extract_everything() {
        let work = tempfile::tempdir().unwrap();
        let zip = work.path().join("s.zip");
        sample(&zip);
        let out = work.path().join("out");

        cmd_extract(&args(&zip, &out, &[])).unwrap();
        assert_eq!(std::fs::read(out.join("a.txt")).unwrap(), b"alpha");
        assert_eq!(std::fs::read(out.join("sub/b.txt")).unwrap(), b"beta");

        // Second run fails on the existing files, skip carries on
        assert!(cmd_extract(&args(&zip, &out, &[])).is_err());
        let mut skip = args(&zip, &out, &[]);
        skip.overwrite = OverwriteArg::Skip;
        cmd_extract(&skip).unwrap();
    }

    #[test]
    fn test_extract_selected_entry() {
        let work = tempfile::tempdir().unwrap();
        let zip = work.path().join("s.zip");
        sample(&zip);
        let out = work.path().join("out");

        let wanted = ["sub/b.txt".to_string()];
        cmd_extract(&args(&zip, &out, &wanted)).unwrap();
        assert!(out.join("sub/b.txt").exists());
        assert!(!out.join("a.txt").exists());

        let missing = ["nothing.txt".to_string()];
        assert!(cmd_extract(&args(&zip, &out, &missing)).is_err());
    }

    #[test]
    fn test_failed_entry_does_not_stop_the_rest() {
        let work = tempfile::tempdir().unwrap();
        let zip = work.path().join("s.zip");
        sample(&zip);

        let out = work.path().join("out");
        let mut wrong = args(&zip, &out, &[]);
        wrong.password = Some("nope".to_string());
        assert!(cmd_extract(&wrong).is_err());
        assert_eq!(std::fs::read(out.join("a.txt")).unwrap(), b"alpha");
        assert!(!out.join("sub/b.txt").exists());
    }
}
