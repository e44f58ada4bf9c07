//! OxiZip CLI
//!
//! Create, list, test and extract ZIP archives with per-entry encryption and
//! code page aware file names.

mod commands;
mod utils;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use commands::{
    CompressionArg, CreateOptions, EncryptionArg, ExtractArgs, ListOptions, NamePolicyArg,
    OverwriteArg,
};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "oxizip")]
#[command(author, version, about = "Pure Rust ZIP archiver with per-entry encryption")]
#[command(long_about = "
OxiZip creates and reads ZIP archives. Entries can be encrypted with the
traditional PKWARE cipher or WinZip AES, and file names can be written in any
legacy code page or in UTF-8.

Examples:
  oxizip create archive.zip docs/ notes.txt
  oxizip create -e aes256 --password secret archive.zip report.pdf
  oxizip create --encoding shift_jis --names always archive.zip 資料/
  oxizip list --json archive.zip
  oxizip test --password secret archive.zip
  oxizip extract -o out --overwrite skip archive.zip
  oxizip info archive.zip
")]
struct Cli {
    /// Verbose output and debug logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an archive, or add to an existing one with --update
    #[command(alias = "c")]
    Create {
        /// Output archive file
        archive: PathBuf,

        /// Files and directories to add
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Compression level
        #[arg(short = 'l', long, value_enum, default_value = "normal")]
        compression: CompressionArg,

        /// Encryption algorithm (defaults to zipcrypto when a password is given)
        #[arg(short, long, value_enum)]
        encryption: Option<EncryptionArg>,

        /// Password for the new entries
        #[arg(short, long, conflicts_with = "ask_password")]
        password: Option<String>,

        /// Prompt for the password
        #[arg(long)]
        ask_password: bool,

        /// Code page for file names and comments
        #[arg(long, default_value = "cp437")]
        encoding: String,

        /// When names are written as UTF-8 with the Unicode flag
        #[arg(long, value_enum, default_value = "as-necessary")]
        names: NamePolicyArg,

        /// Archive comment
        #[arg(long)]
        comment: Option<String>,

        /// Add to an existing archive, replacing entries with the same name
        #[arg(short, long)]
        update: bool,
    },

    /// List contents of an archive
    #[command(alias = "l")]
    List {
        /// Archive file to list
        archive: PathBuf,

        /// Output as JSON (machine-readable)
        #[arg(short, long)]
        json: bool,

        /// Code page of names without the Unicode flag
        #[arg(long, default_value = "cp437")]
        encoding: String,

        /// Include only entries matching pattern (glob syntax: *.txt, src/**/*)
        #[arg(short = 'I', long)]
        include: Vec<String>,

        /// Exclude entries matching pattern (glob syntax)
        #[arg(short = 'X', long)]
        exclude: Vec<String>,
    },

    /// Test archive integrity
    #[command(alias = "t")]
    Test {
        /// Archive file to test
        archive: PathBuf,

        /// Password for encrypted entries
        #[arg(short, long, conflicts_with = "ask_password")]
        password: Option<String>,

        /// Prompt for the password
        #[arg(long)]
        ask_password: bool,

        /// Code page of names without the Unicode flag
        #[arg(long, default_value = "cp437")]
        encoding: String,
    },

    /// Extract files from an archive
    #[command(alias = "x")]
    Extract {
        /// Archive file to extract
        archive: PathBuf,

        /// Entries to extract (all if empty)
        entries: Vec<String>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Password for encrypted entries
        #[arg(short, long, conflicts_with = "ask_password")]
        password: Option<String>,

        /// Prompt for the password
        #[arg(long)]
        ask_password: bool,

        /// What to do with existing files
        #[arg(long, value_enum, default_value = "fail")]
        overwrite: OverwriteArg,

        /// Stop at the first entry that fails instead of carrying on
        #[arg(short = 's', long)]
        stop_on_error: bool,

        /// Do not restore modification times
        #[arg(long)]
        no_mtime: bool,

        /// Code page of names without the Unicode flag
        #[arg(long, default_value = "cp437")]
        encoding: String,

        /// Include only entries matching pattern (glob syntax)
        #[arg(short = 'I', long)]
        include: Vec<String>,

        /// Exclude entries matching pattern (glob syntax)
        #[arg(short = 'X', long)]
        exclude: Vec<String>,

        /// Hide the progress bar
        #[arg(short = 'q', long)]
        quiet: bool,
    },

    /// Show information about an archive
    #[command(alias = "i")]
    Info {
        /// Archive file to inspect
        archive: PathBuf,

        /// Code page of names without the Unicode flag
        #[arg(long, default_value = "cp437")]
        encoding: String,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

fn init_logging(verbose: u8) {
    let level = if verbose > 0 { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let verbose = cli.verbose > 0;

    let result = match cli.command {
        Commands::Create {
            archive,
            files,
            compression,
            encryption,
            password,
            ask_password,
            encoding,
            names,
            comment,
            update,
        } => commands::cmd_create(&CreateOptions {
            archive: &archive,
            files: &files,
            compression,
            encryption,
            password,
            ask_password,
            encoding: &encoding,
            names,
            comment: comment.as_deref(),
            update,
            verbose,
        }),
        Commands::List {
            archive,
            json,
            encoding,
            include,
            exclude,
        } => commands::cmd_list(
            &archive,
            &ListOptions {
                verbose,
                json,
                encoding: &encoding,
                include: &include,
                exclude: &exclude,
            },
        ),
        Commands::Test {
            archive,
            password,
            ask_password,
            encoding,
        } => commands::cmd_test(&archive, password, ask_password, &encoding, verbose),
        Commands::Extract {
            archive,
            entries,
            output,
            password,
            ask_password,
            overwrite,
            stop_on_error,
            no_mtime,
            encoding,
            include,
            exclude,
            quiet,
        } => commands::cmd_extract(&ExtractArgs {
            archive: &archive,
            entries: &entries,
            output: &output,
            password,
            ask_password,
            overwrite,
            stop_on_error,
            restore_mtime: !no_mtime,
            encoding: &encoding,
            include: &include,
            exclude: &exclude,
            progress: !quiet,
            verbose,
        }),
        Commands::Info { archive, encoding } => commands::cmd_info(&archive, &encoding),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "oxizip", &mut io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create() {
        let cli = Cli::try_parse_from([
            "oxizip", "create", "-e", "aes256", "-p", "pw", "out.zip", "a.txt", "dir",
        ])
        .unwrap();
        match cli.command {
            Commands::Create {
                files, encryption, ..
            } => {
                assert_eq!(files.len(), 2);
                assert_eq!(encryption, Some(EncryptionArg::Aes256));
            }
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn test_password_conflicts_with_prompt() {
        assert!(
            Cli::try_parse_from(["oxizip", "test", "-p", "x", "--ask-password", "a.zip"]).is_err()
        );
    }
}
