//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use gallery_core::{DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES};

/// Resumable bulk downloads of photo gallery hierarchies.
///
/// Reads the account hierarchy from a manifest (local file or URL), downloads
/// every item into a mirrored folder tree, and records each outcome so an
/// interrupted run resumes where it stopped.
#[derive(Parser, Debug)]
#[command(name = "gallery-downloader")]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Download the selected galleries (the default)
    Run,
    /// Print the remote hierarchy
    List,
    /// Show the hierarchy cache status
    CacheInfo,
    /// Delete the hierarchy cache
    ClearCache,
    /// Forget every recorded item outcome
    ClearCheckpoint,
    /// Inspect effective configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Print the merged file and CLI configuration
    Show,
}

/// Flags shared by every command.
#[derive(Args, Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunArgs {
    /// Manifest describing the account: a JSON file path or an http(s) URL
    #[arg(short = 's', long, global = true)]
    pub source: Option<String>,

    /// Directory to download into (default: current directory)
    #[arg(short = 'o', long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Maximum concurrent transfers (1-20)
    #[arg(short = 'c', long, global = true, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=20))]
    pub concurrency: u8,

    /// Maximum retries per item for transient failures (0-50)
    #[arg(short = 'r', long, global = true, default_value_t = DEFAULT_MAX_RETRIES as u8, value_parser = clap::value_parser!(u8).range(0..=50))]
    pub max_retries: u8,

    /// Per-transfer timeout in seconds (1-3600)
    #[arg(short = 't', long, global = true, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: u64,

    /// Hierarchy cache lifetime in hours (1-168)
    #[arg(long, global = true, default_value_t = 24, value_parser = clap::value_parser!(u32).range(1..=168))]
    pub cache_ttl: u32,

    /// Enumerate the remote even if a fresh cache exists
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Invalidate the cache before enumerating
    #[arg(long, global = true)]
    pub refresh: bool,

    /// Download everything again, ignoring the checkpoint and existing files
    #[arg(long, global = true, conflicts_with = "retry_failed")]
    pub overwrite: bool,

    /// Only retry items that failed in earlier runs
    #[arg(long, global = true)]
    pub retry_failed: bool,

    /// Skip size and checksum verification after each transfer
    #[arg(long, global = true)]
    pub no_verify: bool,

    /// Keep download time as the file modification time
    #[arg(long, global = true)]
    pub no_timestamps: bool,

    /// Only galleries whose title matches this regex (case-insensitive)
    #[arg(short = 'f', long, global = true)]
    pub filter: Option<String>,

    /// Only the folder or gallery with this id
    #[arg(long, global = true)]
    pub node: Option<String>,

    /// Maximum depth below the start node
    #[arg(long, global = true)]
    pub max_depth: Option<usize>,

    /// Plan the run and report what would be downloaded
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    /// Print reports as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored log output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let cli = Cli::try_parse_from(["gallery-downloader"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.run.verbose, 0);
        assert!(!cli.run.quiet);
        assert_eq!(cli.run.concurrency, 8);
        assert_eq!(cli.run.max_retries, 5);
        assert_eq!(cli.run.timeout, 30);
        assert_eq!(cli.run.cache_ttl, 24);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let cli = Cli::try_parse_from(["gallery-downloader", "-vv"]).unwrap();
        assert_eq!(cli.run.verbose, 2);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Cli::try_parse_from(["gallery-downloader", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Cli::try_parse_from(["gallery-downloader", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Cli::try_parse_from(["gallery-downloader", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    // ==================== Range Tests ====================

    #[test]
    fn test_cli_concurrency_bounds() {
        let cli = Cli::try_parse_from(["gallery-downloader", "-c", "20"]).unwrap();
        assert_eq!(cli.run.concurrency, 20);

        for value in ["0", "21"] {
            let err = Cli::try_parse_from(["gallery-downloader", "-c", value]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_cli_max_retries_bounds() {
        let cli = Cli::try_parse_from(["gallery-downloader", "-r", "0"]).unwrap();
        assert_eq!(cli.run.max_retries, 0);

        let err = Cli::try_parse_from(["gallery-downloader", "-r", "51"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_cache_ttl_bounds() {
        let err = Cli::try_parse_from(["gallery-downloader", "--cache-ttl", "169"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_overwrite_conflicts_with_retry_failed() {
        let err = Cli::try_parse_from(["gallery-downloader", "--overwrite", "--retry-failed"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    // ==================== Subcommand Tests ====================

    #[test]
    fn test_cli_subcommands_parse() {
        let cases = [
            ("run", Command::Run),
            ("list", Command::List),
            ("cache-info", Command::CacheInfo),
            ("clear-cache", Command::ClearCache),
            ("clear-checkpoint", Command::ClearCheckpoint),
        ];
        for (name, expected) in cases {
            let cli = Cli::try_parse_from(["gallery-downloader", name]).unwrap();
            assert_eq!(cli.command, Some(expected));
        }

        let cli = Cli::try_parse_from(["gallery-downloader", "config", "show"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Config {
                command: ConfigCommand::Show
            })
        );
    }

    #[test]
    fn test_cli_flags_accepted_after_subcommand() {
        let cli = Cli::try_parse_from([
            "gallery-downloader",
            "list",
            "--source",
            "manifest.json",
            "--no-cache",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(Command::List));
        assert_eq!(cli.run.source.as_deref(), Some("manifest.json"));
        assert!(cli.run.no_cache);
    }
}
