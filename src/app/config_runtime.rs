use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgMatches, CommandFactory, FromArgMatches, parser::ValueSource};
use gallery_core::orchestrator::{FilterConfig, RunConfig};

use crate::app_config::{FileConfig, VerbositySetting};
use crate::cli::{Cli, RunArgs};

/// Which flags the user typed, as opposed to clap defaults.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) source: bool,
    pub(crate) output_dir: bool,
    pub(crate) concurrency: bool,
    pub(crate) max_retries: bool,
    pub(crate) timeout: bool,
    pub(crate) cache_ttl: bool,
    pub(crate) no_verify: bool,
    pub(crate) no_timestamps: bool,
    pub(crate) verbose: bool,
    pub(crate) quiet: bool,
}

pub(crate) fn parse_cli_with_sources() -> (Cli, CliValueSources) {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    let sources = value_sources(&matches);
    (cli, sources)
}

pub(crate) fn value_sources(matches: &ArgMatches) -> CliValueSources {
    CliValueSources {
        source: is_commandline_value(matches, "source"),
        output_dir: is_commandline_value(matches, "output_dir"),
        concurrency: is_commandline_value(matches, "concurrency"),
        max_retries: is_commandline_value(matches, "max_retries"),
        timeout: is_commandline_value(matches, "timeout"),
        cache_ttl: is_commandline_value(matches, "cache_ttl"),
        no_verify: is_commandline_value(matches, "no_verify"),
        no_timestamps: is_commandline_value(matches, "no_timestamps"),
        verbose: is_commandline_value(matches, "verbose"),
        quiet: is_commandline_value(matches, "quiet"),
    }
}

/// Global flags may be typed before or after the subcommand.
fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    let at = |m: &ArgMatches| m.value_source(id) == Some(ValueSource::CommandLine);
    at(matches) || matches.subcommand().is_some_and(|(_, sub)| is_commandline_value(sub, id))
}

/// Fills values the user did not type from the file config.
pub(crate) fn apply_config_defaults(
    mut args: RunArgs,
    cli_sources: &CliValueSources,
    file_config: Option<&FileConfig>,
) -> RunArgs {
    let Some(file_config) = file_config else {
        return args;
    };

    if !cli_sources.source
        && let Some(source) = &file_config.source
    {
        args.source = Some(source.clone());
    }
    if !cli_sources.output_dir
        && let Some(output_dir) = &file_config.output_dir
    {
        args.output_dir = Some(output_dir.clone());
    }
    if !cli_sources.concurrency
        && let Some(concurrency) = file_config.concurrency
    {
        args.concurrency = concurrency;
    }
    if !cli_sources.max_retries
        && let Some(max_retries) = file_config.max_retries
    {
        args.max_retries = max_retries;
    }
    if !cli_sources.timeout
        && let Some(timeout) = file_config.timeout_secs
    {
        args.timeout = timeout;
    }
    if !cli_sources.cache_ttl
        && let Some(ttl) = file_config.cache_ttl_hours
    {
        args.cache_ttl = ttl;
    }
    if !cli_sources.no_verify
        && let Some(verify) = file_config.verify_integrity
    {
        args.no_verify = !verify;
    }
    if !cli_sources.no_timestamps
        && let Some(preserve) = file_config.preserve_timestamps
    {
        args.no_timestamps = !preserve;
    }
    if !cli_sources.verbose
        && !cli_sources.quiet
        && let Some(verbosity) = file_config.verbosity
    {
        apply_config_verbosity(&mut args, verbosity);
    }
    args
}

fn apply_config_verbosity(args: &mut RunArgs, verbosity: VerbositySetting) {
    match verbosity {
        VerbositySetting::Default => {
            args.quiet = false;
            args.verbose = 0;
        }
        VerbositySetting::Verbose => {
            args.quiet = false;
            args.verbose = 1;
        }
        VerbositySetting::Quiet => {
            args.quiet = true;
            args.verbose = 0;
        }
    }
}

/// Translates merged arguments into the library's run configuration.
pub(crate) fn build_run_config(args: &RunArgs) -> Result<RunConfig> {
    let mut config = RunConfig::new(
        args.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(".")),
    );
    config.concurrency = usize::from(args.concurrency);
    config.max_retries = u32::from(args.max_retries);
    config.transfer_timeout = Duration::from_secs(args.timeout);
    config.cache_ttl_hours = args.cache_ttl;
    config.use_cache = !args.no_cache;
    config.refresh_cache = args.refresh;
    config.overwrite = args.overwrite;
    config.retry_failed_only = args.retry_failed;
    config.verify_integrity = !args.no_verify;
    config.preserve_timestamps = !args.no_timestamps;
    config.dry_run = args.dry_run;
    config.filter = FilterConfig {
        title_pattern: args.filter.clone(),
        node_id: args.node.clone(),
        max_depth: args.max_depth,
    };
    config.validate()?;
    Ok(config)
}

pub(crate) fn resolve_default_log_level(args: &RunArgs) -> &'static str {
    if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

pub(crate) fn should_force_cli_log_level(cli_sources: &CliValueSources) -> bool {
    cli_sources.verbose || cli_sources.quiet
}

pub(crate) fn verbosity_label(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        VerbositySetting::Quiet.as_str()
    } else if verbose == 0 {
        VerbositySetting::Default.as_str()
    } else {
        VerbositySetting::Verbose.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(argv: &[&str]) -> (RunArgs, CliValueSources) {
        let matches = Cli::command().try_get_matches_from(argv).unwrap();
        let cli = Cli::from_arg_matches(&matches).unwrap();
        (cli.run, value_sources(&matches))
    }

    #[test]
    fn test_file_config_fills_unset_values() {
        let (args, sources) = parse(&["gallery-downloader"]);
        let file = FileConfig {
            source: Some("m.json".to_string()),
            concurrency: Some(3),
            verify_integrity: Some(false),
            verbosity: Some(VerbositySetting::Quiet),
            ..FileConfig::default()
        };
        let merged = apply_config_defaults(args, &sources, Some(&file));
        assert_eq!(merged.source.as_deref(), Some("m.json"));
        assert_eq!(merged.concurrency, 3);
        assert!(merged.no_verify);
        assert!(merged.quiet);
    }

    #[test]
    fn test_cli_values_win_over_file_config() {
        let (args, sources) = parse(&["gallery-downloader", "-c", "12", "list", "-v"]);
        assert!(sources.concurrency);
        assert!(sources.verbose);
        let file = FileConfig {
            concurrency: Some(3),
            verbosity: Some(VerbositySetting::Quiet),
            ..FileConfig::default()
        };
        let merged = apply_config_defaults(args, &sources, Some(&file));
        assert_eq!(merged.concurrency, 12);
        assert!(!merged.quiet);
        assert_eq!(merged.verbose, 1);
    }

    #[test]
    fn test_build_run_config_maps_flags() {
        let cli = Cli::try_parse_from([
            "gallery-downloader",
            "-o",
            "/tmp/out",
            "-c",
            "4",
            "--no-cache",
            "--filter",
            "beach",
            "--max-depth",
            "2",
            "--dry-run",
        ])
        .unwrap();
        let config = build_run_config(&cli.run).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.concurrency, 4);
        assert!(!config.use_cache);
        assert!(config.dry_run);
        assert_eq!(config.filter.title_pattern.as_deref(), Some("beach"));
        assert_eq!(config.filter.max_depth, Some(2));
    }

    #[test]
    fn test_log_level_from_flags() {
        let (quiet, _) = parse(&["gallery-downloader", "-q"]);
        assert_eq!(resolve_default_log_level(&quiet), "error");
        let (trace, _) = parse(&["gallery-downloader", "-vv"]);
        assert_eq!(resolve_default_log_level(&trace), "trace");
        let (plain, sources) = parse(&["gallery-downloader"]);
        assert_eq!(resolve_default_log_level(&plain), "info");
        assert!(!should_force_cli_log_level(&sources));
    }
}
