//! CLI command routing for everything except the download run.
//!
//! Returns `None` for `run` (or no command) so the caller continues with the
//! download flow.

use anyhow::Result;
use gallery_core::orchestrator::RunConfig;
use tracing::info;

use crate::app::config_runtime::{self, CliValueSources};
use crate::app::context;
use crate::app_config::LoadedConfig;
use crate::cli::{Command, ConfigCommand, RunArgs};
use crate::{ProcessExit, output};

/// If `command` is not a run, executes it and returns `Some(exit)`.
pub(crate) async fn try_dispatch(
    command: Option<&Command>,
    args: &RunArgs,
    config: RunConfig,
    cli_sources: &CliValueSources,
    loaded: &LoadedConfig,
) -> Result<Option<ProcessExit>> {
    let Some(command) = command else {
        return Ok(None);
    };

    match command {
        Command::Run => return Ok(None),
        Command::Config {
            command: ConfigCommand::Show,
        } => {
            for line in config_show_lines(args, &config, cli_sources, loaded) {
                println!("{line}");
            }
        }
        Command::List => {
            let orchestrator = context::build_orchestrator(args, config)?;
            let use_cache = orchestrator.config().use_cache && !args.refresh;
            let tree = orchestrator.list_hierarchy(use_cache).await?;
            output::print_hierarchy(&tree, args.json)?;
        }
        Command::CacheInfo => {
            let orchestrator = context::build_orchestrator(args, config)?;
            let info = orchestrator.cache_info().await;
            println!("{}", output::render_cache_info_line(&info));
        }
        Command::ClearCache => {
            let orchestrator = context::build_orchestrator(args, config)?;
            orchestrator.clear_cache().await?;
            println!("Cache cleared");
        }
        Command::ClearCheckpoint => {
            let orchestrator = context::build_orchestrator(args, config)?;
            let removed = orchestrator.clear_checkpoint().await?;
            info!(removed, "checkpoint cleared");
            println!("Checkpoint cleared ({removed} records)");
        }
    }

    Ok(Some(ProcessExit::Success))
}

fn config_show_lines(
    args: &RunArgs,
    config: &RunConfig,
    cli_sources: &CliValueSources,
    loaded: &LoadedConfig,
) -> Vec<String> {
    let origin = |from_cli: bool| if from_cli { "cli" } else { "default/file" };
    let config_path = loaded.path.as_ref().map_or_else(
        || "(no config directory)".to_string(),
        |path| path.display().to_string(),
    );
    vec![
        format!(
            "config_file = {config_path} ({})",
            if loaded.config.is_some() { "loaded" } else { "not found" }
        ),
        format!(
            "source = {} [{}]",
            args.source.as_deref().unwrap_or("(unset)"),
            origin(cli_sources.source)
        ),
        format!(
            "output_dir = {} [{}]",
            config.output_dir.display(),
            origin(cli_sources.output_dir)
        ),
        format!("concurrency = {} [{}]", config.concurrency, origin(cli_sources.concurrency)),
        format!("max_retries = {} [{}]", config.max_retries, origin(cli_sources.max_retries)),
        format!(
            "timeout_secs = {} [{}]",
            config.transfer_timeout.as_secs(),
            origin(cli_sources.timeout)
        ),
        format!(
            "cache_ttl_hours = {} [{}]",
            config.cache_ttl_hours,
            origin(cli_sources.cache_ttl)
        ),
        format!("verify_integrity = {}", config.verify_integrity),
        format!("preserve_timestamps = {}", config.preserve_timestamps),
        format!(
            "verbosity = {}",
            config_runtime::verbosity_label(args.verbose, args.quiet)
        ),
        format!("state_dir = {}", config.state_dir().display()),
    ]
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn loaded_none() -> LoadedConfig {
        LoadedConfig {
            path: None,
            config: None,
        }
    }

    #[tokio::test]
    async fn test_try_dispatch_returns_none_for_run() {
        let cli = Cli::parse_from(["gallery-downloader"]);
        let config = config_runtime::build_run_config(&cli.run).unwrap();
        let sources = CliValueSources::default();
        let result = try_dispatch(None, &cli.run, config.clone(), &sources, &loaded_none())
            .await
            .unwrap();
        assert_eq!(result, None);

        let result = try_dispatch(Some(&Command::Run), &cli.run, config, &sources, &loaded_none())
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_config_show_reports_origin() {
        let cli = Cli::parse_from(["gallery-downloader", "-c", "3", "-o", "/tmp/photos"]);
        let config = config_runtime::build_run_config(&cli.run).unwrap();
        let sources = CliValueSources {
            concurrency: true,
            ..CliValueSources::default()
        };
        let lines = config_show_lines(&cli.run, &config, &sources, &loaded_none());
        assert!(lines.contains(&"concurrency = 3 [cli]".to_string()));
        assert!(lines.contains(&"source = (unset) [default/file]".to_string()));
        assert!(lines.contains(&"state_dir = /tmp/photos/.gallery-downloader".to_string()));
    }
}
