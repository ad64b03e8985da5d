use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, bail};
use gallery_core::Statistics;
use tracing::{debug, info, warn};

use crate::app::{
    command_dispatcher, config_runtime, context, exit_handler, progress_manager, terminal,
};
use crate::app_config::load_default_file_config;
use crate::{ProcessExit, output};

pub(crate) async fn run_downloader() -> Result<ProcessExit> {
    let (cli, cli_sources) = config_runtime::parse_cli_with_sources();

    let loaded = load_default_file_config()?;
    let args = config_runtime::apply_config_defaults(cli.run, &cli_sources, loaded.config.as_ref());

    let default_level = config_runtime::resolve_default_log_level(&args);
    let force_cli_log_level = config_runtime::should_force_cli_log_level(&cli_sources);
    let no_color = terminal::is_no_color_requested(&args);
    terminal::init_tracing(default_level, force_cli_log_level, no_color);

    debug!(?args, "CLI arguments parsed");
    let config = config_runtime::build_run_config(&args)?;

    if let Some(exit) = command_dispatcher::try_dispatch(
        cli.command.as_ref(),
        &args,
        config.clone(),
        &cli_sources,
        &loaded,
    )
    .await?
    {
        return Ok(exit);
    }

    if args.source.is_none() {
        bail!(
            "No manifest source given.\n  \
             Pass --source FILE|URL or set `source = \"...\"` in the config file."
        );
    }

    info!(output = %config.output_dir.display(), "Gallery downloader starting");
    let orchestrator = context::build_orchestrator(&args, config)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });

    let stats = Arc::new(Statistics::new());
    let use_spinner = terminal::should_use_spinner(
        io::stderr().is_terminal(),
        args.quiet,
        args.json,
        terminal::is_dumb_terminal(),
    );
    let (progress_handle, progress_stop) =
        progress_manager::spawn_progress_ui(use_spinner, Arc::clone(&stats));

    let result = orchestrator
        .run_with(Arc::clone(&stats), Arc::clone(&interrupted))
        .await;

    progress_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    let report = result?;
    output::print_run_report(&report, args.json)?;

    if interrupted.load(Ordering::SeqCst) {
        warn!(
            completed = report.completed,
            planned = report.planned,
            "Interrupted. Run again to resume."
        );
    }

    Ok(exit_handler::exit_for_report(&report))
}
