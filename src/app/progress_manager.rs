//! Progress UI (spinner) for download runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gallery_core::Statistics;
use gallery_core::download::StatsSnapshot;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;

use crate::output::{format_bytes, format_duration, format_rate};

const TICK: Duration = Duration::from_millis(100);
const REFRESH: Duration = Duration::from_millis(250);

/// Starts the run spinner. The returned flag stops it; when the spinner is
/// disabled there is no handle and the flag is already set.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    stats: Arc<Statistics>,
) -> (Option<JoinHandle<()>>, Arc<AtomicBool>) {
    let stop = Arc::new(AtomicBool::new(!use_spinner));
    if !use_spinner {
        return (None, stop);
    }
    let handle = tokio::spawn(drive_spinner(stats, Arc::clone(&stop)));
    (Some(handle), stop)
}

async fn drive_spinner(stats: Arc<Statistics>, stop: Arc<AtomicBool>) {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg} {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(TICK);

    while !stop.load(Ordering::SeqCst) {
        spinner.set_message(progress_message(&stats));
        tokio::time::sleep(REFRESH).await;
    }
    spinner.finish_and_clear();
}

/// `[done/total]` over planned tasks; items skipped while planning are not counted.
fn progress_message(stats: &Statistics) -> String {
    render_progress(&stats.snapshot())
}

fn render_progress(snapshot: &StatsSnapshot) -> String {
    let planned = snapshot.planned;
    if planned == 0 {
        return "Preparing task list...".to_string();
    }
    let done = snapshot.completed + snapshot.failed;
    let eta = snapshot
        .eta()
        .map(|eta| format!(", ETA {}", format_duration(eta)))
        .unwrap_or_default();
    format!(
        "[{}/{planned}] {} downloaded at {} ({} failed, {} retries){eta}",
        done.min(planned),
        format_bytes(snapshot.bytes),
        format_rate(snapshot.bytes_per_second()),
        snapshot.failed,
        snapshot.retried
    )
}
