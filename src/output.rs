//! CLI output formatting and display helpers.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use gallery_core::{CacheInfo, ErrorKind, RemoteNode, RunReport, RunStatus};

/// Returns terminal width from COLUMNS, or 80 if unset/invalid.
pub fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|width| *width >= 20)
        .unwrap_or(80)
}

/// Truncates text to at most `width` chars, appending ellipsis if truncated.
pub fn truncate_to_width(text: &str, width: usize) -> String {
    let text_len = text.chars().count();
    if text_len <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    if width == 1 {
        return "…".to_string();
    }

    let mut output: String = text.chars().take(width - 1).collect();
    output.push('…');
    output
}

/// Human-readable byte count with binary units.
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Transfer rate with binary units, e.g. `1.5 MiB/s`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_rate(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_second.max(0.0).round() as u64))
}

/// `1h 02m`, `3m 05s` or `12s`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

pub(crate) fn render_run_summary_lines(report: &RunReport, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    if report.dry_run {
        lines.push(format!(
            "Dry run: {} items to download ({}), {} already done",
            report.planned,
            format_bytes(report.planned_bytes),
            report.skipped
        ));
    } else {
        let headline = match &report.status {
            RunStatus::Completed => "Download complete".to_string(),
            RunStatus::Cancelled => "Interrupted. Run again to resume.".to_string(),
            RunStatus::Aborted { kind, message } => {
                format!("Stopped: {} ({message}). {}", kind.label(), kind.fix())
            }
        };
        lines.push(headline);
        lines.push(format!(
            "  completed {}, failed {}, skipped {}, retries {}",
            report.completed, report.failed, report.skipped, report.retried
        ));
        lines.push(format!(
            "  {} in {} ({})",
            format_bytes(report.bytes_total),
            format_duration(report.elapsed),
            format_rate(report.bytes_per_second())
        ));
    }
    lines.extend(render_failure_summary_lines(report, width));
    lines.into_iter().map(|line| truncate_to_width(&line, width)).collect()
}

pub(crate) fn render_failure_summary_lines(report: &RunReport, width: usize) -> Vec<String> {
    if report.failures.is_empty() && report.gallery_failures.is_empty() {
        return Vec::new();
    }

    let mut grouped: BTreeMap<&'static str, (ErrorKind, Vec<&str>)> = BTreeMap::new();
    for failure in &report.failures {
        grouped
            .entry(failure.kind.as_str())
            .or_insert_with(|| (failure.kind, Vec::new()))
            .1
            .push(failure.item_id.as_str());
    }

    let mut lines = vec![truncate_to_width("Failed items by kind:", width)];
    for (kind, ids) in grouped.values() {
        lines.push(truncate_to_width(
            &format!("- {}: {} ({})", kind.label(), ids.len(), ids.join(", ")),
            width,
        ));
        lines.push(truncate_to_width(&format!("  {}", kind.fix()), width));
    }
    for gallery in &report.gallery_failures {
        lines.push(truncate_to_width(
            &format!(
                "- Gallery {} skipped: {} ({})",
                gallery.gallery_id,
                gallery.kind.label(),
                gallery.message
            ),
            width,
        ));
    }
    lines
}

pub(crate) fn render_hierarchy_lines(root: &RemoteNode) -> Vec<String> {
    let mut lines = Vec::new();
    root.walk(&mut |node, depth| {
        let indent = "  ".repeat(depth);
        if node.kind.holds_items() {
            lines.push(format!(
                "{indent}{} ({} items) [{}]",
                node.title, node.item_count, node.id
            ));
        } else {
            lines.push(format!("{indent}{}/ [{}]", node.title, node.id));
        }
    });
    lines
}

pub(crate) fn render_cache_info_line(info: &CacheInfo) -> String {
    match (info.present, info.age, info.ttl) {
        (true, Some(age), Some(ttl)) => format!(
            "Cache: captured {} ago, ttl {}, {}",
            format_duration(age),
            format_duration(ttl),
            if info.expired { "expired" } else { "fresh" }
        ),
        _ => "Cache: none".to_string(),
    }
}

pub(crate) fn print_run_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for line in render_run_summary_lines(report, terminal_width()) {
        println!("{line}");
    }
    Ok(())
}

pub(crate) fn print_hierarchy(root: &RemoteNode, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(root)?);
        return Ok(());
    }
    for line in render_hierarchy_lines(root) {
        println!("{line}");
    }
    Ok(())
}
