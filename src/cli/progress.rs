//! Terminal progress bar and run summaries.

use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::catalog::{ResourceCategory, ResourceType, ResourceTypeGroups};
use crate::format::{format_bytes, format_duration, format_percent};
use crate::progress::{LineKind, ProgressSink};
use crate::stats::{RunOutcome, RunReport};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Resolution of the run bar; the ratio is mapped onto this many steps.
const BAR_STEPS: u64 = 1000;

fn make_run_bar() -> ProgressBar {
    let bar = ProgressBar::new(BAR_STEPS);
    let template = ProgressStyle::with_template(
        "{spinner:.cyan} [{bar:40.green/white}] {percent:>3}% {elapsed_precise} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(template.progress_chars("━━╌"));
    bar
}

/// Renders run notifications as coloured lines above a single progress bar.
pub struct CliSink {
    multi: MultiProgress,
    bar: ProgressBar,
}

impl Default for CliSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CliSink {
    /// Creates the sink and starts its ticking progress bar.
    #[must_use]
    pub fn new() -> Self {
        let multi = MultiProgress::new();
        let bar = multi.add(make_run_bar());
        bar.enable_steady_tick(Duration::from_millis(250));
        Self { multi, bar }
    }

    /// Removes the bar from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
        self.multi.clear().ok();
    }
}

impl ProgressSink for CliSink {
    fn on_log_line(&self, kind: LineKind, text: &str) {
        let line = match kind {
            LineKind::Success => style(text).green().to_string(),
            LineKind::Error => style(text).red().to_string(),
            LineKind::Info => text.to_string(),
        };
        let _ = self.multi.println(line);
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn on_progress(&self, ratio: f64) {
        let steps = (ratio.clamp(0.0, 1.0) * BAR_STEPS as f64).round() as u64;
        self.bar.set_position(steps);
    }

    fn on_no_data_found(&self) {
        self.bar.set_message("no data");
    }

    fn on_error(&self, message: &str) {
        self.bar.abandon_with_message(style(message).red().to_string());
    }
}

/// Builds the lines of the end-of-run summary.
pub fn summary_lines(report: &RunReport) -> Vec<String> {
    let mut lines = vec![
        SEPARATOR.to_string(),
        match report.outcome {
            RunOutcome::Completed => "Download Summary".to_string(),
            RunOutcome::Cancelled => "Download Summary (cancelled)".to_string(),
        },
        SEPARATOR.to_string(),
    ];

    if report.is_empty() {
        lines.push("  No data found.".to_string());
    } else {
        #[allow(clippy::cast_precision_loss)]
        let ratio = report.settled() as f64 / report.total as f64;
        lines.push(format!(
            "  Resources:         {} of {} settled ({})",
            report.settled(),
            report.total,
            format_percent(ratio)
        ));
        lines.push(format!("  Succeeded:         {}", report.succeeded));
        if report.failed > report.cancelled {
            lines.push(format!("  Failed:            {}", report.failed - report.cancelled));
        }
        if report.cancelled > 0 {
            lines.push(format!("  Cancelled:         {}", report.cancelled));
        }
        lines.push(format!(
            "  Total size:        {}",
            format_bytes(report.bytes_written)
        ));
        lines.push(format!(
            "  Total time:        {}",
            format_duration(report.elapsed)
        ));
        lines.push(format!(
            "  Average speed:     {}/s",
            format_bytes(report.average_speed())
        ));
        lines.push(format!("  Peak in flight:    {}", report.peak_active));
    }

    lines.push(SEPARATOR.to_string());
    lines
}

/// Prints the end-of-run summary.
pub fn print_summary(report: &RunReport) {
    println!();
    for line in summary_lines(report) {
        println!("{line}");
    }
}

fn print_group(title: &str, types: &[ResourceType]) {
    if types.is_empty() {
        return;
    }
    println!("{}", style(title).bold());
    for t in types {
        println!("  {:<8} {}", t.abbreviation, t.name);
    }
}

/// Prints resource types grouped by category.
pub fn print_resource_types(groups: &ResourceTypeGroups) {
    println!("{SEPARATOR}");
    print_group(ResourceCategory::Elevation.label(), &groups.elevation);
    print_group(ResourceCategory::Imagery.label(), &groups.imagery);
    print_group(ResourceCategory::Other.label(), &groups.other);
    println!("{SEPARATOR}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::RunStatsBuilder;

    #[test]
    fn summary_of_empty_run() {
        let report = RunStatsBuilder::new().build(RunOutcome::Completed);
        let lines = summary_lines(&report);
        assert!(lines.contains(&"  No data found.".to_string()));
    }

    #[test]
    fn summary_separates_failures_from_cancellations() {
        let mut report = RunStatsBuilder::new().build(RunOutcome::Cancelled);
        report.total = 10;
        report.dispatched = 6;
        report.succeeded = 3;
        report.failed = 3;
        report.cancelled = 2;

        let lines = summary_lines(&report);
        assert_eq!(lines[1], "Download Summary (cancelled)");
        assert!(lines.contains(&"  Resources:         6 of 10 settled (60%)".to_string()));
        assert!(lines.contains(&"  Failed:            1".to_string()));
        assert!(lines.contains(&"  Cancelled:         2".to_string()));
    }

    #[test]
    fn sink_maps_ratio_onto_bar() {
        let sink = CliSink::new();
        sink.on_progress(0.25);
        assert_eq!(sink.bar.position(), 250);
        sink.on_progress(2.0);
        assert_eq!(sink.bar.position(), BAR_STEPS);
        sink.finish();
    }
}
