//! Text summary builder for CLI output.
//!
//! This module computes session metrics and formats human-readable lines for text mode.

use crate::metrics;
use crate::model::{BatchReport, ExportOutcome};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary from a finished batch report.
pub(crate) fn build_text_summary(report: &BatchReport) -> TextSummary {
    let mut lines = Vec::new();

    if let Some(cfg) = report.config.as_ref() {
        lines.push(format!(
            "CHID: {}  time: {}  groups: {}",
            cfg.chid, cfg.time_range, cfg.group_spec
        ));
        lines.push(format!("Output: {}", cfg.output_dir.display()));
    }

    lines.push(format!(
        "Exports: {} total, {} succeeded, {} skipped, {} failed",
        report.outcomes.len(),
        report.succeeded(),
        report.skipped(),
        report.failed()
    ));

    let session_secs: Vec<f64> = report
        .outcomes
        .iter()
        .filter_map(|o| match o {
            ExportOutcome::Success { elapsed_ms, .. } => Some(*elapsed_ms as f64 / 1000.0),
            _ => None,
        })
        .collect();
    if let Some((mean, median, p25, p75)) = metrics::compute_metrics(&session_secs) {
        lines.push(format!(
            "Session time: avg {:.2} med {:.2} p25 {:.2} p75 {:.2} s",
            mean, median, p25, p75
        ));
    }

    let failures: Vec<&ExportOutcome> = report.outcomes.iter().filter(|o| o.is_failure()).collect();
    if !failures.is_empty() {
        lines.push("Failed:".to_string());
        for o in failures {
            if let ExportOutcome::Failure {
                time_point,
                group,
                reason,
            } = o
            {
                lines.push(format!("  t={time_point} group={group}: {}", reason.to_message()));
            }
        }
    }

    if let Some(aborted) = report.aborted.as_ref() {
        lines.push(format!("ABORTED ({:?}): {}", aborted.kind, aborted.message));
    }

    TextSummary { lines }
}
