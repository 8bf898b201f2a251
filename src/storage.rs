//! Report persistence: explicit JSON/CSV exports, auto-saved run history, and
//! loading an earlier report back for `--retry-failed`.

use crate::model::{BatchReport, ExportOutcome, FailureReason};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    Ok(())
}

pub fn export_json(path: &Path, report: &BatchReport) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// One row per outcome.
pub fn export_csv(path: &Path, report: &BatchReport) -> Result<()> {
    ensure_parent(path)?;
    let mut out = String::from("time_point,group,status,path,exit_code,reason\n");
    for outcome in &report.outcomes {
        let (status, file, exit_code, reason) = match outcome {
            ExportOutcome::Success { path, .. } => ("success", path.display().to_string(), None, String::new()),
            ExportOutcome::Skipped { path, .. } => ("skipped", path.display().to_string(), None, String::new()),
            ExportOutcome::Failure { reason, .. } => {
                let file = match reason {
                    FailureReason::OutputNotProduced { expected, .. } => expected.display().to_string(),
                    FailureReason::OutputEmpty { path } => path.display().to_string(),
                    _ => String::new(),
                };
                let code = match reason {
                    FailureReason::ToolExecutionFailure { exit_code, .. } => *exit_code,
                    _ => None,
                };
                ("failure", file, code, reason.to_message())
            }
        };
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            outcome.time_point(),
            outcome.group(),
            status,
            csv_field(&file),
            exit_code.map(|c| c.to_string()).unwrap_or_default(),
            csv_field(&reason)
        ));
    }
    fs::write(path, out).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn load_report(path: &Path) -> Result<BatchReport> {
    let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parse report {}", path.display()))
}

fn runs_dir() -> Result<PathBuf> {
    let base = dirs::data_local_dir().context("no local data directory on this platform")?;
    Ok(base.join("fds2ascii-batch").join("runs"))
}

/// Save a report into the local run history and return its path.
pub fn save_report(report: &BatchReport) -> Result<PathBuf> {
    save_report_in(&runs_dir()?, report)
}

fn save_report_in(dir: &Path, report: &BatchReport) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    let chid = report
        .config
        .as_ref()
        .map(|c| c.chid.as_str())
        .unwrap_or("unknown");
    let name = format!(
        "run-{}-{}.json",
        report.timestamp_utc.replace(':', "-"),
        sanitize(chid)
    );
    let path = dir.join(name);
    export_json(&path, report)?;
    Ok(path)
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AbortKind, AbortReason};
    use crate::test_support::config;

    fn sample_report() -> BatchReport {
        BatchReport {
            timestamp_utc: "2026-10-16T08:30:00Z".into(),
            config: Some(config("0-2", 9, 9, "1")),
            outcomes: vec![
                ExportOutcome::Success {
                    time_point: 0,
                    group: 1,
                    path: "/out/group_1/0.csv".into(),
                    elapsed_ms: 12,
                },
                ExportOutcome::Failure {
                    time_point: 1,
                    group: 1,
                    reason: FailureReason::ToolExecutionFailure {
                        exit_code: Some(2),
                        timed_out: false,
                        output_produced: false,
                        diagnostics: "forrtl: severe (24), end-of-file".into(),
                    },
                },
            ],
            aborted: None,
        }
    }

    #[test]
    fn json_report_loads_back_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");

        export_json(&path, &sample_report()).unwrap();
        let loaded = load_report(&path).unwrap();

        assert_eq!(loaded.outcomes, sample_report().outcomes);
        assert_eq!(loaded.failed_pairs().into_iter().collect::<Vec<_>>(), vec![(1, 1)]);
        assert_eq!(loaded.config.map(|c| c.chid), Some("room_fire".to_string()));
    }

    #[test]
    fn csv_has_one_row_per_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");

        export_csv(&path, &sample_report()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let rows: Vec<&str> = text.lines().collect();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], "0,1,success,/out/group_1/0.csv,,");
        assert_eq!(rows[2], "1,1,failure,,2,fds2ascii exited with 2");
    }

    #[test]
    fn csv_fields_are_quoted_when_needed() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn saved_report_name_is_filesystem_safe() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = BatchReport::aborted(
            None,
            AbortReason {
                kind: AbortKind::InvalidTimeRange,
                message: "end must be >= start".into(),
            },
        );
        report.timestamp_utc = "2026-10-16T08:30:00Z".into();

        let path = save_report_in(dir.path(), &report).unwrap();

        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("run-2026-10-16T08-30-00Z-unknown.json")
        );
        assert!(load_report(&path).unwrap().aborted.is_some());
    }
}
