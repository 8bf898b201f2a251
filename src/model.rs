use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Fully resolved configuration for one batch run.
///
/// Built once before the first export and only ever handed out by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub executable: PathBuf,
    pub results_dir: PathBuf,
    pub output_dir: PathBuf,
    pub chid: String,
    pub time_range: TimeRange,
    pub variable_count: u32,
    pub group_size: u32,
    pub group_spec: String,
    pub groups: Vec<VariableGroup>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub overwrite: bool,
    /// Restrict the run to these (time point, group number) pairs.
    #[serde(default)]
    pub retry_filter: Option<BTreeSet<(i64, u32)>>,
}

impl BatchConfig {
    /// Directory that receives the collected CSVs for one group.
    pub fn group_dir(&self, group: &VariableGroup) -> PathBuf {
        self.output_dir.join(format!("group_{}", group.number))
    }
}

/// Inclusive range of integer time points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

/// Upper bound on the number of time points in one batch.
pub const MAX_TIME_POINTS: u64 = 1_000_000;

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidTimeRange {
            input: format!("{start}-{end}"),
            reason,
        };
        if end < start {
            return Err(invalid(format!("end must be >= start, got {start}..{end}")));
        }
        let points = end.abs_diff(start).saturating_add(1);
        if points > MAX_TIME_POINTS {
            return Err(invalid(format!(
                "range covers {points} time points, at most {MAX_TIME_POINTS} are allowed"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn points(&self) -> std::ops::RangeInclusive<i64> {
        self.start..=self.end
    }

    /// Number of time points. Saturates for ranges that bypassed `new`.
    pub fn len(&self) -> usize {
        if self.end < self.start {
            return 0;
        }
        usize::try_from(self.end.abs_diff(self.start).saturating_add(1)).unwrap_or(usize::MAX)
    }
}

impl FromStr for TimeRange {
    type Err = ConfigError;

    /// Accepts `0-200`, `0 200`, `0,200` and `0~200`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ConfigError::InvalidTimeRange {
            input: s.to_string(),
            reason,
        };
        let tokens: Vec<&str> = s
            .trim()
            .split(|c: char| c.is_whitespace() || matches!(c, ',' | '-' | '~'))
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.len() != 2 {
            return Err(invalid("expected two time points, e.g. 0-200".into()));
        }
        let parse = |tok: &str| {
            tok.parse::<i64>()
                .map_err(|e| invalid(format!("{tok:?} is not an integer: {e}")))
        };
        let (start, end) = (parse(tokens[0])?, parse(tokens[1])?);
        TimeRange::new(start, end).map_err(|e| match e {
            ConfigError::InvalidTimeRange { reason, .. } => invalid(reason),
            other => other,
        })
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Time window handed to fds2ascii for averaging around one time point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AveragingWindow {
    pub tmin: i64,
    pub tmax: i64,
}

impl fmt::Display for AveragingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.tmin, self.tmax)
    }
}

/// Contiguous block of 1-based variable indices exported in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableGroup {
    pub number: u32,
    pub first: u32,
    pub last: u32,
}

impl VariableGroup {
    pub fn indices(&self) -> std::ops::RangeInclusive<u32> {
        self.first..=self.last
    }

    pub fn len(&self) -> u32 {
        self.last - self.first + 1
    }
}

/// Every stdin line fds2ascii reads for exactly one export, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptScript {
    lines: Vec<String>,
}

impl PromptScript {
    pub(crate) fn from_lines(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Bytes written to the child's stdin: each line newline-terminated.
    pub fn to_stdin_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out.into_bytes()
    }
}

/// One (time point, group) pair scheduled for export.
#[derive(Debug, Clone)]
pub struct PlannedExport {
    pub time_point: i64,
    pub group: VariableGroup,
    pub window: AveragingWindow,
    pub script: PromptScript,
    /// Where fds2ascii writes the file, relative names resolve against the results dir.
    pub staged_path: PathBuf,
    pub final_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportOutcome {
    Success {
        time_point: i64,
        group: u32,
        path: PathBuf,
        elapsed_ms: u64,
    },
    Skipped {
        time_point: i64,
        group: u32,
        path: PathBuf,
    },
    Failure {
        time_point: i64,
        group: u32,
        reason: FailureReason,
    },
}

impl ExportOutcome {
    pub fn time_point(&self) -> i64 {
        match self {
            ExportOutcome::Success { time_point, .. }
            | ExportOutcome::Skipped { time_point, .. }
            | ExportOutcome::Failure { time_point, .. } => *time_point,
        }
    }

    pub fn group(&self) -> u32 {
        match self {
            ExportOutcome::Success { group, .. }
            | ExportOutcome::Skipped { group, .. }
            | ExportOutcome::Failure { group, .. } => *group,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ExportOutcome::Failure { .. })
    }
}

/// Why a single export failed. None of these stop the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    ToolExecutionFailure {
        exit_code: Option<i32>,
        #[serde(default)]
        timed_out: bool,
        #[serde(default)]
        output_produced: bool,
        diagnostics: String,
    },
    OutputNotProduced {
        expected: PathBuf,
        diagnostics: String,
    },
    OutputEmpty {
        path: PathBuf,
    },
    StagingFailure {
        message: String,
    },
}

impl FailureReason {
    /// Render a one-line description for summaries and logs.
    pub fn to_message(&self) -> String {
        match self {
            FailureReason::ToolExecutionFailure {
                exit_code,
                timed_out: true,
                ..
            } => match exit_code {
                Some(code) => format!("fds2ascii timed out (exit code {code})"),
                None => "fds2ascii timed out and was killed".to_string(),
            },
            FailureReason::ToolExecutionFailure {
                exit_code,
                output_produced,
                ..
            } => {
                let code = exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".into());
                if *output_produced {
                    format!("fds2ascii exited with {code} (an output file was still written)")
                } else {
                    format!("fds2ascii exited with {code}")
                }
            }
            FailureReason::OutputNotProduced { expected, .. } => {
                format!("output not produced: {}", expected.display())
            }
            FailureReason::OutputEmpty { path } => format!("output is empty: {}", path.display()),
            FailureReason::StagingFailure { message } => format!("staging failed: {message}"),
        }
    }

    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            FailureReason::ToolExecutionFailure { diagnostics, .. }
            | FailureReason::OutputNotProduced { diagnostics, .. } => Some(diagnostics.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortKind {
    ExecutableNotFound,
    InvalidGroupSpecification,
    InvalidTimeRange,
    InvalidConfiguration,
    ResultsDirectoryMissing,
    OutputDirectory,
    LaunchFailure,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortReason {
    pub kind: AbortKind,
    pub message: String,
}

/// Everything a finished (or aborted) batch has to say.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    #[serde(default)]
    pub timestamp_utc: String,
    #[serde(default)]
    pub config: Option<BatchConfig>,
    pub outcomes: Vec<ExportOutcome>,
    #[serde(default)]
    pub aborted: Option<AbortReason>,
}

impl BatchReport {
    pub fn aborted(config: Option<BatchConfig>, reason: AbortReason) -> Self {
        Self {
            timestamp_utc: now_utc(),
            config,
            outcomes: Vec::new(),
            aborted: Some(reason),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ExportOutcome::Success { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ExportOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    /// (time point, group) pairs that failed, for `--retry-failed`.
    pub fn failed_pairs(&self) -> BTreeSet<(i64, u32)> {
        self.outcomes
            .iter()
            .filter(|o| o.is_failure())
            .map(|o| (o.time_point(), o.group()))
            .collect()
    }
}

pub(crate) fn now_utc() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

/// Progress events emitted by the batch controller and consumed by CLI layers.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    BatchStarted {
        total: usize,
    },
    ExportStarted {
        index: usize,
        total: usize,
        time_point: i64,
        group: VariableGroup,
        window: AveragingWindow,
    },
    ExportFinished {
        // Box to keep BatchEvent small; failure diagnostics can be large.
        outcome: Box<ExportOutcome>,
    },
    Info(String),
    BatchFinished {
        aborted: Option<AbortReason>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_range_accepts_common_separators() {
        for input in ["0-200", "0 200", "0,200", "0~200", "  0 - 200 "] {
            let r: TimeRange = input.parse().unwrap();
            assert_eq!(r, TimeRange { start: 0, end: 200 }, "input {input:?}");
        }
    }

    #[test]
    fn time_range_rejects_inverted_and_garbage() {
        assert!(matches!(
            "10-5".parse::<TimeRange>(),
            Err(ConfigError::InvalidTimeRange { .. })
        ));
        assert!("10".parse::<TimeRange>().is_err());
        assert!("a-b".parse::<TimeRange>().is_err());
        assert!("1-2-3".parse::<TimeRange>().is_err());
    }

    #[test]
    fn time_range_rejects_unbounded_spans() {
        let err = "0-9223372036854775807".parse::<TimeRange>().unwrap_err();
        assert!(
            matches!(&err, ConfigError::InvalidTimeRange { input, reason }
                if input == "0-9223372036854775807" && reason.contains("at most")),
            "{err}"
        );
        assert!(TimeRange::new(i64::MIN, i64::MAX).is_err());
        assert!(TimeRange::new(0, MAX_TIME_POINTS as i64).is_err());

        let widest = TimeRange::new(1, MAX_TIME_POINTS as i64).unwrap();
        assert_eq!(widest.len(), MAX_TIME_POINTS as usize);

        // Deserialized ranges skip `new`; length still must not overflow.
        let raw: TimeRange =
            serde_json::from_str(r#"{"start":-9223372036854775808,"end":9223372036854775807}"#)
                .unwrap();
        assert_eq!(raw.len(), usize::try_from(u64::MAX).unwrap_or(usize::MAX));
    }

    #[test]
    fn single_point_range_has_length_one() {
        let r: TimeRange = "7-7".parse().unwrap();
        assert_eq!(r.len(), 1);
        assert_eq!(r.points().collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn stdin_bytes_terminate_every_line() {
        let script = PromptScript::from_lines(vec!["a".into(), "b".into()]);
        assert_eq!(script.to_stdin_bytes(), b"a\nb\n");
    }

    #[test]
    fn report_counts_and_failed_pairs() {
        let report = BatchReport {
            timestamp_utc: String::new(),
            config: None,
            outcomes: vec![
                ExportOutcome::Success {
                    time_point: 0,
                    group: 1,
                    path: "g/0.csv".into(),
                    elapsed_ms: 3,
                },
                ExportOutcome::Failure {
                    time_point: 1,
                    group: 2,
                    reason: FailureReason::OutputEmpty {
                        path: "g/1.csv".into(),
                    },
                },
                ExportOutcome::Skipped {
                    time_point: 2,
                    group: 1,
                    path: "g/2.csv".into(),
                },
            ],
            aborted: None,
        };
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed_pairs(), BTreeSet::from([(1, 2)]));
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = ExportOutcome::Failure {
            time_point: 4,
            group: 1,
            reason: FailureReason::StagingFailure {
                message: "disk full".into(),
            },
        };
        let v = serde_json::to_value(&outcome).unwrap();
        assert_eq!(v["status"], "failure");
        assert_eq!(v["reason"]["kind"], "staging_failure");
    }
}
