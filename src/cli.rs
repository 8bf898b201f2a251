use crate::engine::groups;
use crate::engine::session::ProcessSession;
use crate::error::ConfigError;
use crate::model::{BatchConfig, BatchEvent, BatchReport, ExportOutcome, TimeRange};
use crate::orchestrator::{self, BatchControl};
use crate::storage;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::error;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

type OutputTx = mpsc::UnboundedSender<OutputLine>;

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (OutputTx, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "fds2ascii-batch",
    version,
    about = "Serial fds2ascii batch exporter for time-averaged SLCF CSVs"
)]
pub struct Cli {
    /// Path to the fds2ascii executable (the file itself, not its folder)
    #[arg(long = "fds2ascii", value_name = "PATH")]
    pub fds2ascii: PathBuf,

    /// Results folder (where the .sf/.smv files live)
    #[arg(long, value_name = "DIR")]
    pub results: PathBuf,

    /// Output root folder; CSVs land in <out>/group_<k>/<t>.csv
    #[arg(long, value_name = "DIR")]
    pub out: PathBuf,

    /// Job ID string (CHID)
    #[arg(long)]
    pub chid: String,

    /// Time range, e.g. 0-200
    #[arg(long, value_name = "RANGE")]
    pub time: String,

    /// Total number of slice variables available
    #[arg(long, value_name = "N")]
    pub vars: u32,

    /// Variables per group
    #[arg(long, default_value_t = 9, value_name = "G")]
    pub group_size: u32,

    /// Groups to extract, e.g. '1' or '1-5' or '1,3,10'
    #[arg(long, value_name = "SPEC")]
    pub groups: String,

    /// Kill an fds2ascii session that runs longer than this (e.g. 5m)
    #[arg(long)]
    pub timeout: Option<humantime::Duration>,

    /// Re-export time points whose CSV already exists
    #[arg(long)]
    pub overwrite: bool,

    /// Print every prompt script without launching fds2ascii
    #[arg(long, conflicts_with_all = ["json", "silent"])]
    pub dry_run: bool,

    /// Print the batch report as JSON instead of a text summary
    #[arg(long)]
    pub json: bool,

    /// Run silently: suppress all output except errors (for cron usage)
    #[arg(long, conflicts_with = "json")]
    pub silent: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Export the batch report as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Export the batch report as CSV
    #[arg(long)]
    pub export_csv: Option<PathBuf>,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,

    /// Only re-run the exports that failed in this earlier JSON report
    #[arg(long, value_name = "REPORT")]
    pub retry_failed: Option<PathBuf>,
}

/// How a run ended, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Clean,
    Failures,
    Aborted,
}

impl RunStatus {
    pub fn from_report(report: &BatchReport) -> Self {
        if report.aborted.is_some() {
            RunStatus::Aborted
        } else if report.failed() > 0 {
            RunStatus::Failures
        } else {
            RunStatus::Clean
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Clean => 0,
            RunStatus::Failures => 1,
            RunStatus::Aborted => 2,
        }
    }
}

pub async fn run(args: Cli) -> Result<RunStatus> {
    let (out_tx, out_handle) = if args.silent {
        (None, None)
    } else {
        let (tx, handle) = spawn_output_writer();
        (Some(tx), Some(handle))
    };

    let status = run_with_output(&args, out_tx.as_ref()).await;

    drop(out_tx);
    if let Some(handle) = out_handle {
        let _ = handle.await;
    }
    status
}

async fn run_with_output(args: &Cli, out: Option<&OutputTx>) -> Result<RunStatus> {
    let report = match build_config(args) {
        Err(e) => {
            error!(error = %e, "invalid configuration, nothing exported");
            BatchReport::aborted(None, e.to_abort_reason())
        }
        Ok(mut cfg) => {
            if let Some(path) = args.retry_failed.as_deref() {
                let previous = storage::load_report(path).context("failed to load --retry-failed report")?;
                let pairs = previous.failed_pairs();
                if pairs.is_empty() {
                    send(
                        out,
                        OutputLine::Stderr(format!(
                            "Nothing to retry: {} has no failed exports",
                            path.display()
                        )),
                    );
                    return Ok(RunStatus::Clean);
                }
                send(
                    out,
                    OutputLine::Stderr(format!(
                        "Retrying {} failed exports from {}",
                        pairs.len(),
                        path.display()
                    )),
                );
                cfg.retry_filter = Some(pairs);
            }

            if args.dry_run {
                print_plan(&cfg, out);
                return Ok(RunStatus::Clean);
            }

            execute(args, cfg, out).await
        }
    };

    present_report(args, &report, out)?;
    Ok(RunStatus::from_report(&report))
}

/// Build a `BatchConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> Result<BatchConfig, ConfigError> {
    let chid = args.chid.trim().trim_matches('"').to_string();
    if chid.is_empty() {
        return Err(ConfigError::Invalid("CHID must not be empty".into()));
    }
    let time_range: TimeRange = args.time.parse()?;
    if args.vars < 1 {
        return Err(ConfigError::Invalid(format!(
            "--vars must be >= 1, got {}",
            args.vars
        )));
    }
    let groups = groups::partition(args.vars, args.group_size, &args.groups)?;

    Ok(BatchConfig {
        executable: resolve_path(&args.fds2ascii),
        results_dir: resolve_path(&args.results),
        output_dir: resolve_path(&args.out),
        chid,
        time_range,
        variable_count: args.vars,
        group_size: args.group_size,
        group_spec: args.groups.trim().to_string(),
        groups,
        timeout: args.timeout.map(Duration::from),
        overwrite: args.overwrite,
        retry_filter: None,
    })
}

/// Expand `~` and make relative paths absolute. The child runs in another
/// directory, so a relative executable path would resolve differently there.
fn resolve_path(p: &Path) -> PathBuf {
    let expanded = match p.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| p.to_path_buf()),
        Err(_) => p.to_path_buf(),
    };
    if expanded.is_absolute() {
        return expanded;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&expanded))
        .unwrap_or(expanded)
}

fn send(out: Option<&OutputTx>, line: OutputLine) {
    if let Some(tx) = out {
        let _ = tx.send(line);
    }
}

/// Run the batch on this task while rendering its progress events.
async fn execute(args: &Cli, cfg: BatchConfig, out: Option<&OutputTx>) -> BatchReport {
    let session = ProcessSession::new(&cfg);
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<BatchEvent>();
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<BatchControl>();

    // First Ctrl-C stops after the export in flight, a second one exits.
    let signal_out = out.cloned();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_tx.send(BatchControl::Stop);
            send(
                signal_out.as_ref(),
                OutputLine::Stderr(
                    "Stopping after the current export (Ctrl-C again to exit now)".into(),
                ),
            );
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    let show_progress = !args.json;
    let controller = orchestrator::run_batch(&cfg, &session, evt_tx, ctrl_rx);
    let presenter = async {
        while let Some(ev) = evt_rx.recv().await {
            if show_progress {
                for line in render_event(&ev) {
                    send(out, OutputLine::Stderr(line));
                }
            }
        }
    };

    let (report, ()) = tokio::join!(controller, presenter);
    signal_task.abort();
    report
}

fn render_event(ev: &BatchEvent) -> Vec<String> {
    match ev {
        BatchEvent::BatchStarted { .. } => Vec::new(),
        BatchEvent::ExportStarted {
            index,
            total,
            time_point,
            group,
            window,
        } => vec![format!(
            "[{index}/{total}] t={time_point} group={} avg=[{}, {}]",
            group.number, window.tmin, window.tmax
        )],
        BatchEvent::ExportFinished { outcome } => match outcome.as_ref() {
            ExportOutcome::Success { path, .. } => vec![format!("  -> {}", path.display())],
            ExportOutcome::Skipped { path, .. } => {
                vec![format!("  [SKIP] {} already exists", path.display())]
            }
            ExportOutcome::Failure { reason, .. } => {
                let mut lines = vec![format!("  FAILED: {}", reason.to_message())];
                if let Some(diag) = reason.diagnostics() {
                    lines.extend(diag.lines().map(|l| format!("    {l}")));
                }
                lines
            }
        },
        BatchEvent::Info(msg) => vec![msg.clone()],
        BatchEvent::BatchFinished { aborted } => aborted
            .iter()
            .map(|r| format!("Batch aborted: {}", r.message))
            .collect(),
    }
}

fn print_plan(cfg: &BatchConfig, out: Option<&OutputTx>) {
    let exports = orchestrator::plan(cfg);
    for e in &exports {
        send(
            out,
            OutputLine::Stdout(format!(
                "# t={} group={} avg=[{}] -> {}",
                e.time_point,
                e.group.number,
                e.window,
                e.final_path.display()
            )),
        );
        for line in e.script.lines() {
            send(out, OutputLine::Stdout(line.clone()));
        }
    }
    send(
        out,
        OutputLine::Stderr(format!("Dry run: {} exports planned", exports.len())),
    );
}

/// Post-process the report and print it in the selected mode.
fn present_report(args: &Cli, report: &BatchReport, out: Option<&OutputTx>) -> Result<()> {
    let processed = orchestrator::process_batch_completion(args, report);
    for msg in processed.export_messages {
        send(out, OutputLine::Stderr(msg));
    }
    if let Some(p) = processed.auto_saved_path {
        send(out, OutputLine::Stderr(format!("Saved: {}", p.display())));
    }

    if args.json {
        let json = serde_json::to_string_pretty(report)?;
        send(out, OutputLine::Stdout(json));
    } else {
        let summary = crate::text_summary::build_text_summary(report);
        for line in summary.lines {
            send(out, OutputLine::Stdout(line));
        }
    }
    Ok(())
}
