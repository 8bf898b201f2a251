//! Batch run controller.
//!
//! Walks the plan strictly one export at a time: every fds2ascii session must
//! exit before the next one starts, because the tool reads shared result files
//! relative to its working directory. Emits events for presentation layers.

use crate::engine::session::{is_runnable, SessionRunner};
use crate::engine::ExportEngine;
use crate::error::ConfigError;
use crate::model::{
    now_utc, AbortKind, AbortReason, BatchConfig, BatchEvent, BatchReport, ExportOutcome,
};
use std::fs;
use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

/// Commands emitted by CLI layers to control the running batch.
#[derive(Debug, Clone)]
pub enum BatchControl {
    /// Stop before the next export; the one in flight always runs to completion.
    Stop,
}

#[derive(Debug)]
enum BatchState {
    Idle,
    Running { time_point: i64, group: u32 },
    Advancing,
    Aborted(AbortReason),
}

/// Checks that must pass before any session is launched. Creates the output
/// folder and one sub-folder per group.
pub fn preflight(cfg: &BatchConfig) -> Result<(), ConfigError> {
    if !is_runnable(&cfg.executable) {
        return Err(ConfigError::ExecutableNotFound(cfg.executable.clone()));
    }
    if !cfg.results_dir.is_dir() {
        return Err(ConfigError::ResultsDirectoryMissing(cfg.results_dir.clone()));
    }
    if cfg.groups.is_empty() {
        return Err(ConfigError::Invalid("no variable groups to export".into()));
    }
    for dir in std::iter::once(cfg.output_dir.clone())
        .chain(cfg.groups.iter().map(|g| cfg.group_dir(g)))
    {
        fs::create_dir_all(&dir).map_err(|source| ConfigError::OutputDirectory {
            path: dir.clone(),
            source,
        })?;
    }
    Ok(())
}

/// Run every planned export in order and collect one outcome per export.
///
/// Always returns a report. Configuration-level problems end the batch with
/// `aborted` set; per-export failures are recorded and the loop moves on.
pub async fn run_batch<S: SessionRunner>(
    cfg: &BatchConfig,
    session: &S,
    event_tx: UnboundedSender<BatchEvent>,
    mut control_rx: UnboundedReceiver<BatchControl>,
) -> BatchReport {
    let mut report = BatchReport {
        timestamp_utc: now_utc(),
        config: Some(cfg.clone()),
        outcomes: Vec::new(),
        aborted: None,
    };

    if let Err(e) = preflight(cfg) {
        error!(error = %e, "batch aborted before the first export");
        let reason = e.to_abort_reason();
        let _ = event_tx.send(BatchEvent::BatchFinished {
            aborted: Some(reason.clone()),
        });
        report.aborted = Some(reason);
        return report;
    }

    let exports = super::plan(cfg);
    let total = exports.len();
    announce(cfg, total, &event_tx);
    let _ = event_tx.send(BatchEvent::BatchStarted { total });

    let engine = ExportEngine::new(cfg, session);
    let mut state = BatchState::Idle;
    report.outcomes.reserve(total);

    for (i, export) in exports.iter().enumerate() {
        if stop_requested(&mut control_rx) {
            warn!(done = i, total, "stop requested, ending batch");
            state = BatchState::Aborted(AbortReason {
                kind: AbortKind::Interrupted,
                message: format!("stopped by user after {i} of {total} exports"),
            });
            break;
        }

        state = BatchState::Running {
            time_point: export.time_point,
            group: export.group.number,
        };
        debug!(
            time_point = export.time_point,
            group = export.group.number,
            window = %export.window,
            "export starting"
        );
        let _ = event_tx.send(BatchEvent::ExportStarted {
            index: i + 1,
            total,
            time_point: export.time_point,
            group: export.group,
            window: export.window,
        });

        match engine.run(export).await {
            Ok(outcome) => {
                log_outcome(&outcome);
                let _ = event_tx.send(BatchEvent::ExportFinished {
                    outcome: Box::new(outcome.clone()),
                });
                report.outcomes.push(outcome);
                state = BatchState::Advancing;
            }
            Err(e) => {
                if let BatchState::Running { time_point, group } = state {
                    error!(time_point, group, error = %e, "batch aborted");
                }
                state = BatchState::Aborted(e.to_abort_reason());
                break;
            }
        }
    }

    if let BatchState::Aborted(reason) = state {
        report.aborted = Some(reason);
    } else {
        info!(
            succeeded = report.succeeded(),
            skipped = report.skipped(),
            failed = report.failed(),
            "batch completed"
        );
    }
    let _ = event_tx.send(BatchEvent::BatchFinished {
        aborted: report.aborted.clone(),
    });
    report
}

fn stop_requested(control_rx: &mut UnboundedReceiver<BatchControl>) -> bool {
    match control_rx.try_recv() {
        Ok(BatchControl::Stop) => true,
        // A closed control channel just means nobody can ask us to stop.
        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => false,
    }
}

fn announce(cfg: &BatchConfig, total: usize, event_tx: &UnboundedSender<BatchEvent>) {
    let mut lines = vec![
        format!(
            "Time points : {} .. {}  ({} points)",
            cfg.time_range.start,
            cfg.time_range.end,
            cfg.time_range.len()
        ),
        format!(
            "Groups      : {}  ({} groups of up to {} variables)",
            cfg.group_spec,
            cfg.groups.len(),
            cfg.group_size
        ),
    ];
    for g in &cfg.groups {
        lines.push(format!("  group {} -> var indices {}..{}", g.number, g.first, g.last));
    }
    lines.push(format!("Total runs  : {total}"));
    info!(chid = %cfg.chid, total, "batch starting");
    for line in lines {
        let _ = event_tx.send(BatchEvent::Info(line));
    }
}

fn log_outcome(outcome: &ExportOutcome) {
    match outcome {
        ExportOutcome::Success {
            time_point,
            group,
            elapsed_ms,
            ..
        } => info!(time_point, group, elapsed_ms, "export succeeded"),
        ExportOutcome::Skipped {
            time_point, group, ..
        } => info!(time_point, group, "export skipped, output exists"),
        ExportOutcome::Failure {
            time_point,
            group,
            reason,
        } => warn!(time_point, group, reason = %reason.to_message(), "export failed"),
    }
}
