pub mod groups;
pub mod script;
pub mod session;
pub mod verify;
pub mod window;

use crate::error::SessionError;
use crate::model::{BatchConfig, ExportOutcome, FailureReason, PlannedExport};
use session::{SessionExit, SessionRunner};
use std::path::Path;
use tracing::{debug, warn};
use verify::Verification;

/// Runs single exports: one planned (time point, group) pair at a time.
pub struct ExportEngine<'a, S> {
    cfg: &'a BatchConfig,
    session: &'a S,
}

impl<'a, S: SessionRunner> ExportEngine<'a, S> {
    pub fn new(cfg: &'a BatchConfig, session: &'a S) -> Self {
        Self { cfg, session }
    }

    /// Run one export and classify the result.
    ///
    /// `Err` is reserved for problems that make every later export fail too;
    /// everything specific to this time point comes back as an outcome.
    pub async fn run(&self, export: &PlannedExport) -> Result<ExportOutcome, SessionError> {
        let time_point = export.time_point;
        let group = export.group.number;

        if !self.cfg.overwrite && export.final_path.exists() {
            debug!(time_point, group, path = %export.final_path.display(), "output exists, skipping");
            return Ok(ExportOutcome::Skipped {
                time_point,
                group,
                path: export.final_path.clone(),
            });
        }

        let staging_failure = |action: &str, e: std::io::Error| ExportOutcome::Failure {
            time_point,
            group,
            reason: FailureReason::StagingFailure {
                message: format!("{action}: {e}"),
            },
        };

        match verify::clear_stale(&export.staged_path) {
            Ok(true) => warn!(
                time_point,
                group,
                path = %export.staged_path.display(),
                "removed pre-existing file in the results folder before export"
            ),
            Ok(false) => {}
            Err(e) => {
                return Ok(staging_failure(
                    &format!("remove stale {}", export.staged_path.display()),
                    e,
                ));
            }
        }

        let output = self.session.run(&export.script).await?;

        let collected = match verify::collect(&export.staged_path, &export.final_path) {
            Ok(collected) => collected,
            Err(e) => {
                return Ok(staging_failure(
                    &format!(
                        "move {} to {}",
                        export.staged_path.display(),
                        export.final_path.display()
                    ),
                    e,
                ));
            }
        };

        // Always verify, even after a failed exit, so the report says whether a file appeared.
        // A final file left over from an earlier run never counts as this session's output.
        let verification = if collected {
            verify::verify_output(&export.final_path)
        } else {
            Verification::Missing(export.final_path.clone())
        };

        let reason = match (output.exit, verification) {
            (SessionExit::Success, Verification::Present(path)) => {
                return Ok(ExportOutcome::Success {
                    time_point,
                    group,
                    path,
                    elapsed_ms: output.elapsed.as_millis() as u64,
                });
            }
            (SessionExit::Success, Verification::Missing(expected)) => {
                FailureReason::OutputNotProduced {
                    expected,
                    diagnostics: output.diagnostics(),
                }
            }
            (SessionExit::Success, Verification::Empty(path)) => {
                discard(&path);
                FailureReason::OutputEmpty { path }
            }
            (exit, verification) => {
                let output_produced = !matches!(verification, Verification::Missing(_));
                if output_produced {
                    discard(&export.final_path);
                }
                FailureReason::ToolExecutionFailure {
                    exit_code: match exit {
                        SessionExit::Failed(code) => code,
                        _ => None,
                    },
                    timed_out: matches!(exit, SessionExit::TimedOut(_)),
                    output_produced,
                    diagnostics: output.diagnostics(),
                }
            }
        };

        Ok(ExportOutcome::Failure {
            time_point,
            group,
            reason,
        })
    }
}

/// Drop untrustworthy output so a re-run regenerates it instead of skipping it.
fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "failed to remove rejected output");
    }
}
