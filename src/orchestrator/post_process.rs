//! Post-run processing utilities.
//!
//! Handles exports and auto-save after a batch ends, aborted or not.

use crate::cli::Cli;
use crate::model::BatchReport;
use crate::storage;

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedBatch {
    pub export_messages: Vec<String>,
    pub auto_saved_path: Option<std::path::PathBuf>,
}

/// Process a finished batch: auto-save the report and write requested exports.
pub(crate) fn process_batch_completion(args: &Cli, report: &BatchReport) -> ProcessedBatch {
    let mut export_messages = Vec::new();

    let auto_saved_path = if args.auto_save {
        match storage::save_report(report) {
            Ok(p) => Some(p),
            Err(e) => {
                export_messages.push(format!("Auto-save failed: {e:#}"));
                None
            }
        }
    } else {
        None
    };

    if let Some(export_path) = args.export_json.as_deref() {
        match storage::export_json(export_path, report) {
            Ok(_) => export_messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }
    if let Some(export_path) = args.export_csv.as_deref() {
        match storage::export_csv(export_path, report) {
            Ok(_) => export_messages.push(format!("Exported CSV: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export CSV failed: {e:#}")),
        }
    }

    ProcessedBatch {
        export_messages,
        auto_saved_path,
    }
}
