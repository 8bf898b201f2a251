//! Batch-level orchestration.
//!
//! This module owns planning and the serial run loop over time points, plus
//! post-run processing such as exports and auto-save. CLI layers call into
//! this module to keep responsibilities separated.

mod controller;
mod post_process;

pub use controller::{preflight, run_batch, BatchControl};
pub(crate) use post_process::process_batch_completion;

use crate::engine::{script, window};
use crate::model::{BatchConfig, PlannedExport};

/// Expand a config into the ordered exports it asks for: time points
/// ascending, and within each time point the groups ascending.
pub fn plan(cfg: &BatchConfig) -> Vec<PlannedExport> {
    let mut exports = Vec::new();
    for t in cfg.time_range.points() {
        let window = window::averaging_window(t, &cfg.time_range);
        for group in &cfg.groups {
            if let Some(filter) = &cfg.retry_filter {
                if !filter.contains(&(t, group.number)) {
                    continue;
                }
            }
            let file_name = script::output_file_name(t);
            exports.push(PlannedExport {
                time_point: t,
                group: *group,
                window,
                script: script::build_script(cfg, t, window, group),
                staged_path: cfg.results_dir.join(&file_name),
                final_path: cfg.group_dir(group).join(&file_name),
            });
        }
    }
    exports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::config;
    use std::collections::BTreeSet;

    #[test]
    fn plans_one_export_per_time_point_and_group() {
        let cfg = config("0-10", 9, 9, "1");
        let exports = plan(&cfg);
        assert_eq!(exports.len(), 11);
        for (i, e) in exports.iter().enumerate() {
            assert_eq!(e.time_point, i as i64);
            assert_eq!(e.script.len(), 16);
            assert_eq!(
                e.final_path,
                std::path::Path::new("/data/out/group_1").join(format!("{i}.csv"))
            );
            assert_eq!(
                e.staged_path,
                std::path::Path::new("/data/results").join(format!("{i}.csv"))
            );
        }
    }

    #[test]
    fn groups_are_inner_loop() {
        let cfg = config("0-1", 27, 9, "3,1");
        let order: Vec<(i64, u32)> = plan(&cfg)
            .iter()
            .map(|e| (e.time_point, e.group.number))
            .collect();
        assert_eq!(order, vec![(0, 1), (0, 3), (1, 1), (1, 3)]);
    }

    #[test]
    fn retry_filter_limits_the_plan() {
        let mut cfg = config("0-10", 27, 9, "1-3");
        cfg.retry_filter = Some(BTreeSet::from([(4, 2), (9, 1), (50, 1)]));
        let order: Vec<(i64, u32)> = plan(&cfg)
            .iter()
            .map(|e| (e.time_point, e.group.number))
            .collect();
        assert_eq!(order, vec![(4, 2), (9, 1)]);
    }
}
