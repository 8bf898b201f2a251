//! Prompt script for one fds2ascii export.
//!
//! fds2ascii asks, in this order:
//!
//! 1. CHID
//! 2. file type (`2` = SLCF)
//! 3. sampling factor (`1` = all data)
//! 4. domain limit (`n` = not limited)
//! 5. averaging window, `tmin tmax` on one line
//! 6. number of variables to read
//! 7. each variable index, one per line
//! 8. output file name
//!
//! Any deviation shifts every later answer onto the wrong prompt.

use crate::model::{AveragingWindow, BatchConfig, PromptScript, VariableGroup};

pub const FILE_TYPE_SLCF: &str = "2";
pub const SAMPLING_FACTOR: &str = "1";
pub const DOMAIN_NOT_LIMITED: &str = "n";

/// Name fds2ascii is told to write for time point `t`.
pub fn output_file_name(t: i64) -> String {
    format!("{t}.csv")
}

pub fn build_script(
    cfg: &BatchConfig,
    t: i64,
    window: AveragingWindow,
    group: &VariableGroup,
) -> PromptScript {
    let mut lines = Vec::with_capacity(7 + group.len() as usize);
    lines.push(cfg.chid.clone());
    lines.push(FILE_TYPE_SLCF.to_string());
    lines.push(SAMPLING_FACTOR.to_string());
    lines.push(DOMAIN_NOT_LIMITED.to_string());
    lines.push(window.to_string());
    lines.push(group.len().to_string());
    lines.extend(group.indices().map(|i| i.to_string()));
    lines.push(output_file_name(t));
    PromptScript::from_lines(lines)
}
