use crate::model::{AveragingWindow, TimeRange};

/// Averaging window `[t-1, t+1]` around `t`, clamped to the global range.
pub fn averaging_window(t: i64, range: &TimeRange) -> AveragingWindow {
    AveragingWindow {
        tmin: range.start.max(t.saturating_sub(1)),
        tmax: range.end.min(t.saturating_add(1)),
    }
}
