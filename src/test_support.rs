use crate::engine::groups::partition;
use crate::model::{BatchConfig, TimeRange};

pub(crate) fn config(range: &str, n: u32, g: u32, spec: &str) -> BatchConfig {
    BatchConfig {
        executable: "/opt/fds/fds2ascii".into(),
        results_dir: "/data/results".into(),
        output_dir: "/data/out".into(),
        chid: "room_fire".into(),
        time_range: range.parse::<TimeRange>().unwrap(),
        variable_count: n,
        group_size: g,
        group_spec: spec.into(),
        groups: partition(n, g, spec).unwrap(),
        timeout: None,
        overwrite: false,
        retry_filter: None,
    }
}
