use std::collections::BTreeSet;

use crate::error::ConfigError;
use crate::model::VariableGroup;

/// Resolve a group specification such as `1`, `1-5` or `1-3,7,10-12` into
/// variable index blocks of `group_size`, ascending and without duplicates.
///
/// A final group that runs past `variable_count` is shortened to end at it;
/// a group that starts past it is rejected.
pub fn partition(
    variable_count: u32,
    group_size: u32,
    spec: &str,
) -> Result<Vec<VariableGroup>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidGroupSpecification {
        spec: spec.to_string(),
        reason,
    };

    if group_size < 1 {
        return Err(invalid("group size must be >= 1".into()));
    }
    if variable_count < 1 {
        return Err(invalid("variable count must be >= 1".into()));
    }

    let numbers = parse_group_numbers(spec).map_err(invalid)?;

    numbers
        .into_iter()
        .map(|number| {
            let first = (u64::from(number) - 1) * u64::from(group_size) + 1;
            let last = u64::from(number) * u64::from(group_size);
            if first > u64::from(variable_count) {
                return Err(invalid(format!(
                    "group {number} starts at variable {first}, but only {variable_count} variables exist"
                )));
            }
            Ok(VariableGroup {
                number,
                first: first as u32,
                last: last.min(u64::from(variable_count)) as u32,
            })
        })
        .collect()
}

fn parse_group_numbers(spec: &str) -> Result<BTreeSet<u32>, String> {
    let mut numbers = BTreeSet::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((a, b)) => {
                let (a, b) = (parse_number(a)?, parse_number(b)?);
                if b < a {
                    return Err(format!("range {part:?} is inverted"));
                }
                numbers.extend(a..=b);
            }
            None => {
                numbers.insert(parse_number(part)?);
            }
        }
    }
    if numbers.is_empty() {
        return Err("no groups requested".into());
    }
    Ok(numbers)
}

fn parse_number(token: &str) -> Result<u32, String> {
    let token = token.trim();
    let n: u32 = token
        .parse()
        .map_err(|_| format!("{token:?} is not a group number"))?;
    if n < 1 {
        return Err(format!("group numbers start at 1, got {n}"));
    }
    Ok(n)
}
