//! Conversions between `[[[DD:]HH:]MM:]SS` strings and seconds

use crate::error::{JobDbError, Result};

/// Parse `[[[DD:]HH:]MM:]SS` into seconds
pub fn seconds(walltime: &str) -> Result<i64> {
    let fields = walltime
        .trim()
        .split(':')
        .map(|field| field.trim().parse::<i64>())
        .collect::<std::result::Result<Vec<i64>, _>>()
        .map_err(|_| invalid(walltime))?;

    if fields.iter().any(|field| *field < 0) {
        return Err(invalid(walltime));
    }

    let weights: &[i64] = match fields.len() {
        1 => &[1],
        2 => &[60, 1],
        3 => &[3600, 60, 1],
        4 => &[86400, 3600, 60, 1],
        _ => return Err(invalid(walltime)),
    };

    Ok(fields.iter().zip(weights).map(|(value, weight)| value * weight).sum())
}

/// Format seconds as `D:HH:MM:SS`
pub fn format(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let day = seconds / 86400;
    let hour = (seconds % 86400) / 3600;
    let minute = (seconds % 3600) / 60;
    let second = seconds % 60;
    format!("{day}:{hour:02}:{minute:02}:{second:02}")
}

fn invalid(walltime: &str) -> JobDbError {
    JobDbError::Config(format!("walltime {walltime:?} is not [[[DD:]HH:]MM:]SS"))
}
