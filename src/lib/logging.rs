//! Formatting helpers for log output.

use std::time::Duration;

use log::info;

use crate::sort::MergeStats;

/// Formats a count with thousands separators.
///
/// ```
/// use lazybam::logging::format_count;
///
/// assert_eq!(format_count(1_234_567), "1,234,567");
/// assert_eq!(format_count(12), "12");
/// ```
#[must_use]
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Formats a duration in human-readable form, e.g. "45s", "2m 15s", "1h 30m".
///
/// ```
/// use lazybam::logging::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(135)), "2m 15s");
/// ```
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let (mins, rem) = (secs / 60, secs % 60);
        if rem == 0 { format!("{mins}m") } else { format!("{mins}m {rem}s") }
    } else {
        let (hours, mins) = (secs / 3600, (secs % 3600) / 60);
        if mins == 0 { format!("{hours}h") } else { format!("{hours}h {mins}m") }
    }
}

/// The one-line summary logged when a merge completes.
#[must_use]
pub fn merge_summary(stats: &MergeStats, elapsed: Duration) -> String {
    let mut line = format!(
        "Merged {} records from {} inputs ({} runs) in {}",
        format_count(stats.records),
        format_count(stats.inputs as u64),
        format_count(stats.runs as u64),
        format_duration(elapsed)
    );
    if let Some(index) = &stats.index_path {
        line.push_str(&format!("; index: {}", index.display()));
    }
    line
}

pub fn log_merge_summary(stats: &MergeStats, elapsed: Duration) {
    info!("{}", merge_summary(stats, elapsed));
}
