//! Compact age strings such as `2h15m` for summary lines.

use chrono::Duration;

const MINUTES_PER_HOUR: i64 = 60;
const MINUTES_PER_DAY: i64 = 24 * MINUTES_PER_HOUR;

/// Format a duration as `{days}d{hours}h{minutes}m`.
///
/// Leading zero segments are dropped, but the minutes segment is always
/// present and nothing is zero-padded: `0m`, `45m`, `1h5m`, `1d0h0m`.
/// Partial minutes are discarded. Negative durations render as `0m`.
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let total = d.num_minutes().max(0);
    let minutes = total % MINUTES_PER_HOUR;
    let hours = (total / MINUTES_PER_HOUR) % 24;
    let days = total / MINUTES_PER_DAY;

    let mut s = format!("{minutes}m");
    if hours > 0 || days > 0 {
        s = format!("{hours}h{s}");
    }
    if days > 0 {
        s = format!("{days}d{s}");
    }
    s
}
