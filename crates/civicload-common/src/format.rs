//! Human-readable formatting for progress and report lines

use std::time::Duration;

/// Format a count with thousands separators: `1234567` -> `"1,234,567"`
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Rows per second over `elapsed`; zero when no time has passed
pub fn rows_per_sec(rows: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        rows as f64 / secs
    } else {
        0.0
    }
}

/// Format a throughput: `"12,345/s"`
pub fn format_rate(rows: u64, elapsed: Duration) -> String {
    format!("{}/s", format_count(rows_per_sec(rows, elapsed).round() as u64))
}

/// Format a duration: `"4.2s"` under a minute, `"3m 07s"` above
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let whole = elapsed.as_secs();
        format!("{}m {:02}s", whole / 60, whole % 60)
    }
}
