//! Formatting utilities

/// Format a duration as `1h 2m 3s`, or `2m 3s` under an hour
pub fn duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let mins = (total / 60) % 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else {
        format!("{}m {}s", mins, secs)
    }
}

/// Format a countdown reading as `MM:SS`
pub fn clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Render a fixed-width progress bar for a fraction in `0.0..=1.0`
pub fn progress_bar(fraction: f64, width: usize) -> String {
    let fraction = fraction.clamp(0.0, 1.0);
    let filled = ((width as f64) * fraction).round() as usize;
    let empty = width - filled.min(width);
    format!("{}{}", "\u{2588}".repeat(filled.min(width)), "\u{2591}".repeat(empty))
}
