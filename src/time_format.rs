use std::time::Duration;

/// Format a media time for elapsed/duration labels: `MM:SS`, or `H:MM:SS`
/// from one hour up. Sub-second parts are truncated.
pub fn format_timestamp(time: Duration) -> String {
    let total = time.as_secs();
    let hours = total / 3600;
    let minutes = (total / 60) % 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
