/// Format elapsed call seconds as `mm:ss`. Minutes are not wrapped into
/// hours, so a 100 minute call reads `100:00`.
pub fn format_mm_ss(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
