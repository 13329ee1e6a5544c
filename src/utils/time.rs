/// `mm:ss` display of a countdown; minutes are not wrapped into hours.
pub fn format_countdown(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
