pub mod s3;
pub mod sql;

/// Returns the current UTC time and date in a human-readable format.
pub fn get_current_human_readable_time() -> String {
    chrono::Utc::now().format("%Y-%m-%d %T").to_string()
}
