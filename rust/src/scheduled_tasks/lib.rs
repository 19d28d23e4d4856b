use chrono::Duration;

use crate::utils::get_current_human_readable_time;
use crate::ServerState;

/// How long a post may sit in processing before it's considered abandoned.
pub const STALE_PROCESSING_AGE: Duration = Duration::minutes(10);

/// Deletes posts whose creation request died midway, leaving them in processing forever.
/// Returns how many were removed.
pub async fn clean_stale_processing_posts(state: &ServerState) -> u64 {
    tracing::info!(
        "[CLEAN STALE POSTS] System time is {}, cleaning up abandoned posts.",
        get_current_human_readable_time()
    );

    match state.db.delete_stale_processing_posts(STALE_PROCESSING_AGE).await {
        Ok(posts_removed) => {
            tracing::info!("[CLEAN STALE POSTS] Cleanup complete, {posts_removed} posts removed.");
            posts_removed
        }
        Err(err) => {
            tracing::error!(error = %err, "[CLEAN STALE POSTS] Failed to clean up posts!");
            0
        }
    }
}
