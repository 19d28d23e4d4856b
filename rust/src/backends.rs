//! # Backends
//!
//! The seams between this server and the systems it leans on: the session service, the
//! database, and object storage. Handlers only ever talk to these traits, so the request
//! logic doesn't care whether it's running against Postgres and S3 or the in-memory
//! doubles the tests use.

use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;

use crate::posts::{NewPost, PageRequest, PostDetails, PostImage, PostListFilter};
use crate::user::{SessionIdentity, User};

#[cfg(test)]
pub mod memory;
mod postgres;
mod s3;

pub use postgres::PostgresBackend;
pub use s3::S3Storage;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("couldn't get a database connection: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("couldn't presign upload: {0}")]
    Presign(String),
    #[error("unexpected row: {0}")]
    InvalidRow(String),
}

/// Maps an opaque session id to whoever owns it.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// Returns None for unknown and expired sessions.
    async fn resolve_session(&self, session_id: &str)
        -> Result<Option<SessionIdentity>, BackendError>;
}

#[async_trait]
pub trait PostDatabase: Send + Sync {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, BackendError>;

    /// Inserts the post row in processing state with no cover image. Returns the new id.
    async fn insert_post(&self, new_post: &NewPost) -> Result<i32, BackendError>;

    async fn insert_image(
        &self,
        post_id: i32,
        url: &str,
        description: Option<&str>,
    ) -> Result<PostImage, BackendError>;

    /// Sets the cover image and takes the post out of processing.
    async fn finalize_post(&self, post_id: i32, cover_image: Option<&str>)
        -> Result<(), BackendError>;

    /// Deletes the post along with its image rows.
    async fn delete_post(&self, post_id: i32) -> Result<(), BackendError>;

    async fn get_post_details(&self, post_id: i32) -> Result<Option<PostDetails>, BackendError>;

    /// Returns the requested page, newest first, and the total amount of matching posts.
    async fn list_posts(
        &self,
        filter: &PostListFilter,
        page: PageRequest,
    ) -> Result<(Vec<PostDetails>, i64), BackendError>;

    /// Deletes posts that have been processing for longer than `older_than`. Returns how many.
    async fn delete_stale_processing_posts(&self, older_than: Duration)
        -> Result<u64, BackendError>;
}

/// A presigned upload slot in the temp area.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct PresignedUpload {
    pub key: String,
    pub url: String,
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Moves an object out of the temp area into its permanent key. The temp object is gone
    /// afterwards. Returns the public URL of the permanent object.
    async fn move_from_temp(&self, temp_key: &str, final_key: &str)
        -> Result<String, BackendError>;

    async fn delete_keys(&self, keys: &[String]) -> Result<(), BackendError>;

    /// Creates presigned PUT urls for the given temp keys.
    async fn presign_temp_uploads(&self, temp_keys: &[String])
        -> Result<Vec<PresignedUpload>, BackendError>;
}
