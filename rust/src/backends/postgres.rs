use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use deadpool_postgres::{ManagerConfig, Object, Pool, RecyclingMethod, Runtime};
use tokio_postgres::{NoTls, Row};

use super::{BackendError, PostDatabase, SessionResolver};
use crate::posts::{NewPost, PageRequest, PostCounts, PostDetails, PostImage, PostListFilter};
use crate::server_state::Config;
use crate::user::{OwnerSummary, SessionIdentity, User};
use crate::utils::sql::{numbered_placeholders, post_list_where, SqlParams};

const SESSION_TIME_TO_EXPIRE: Duration = Duration::days(30);

// Everything a PostDetails needs except the images, which get fetched separately per page.
const POST_DETAILS_SELECT: &str = "SELECT p.id, p.title, p.description, p.category, p.tags, \
    p.visibility, p.is_draft, p.cover_image, p.owner_id, p.created_at, \
    u.username AS owner_username, u.avatar AS owner_avatar, \
    (SELECT COUNT(*) FROM post_like l WHERE l.post_id = p.id) AS like_count, \
    (SELECT COUNT(*) FROM post_comment c WHERE c.post_id = p.id) AS comment_count \
    FROM post p INNER JOIN site_user u ON u.id = p.owner_id";

const INSERT_INTO_POST_IMAGE_DB_QUERY: &str =
    "INSERT INTO post_image (post_id, url, description) VALUES ($1,$2,$3) RETURNING id";

#[derive(Clone)]
pub struct PostgresBackend {
    db_pool: Pool,
}

impl PostgresBackend {
    pub fn connect(config: &Config) -> Result<Self, deadpool_postgres::CreatePoolError> {
        let mut db_config = deadpool_postgres::Config::new();
        db_config.url = Some(config.database_url.clone());
        db_config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let db_pool = db_config.create_pool(Some(Runtime::Tokio1), NoTls)?;

        Ok(Self { db_pool })
    }

    pub async fn get_connection(&self) -> Result<Object, BackendError> {
        Ok(self.db_pool.get().await?)
    }

    /// Fetches the images of all the given posts in one go, grouped by post id.
    async fn images_for_posts(
        db_connection: &Object,
        post_ids: &[i32],
    ) -> Result<HashMap<i32, Vec<PostImage>>, BackendError> {
        let mut images_by_post: HashMap<i32, Vec<PostImage>> = HashMap::new();

        if post_ids.is_empty() {
            return Ok(images_by_post);
        }

        let rows = db_connection
            .query(
                "SELECT id, url, description, post_id FROM post_image WHERE post_id = ANY($1) ORDER BY id",
                &[&post_ids],
            )
            .await?;

        for row in rows {
            let image = image_from_row(&row)?;
            images_by_post.entry(image.post_id).or_default().push(image);
        }

        Ok(images_by_post)
    }
}

/// Converts a post_image row to a PostImage struct.
fn image_from_row(row: &Row) -> Result<PostImage, BackendError> {
    Ok(PostImage {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        description: row.try_get("description")?,
        post_id: row.try_get("post_id")?,
    })
}

/// Converts a row of POST_DETAILS_SELECT to PostDetails, with the given images.
fn details_from_row(row: &Row, images: Vec<PostImage>) -> Result<PostDetails, BackendError> {
    let owner_id: i64 = row.try_get("owner_id")?;

    Ok(PostDetails {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        tags: row.try_get("tags")?,
        visibility: row.try_get("visibility")?,
        is_draft: row.try_get("is_draft")?,
        cover_image: row.try_get("cover_image")?,
        owner_id,
        created_at: row.try_get("created_at")?,
        owner: OwnerSummary {
            id: owner_id,
            username: row.try_get("owner_username")?,
            avatar: row.try_get("owner_avatar")?,
        },
        images,
        counts: PostCounts {
            likes: row.try_get("like_count")?,
            comments: row.try_get("comment_count")?,
        },
    })
}

#[async_trait]
impl SessionResolver for PostgresBackend {
    async fn resolve_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionIdentity>, BackendError> {
        let db_connection = self.get_connection().await?;

        let resulted_row = db_connection
            .query_opt(
                "SELECT u.email, s.creation_time FROM user_session s \
                INNER JOIN site_user u ON u.id = s.user_id WHERE s.session_id = $1",
                &[&session_id],
            )
            .await?;

        let Some(row) = resulted_row else {
            return Ok(None);
        };

        let creation_time: DateTime<Utc> = row.try_get("creation_time")?;
        let expired = creation_time
            .checked_add_signed(SESSION_TIME_TO_EXPIRE)
            .is_none_or(|expiry| expiry <= Utc::now());

        if expired {
            return Ok(None);
        }

        Ok(Some(SessionIdentity {
            email: row.try_get("email")?,
        }))
    }
}

#[async_trait]
impl PostDatabase for PostgresBackend {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, BackendError> {
        let db_connection = self.get_connection().await?;

        let resulted_row = db_connection
            .query_opt(
                "SELECT id, email, username, avatar FROM site_user WHERE email = $1",
                &[&email],
            )
            .await?;

        resulted_row
            .map(|row| {
                Ok(User {
                    id: row.try_get("id")?,
                    email: row.try_get("email")?,
                    username: row.try_get("username")?,
                    avatar: row.try_get("avatar")?,
                })
            })
            .transpose()
    }

    async fn insert_post(&self, new_post: &NewPost) -> Result<i32, BackendError> {
        let db_connection = self.get_connection().await?;

        let mut columns: Vec<&str> = Vec::new();
        let mut values: SqlParams = Vec::new();

        columns.push("owner_id");
        values.push(&new_post.owner_id);

        columns.push("title");
        values.push(&new_post.title);

        columns.push("description");
        values.push(&new_post.description);

        columns.push("category");
        values.push(&new_post.category);

        columns.push("visibility");
        values.push(&new_post.visibility);

        columns.push("is_draft");
        values.push(&new_post.is_draft);

        if !new_post.tags.is_empty() {
            columns.push("tags");
            values.push(&new_post.tags);
        }

        // SAFETY: only our own column names go into the string. User values are in `values`.
        let query = format!(
            "INSERT INTO post ({}) VALUES ({}) RETURNING id",
            columns.join(","),
            numbered_placeholders(values.len())
        );

        let row = db_connection.query_one(&query, &values).await?;

        Ok(row.try_get(0)?)
    }

    async fn insert_image(
        &self,
        post_id: i32,
        url: &str,
        description: Option<&str>,
    ) -> Result<PostImage, BackendError> {
        let db_connection = self.get_connection().await?;

        let row = db_connection
            .query_one(INSERT_INTO_POST_IMAGE_DB_QUERY, &[&post_id, &url, &description])
            .await?;

        Ok(PostImage {
            id: row.try_get(0)?,
            url: url.to_string(),
            description: description.map(str::to_string),
            post_id,
        })
    }

    async fn finalize_post(
        &self,
        post_id: i32,
        cover_image: Option<&str>,
    ) -> Result<(), BackendError> {
        let db_connection = self.get_connection().await?;

        let rows_modified = db_connection
            .execute(
                "UPDATE post SET cover_image=$1, is_processing=FALSE WHERE id=$2",
                &[&cover_image, &post_id],
            )
            .await?;

        if rows_modified == 0 {
            return Err(BackendError::InvalidRow(format!(
                "post {post_id} disappeared before it was finalized"
            )));
        }

        Ok(())
    }

    async fn delete_post(&self, post_id: i32) -> Result<(), BackendError> {
        let db_connection = self.get_connection().await?;

        // post_image rows go with it through ON DELETE CASCADE.
        db_connection
            .execute("DELETE FROM post WHERE id=$1", &[&post_id])
            .await?;

        Ok(())
    }

    async fn get_post_details(&self, post_id: i32) -> Result<Option<PostDetails>, BackendError> {
        let db_connection = self.get_connection().await?;

        let query = format!("{POST_DETAILS_SELECT} WHERE p.id = $1");
        let Some(row) = db_connection.query_opt(&query, &[&post_id]).await? else {
            return Ok(None);
        };

        let mut images = Self::images_for_posts(&db_connection, &[post_id]).await?;

        details_from_row(&row, images.remove(&post_id).unwrap_or_default()).map(Some)
    }

    async fn list_posts(
        &self,
        filter: &PostListFilter,
        page: PageRequest,
    ) -> Result<(Vec<PostDetails>, i64), BackendError> {
        let db_connection = self.get_connection().await?;

        let limit = page.limit;
        let offset = page.offset();

        let mut count_params: SqlParams = Vec::new();
        let count_where = post_list_where(filter, &mut count_params);
        let count_query = format!("SELECT COUNT(*) FROM post p {count_where}");

        let total: i64 = db_connection
            .query_one(&count_query, &count_params)
            .await?
            .try_get(0)?;

        let mut query_params: SqlParams = vec![&limit, &offset];
        let query_where = post_list_where(filter, &mut query_params);
        let query = format!(
            "{POST_DETAILS_SELECT} {query_where} ORDER BY p.created_at DESC, p.id DESC LIMIT $1 OFFSET $2"
        );

        let rows = db_connection.query(&query, &query_params).await?;

        let post_ids = rows
            .iter()
            .map(|row| row.try_get("id"))
            .collect::<Result<Vec<i32>, _>>()?;

        let mut images = Self::images_for_posts(&db_connection, &post_ids).await?;

        let posts = rows
            .iter()
            .zip(post_ids)
            .map(|(row, post_id)| details_from_row(row, images.remove(&post_id).unwrap_or_default()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((posts, total))
    }

    async fn delete_stale_processing_posts(
        &self,
        older_than: Duration,
    ) -> Result<u64, BackendError> {
        let db_connection = self.get_connection().await?;

        let cutoff = Utc::now() - older_than;

        Ok(db_connection
            .execute(
                "DELETE FROM post WHERE is_processing AND created_at < $1",
                &[&cutoff],
            )
            .await?)
    }
}
