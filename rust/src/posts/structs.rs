use chrono::{DateTime, Utc};
use derive_builder::Builder;
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};

use crate::user::OwnerSummary;

/// Who gets to see a post.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, FromSql, ToSql, Serialize, Deserialize)]
#[postgres(name = "post_visibility", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    #[default]
    Public,
    Followers, // Only the owner's followers (and the owner).
    Private,   // Only the owner.
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromSql, ToSql, Serialize, Deserialize)]
#[postgres(name = "post_category", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Art,
    Photography,
    Illustration,
    Design,
    Animation,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, FromSql, ToSql, Serialize, Deserialize)]
#[postgres(name = "post_tag", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tag {
    Digital,
    Traditional,
    Sketch,
    Portrait,
    Landscape,
    Abstract,
    FanArt,
    WorkInProgress,
}

/// A single stored file belonging to a post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostImage {
    pub id: i32,
    pub url: String,
    pub description: Option<String>,
    pub post_id: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PostCounts {
    pub likes: i64,
    pub comments: i64,
}

/// A post as the API hands it out: the row itself plus owner, images and counts.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDetails {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub tags: Vec<Tag>,
    pub visibility: Visibility,
    pub is_draft: bool,
    pub cover_image: Option<String>,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
    pub owner: OwnerSummary,
    pub images: Vec<PostImage>,
    pub counts: PostCounts,
}

/// The values of a post row at insert time. Cover image and processing state are not here,
/// the row always starts without a cover and in processing.
#[derive(Clone, Debug, Builder)]
#[builder(setter(into))]
pub struct NewPost {
    pub owner_id: i64,
    pub title: String,
    pub description: String,
    pub category: Category,
    #[builder(default)]
    pub tags: Vec<Tag>,
    #[builder(default)]
    pub visibility: Visibility,
    #[builder(default = false)]
    pub is_draft: bool,
}

/// What a listing is allowed to return. Drafts and processing posts are always excluded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PostListFilter {
    pub category: Option<Category>,
    pub owner_id: Option<i64>,
    pub visibility: Option<Visibility>,
    /// When set, only posts this user may see: public ones, their own, and follower-only
    /// posts of people they follow.
    pub viewer_id: Option<i64>,
}

impl PostListFilter {
    /// Builds the filter for a listing request. `viewer_id` is None for anonymous callers.
    pub fn for_viewer(
        viewer_id: Option<i64>,
        visibility: Option<Visibility>,
        category: Option<Category>,
        owner_id: Option<i64>,
    ) -> Self {
        match viewer_id {
            // Anonymous callers see public posts and nothing else, whatever they asked for.
            None => Self {
                category,
                owner_id,
                visibility: Some(Visibility::Public),
                viewer_id: None,
            },
            // The viewer rule replaces any requested visibility on the general feed.
            Some(viewer_id) if owner_id.is_none() => Self {
                category,
                owner_id: None,
                visibility: None,
                viewer_id: Some(viewer_id),
            },
            Some(viewer_id) => Self {
                category,
                owner_id,
                visibility,
                viewer_id: Some(viewer_id),
            },
        }
    }
}

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 50;

/// A 1-indexed page request, already clamped to sane values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Parses user-given paging values. Garbage falls back to the defaults instead of erroring.
    pub fn from_raw(page: Option<&str>, limit: Option<&str>) -> Self {
        let page = page
            .and_then(|page| page.trim().parse::<i64>().ok())
            .filter(|page| *page >= 1)
            .unwrap_or(1);

        let limit = limit
            .and_then(|limit| limit.trim().parse::<i64>().ok())
            .filter(|limit| *limit >= 1)
            .map(|limit| limit.min(MAX_PAGE_SIZE))
            .unwrap_or(DEFAULT_PAGE_SIZE);

        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(request: PageRequest, total: i64) -> Self {
        Self {
            page: request.page,
            limit: request.limit,
            total,
            pages: (total + request.limit - 1) / request.limit,
        }
    }
}
