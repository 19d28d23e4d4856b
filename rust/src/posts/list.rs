use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::de::value::{Error as ValueError, StrDeserializer};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use tower_cookies::Cookies;

use crate::posts::structs::{
    Category, PageRequest, Pagination, PostDetails, PostListFilter, Visibility,
};
use crate::user::User;
use crate::{RootErrors, ServerState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPostsQuery {
    // Kept as strings so that junk paging values fall back to defaults instead of erroring.
    pub page: Option<String>,
    pub limit: Option<String>,
    // Blank filters (`?visibility=`) mean no filter. Junk is still a 400.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub visibility: Option<Visibility>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub category: Option<Category>,
    #[serde(default, deserialize_with = "blank_as_none_parsed")]
    pub user_id: Option<i64>,
}

fn non_blank_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty()))
}

/// For enum filters, read from their wire name.
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Some(value) = non_blank_string(deserializer)? else {
        return Ok(None);
    };

    T::deserialize(StrDeserializer::<ValueError>::new(&value))
        .map(Some)
        .map_err(de::Error::custom)
}

/// For numeric filters.
fn blank_as_none_parsed<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let Some(value) = non_blank_string(deserializer)? else {
        return Ok(None);
    };

    value.parse().map(Some).map_err(de::Error::custom)
}

#[derive(Debug, Serialize)]
pub struct ListPostsResponse {
    pub posts: Vec<PostDetails>,
    pub pagination: Pagination,
}

/// Get Request Handler for the post feed.
#[axum::debug_handler]
pub async fn list_posts(
    State(state): State<ServerState>,
    cookie_jar: Cookies,
    query: Result<Query<ListPostsQuery>, QueryRejection>,
) -> Result<Json<ListPostsResponse>, RootErrors> {
    let Query(query) = query?;

    // An unknown user browses like an anonymous one.
    let viewer = User::get_from_cookie_jar(&state, &cookie_jar).await?;

    let filter = PostListFilter::for_viewer(
        viewer.as_ref().map(|viewer| viewer.id),
        query.visibility,
        query.category,
        query.user_id,
    );

    let page_request = PageRequest::from_raw(query.page.as_deref(), query.limit.as_deref());

    let (posts, total) = state
        .db
        .list_posts(&filter, page_request)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, ?filter, "[LIST POSTS] Fetching posts failed");
            RootErrors::InternalServerError
        })?;

    Ok(Json(ListPostsResponse {
        posts,
        pagination: Pagination::new(page_request, total),
    }))
}
