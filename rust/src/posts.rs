use axum::routing::get;
use axum::Router;
use axum_extra::routing::RouterExt;

use crate::ServerState;

mod list;
mod post;
mod structs;

pub use list::{ListPostsQuery, ListPostsResponse};
pub use post::{CreatePostRequest, CreatePostResponse, UploadedFile};
pub use structs::*;

pub fn router() -> Router<ServerState> {
    Router::new().route_with_tsr("/api/posts", get(list::list_posts).post(post::create_post))
}
