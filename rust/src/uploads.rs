use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use axum_extra::routing::RouterExt;
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;

use crate::backends::PresignedUpload;
use crate::user::User;
use crate::utils::s3::new_temp_key;
use crate::{RootErrors, ServerState};

pub const MAX_FILES_PER_REQUEST: u8 = 20;

pub fn router() -> Router<ServerState> {
    Router::new().route_with_tsr("/api/uploads", post(request_uploads))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadsRequest {
    pub file_amount: u8,
}

#[derive(Debug, Serialize)]
pub struct UploadsResponse {
    pub uploads: Vec<PresignedUpload>,
}

/// Hands the user presigned URLs to put files into the temp area, for later use in a post.
#[axum::debug_handler]
pub async fn request_uploads(
    State(state): State<ServerState>,
    cookie_jar: Cookies,
    payload: Result<Json<UploadsRequest>, JsonRejection>,
) -> Result<Json<UploadsResponse>, RootErrors> {
    if User::session_from_cookie_jar(&state, &cookie_jar).await?.is_none() {
        return Err(RootErrors::Unauthorized);
    }

    let Json(request) = payload?;

    if request.file_amount == 0 || request.file_amount > MAX_FILES_PER_REQUEST {
        return Err(RootErrors::BadRequest(format!(
            "fileAmount must be between 1 and {MAX_FILES_PER_REQUEST}"
        )));
    }

    let temp_keys: Vec<String> = (0..request.file_amount)
        .map(|_| new_temp_key(&state.config))
        .collect();

    let uploads = state
        .storage
        .presign_temp_uploads(&temp_keys)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "[UPLOADS] Presigning temp uploads failed");
            RootErrors::InternalServerError
        })?;

    Ok(Json(UploadsResponse { uploads }))
}
