use std::collections::HashSet;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;

use crate::posts::structs::{Category, NewPost, NewPostBuilder, PostDetails, Tag, Visibility};
use crate::user::User;
use crate::utils::s3::{clean_passed_key, final_file_key, sanitize_file_name};
use crate::{RootErrors, ServerState};

/// What the client sends to create a post. Everything is optional here so that missing
/// fields get our own 400 rather than a deserialization error.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub tags: Option<Vec<Tag>>,
    pub visibility: Option<Visibility>,
    pub is_draft: Option<bool>,
    /// Which of the files should be the cover. Either one of the files' s3Key or fileName,
    /// or something ending in one of the file names.
    pub cover_image: Option<String>,
    #[serde(default)]
    pub files: Vec<UploadedFile>,
}

/// A file the client already put in the temp area.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub s3_key: String,
    pub description: Option<String>,
    pub file_name: String,
    pub file_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostResponse {
    pub message: String,
    pub post: PostDetails,
    /// Names of files that couldn't be stored. The post was created without them.
    pub failed_files: Vec<String>,
}

/// A request file after its key and name were checked.
#[derive(Clone, Debug, PartialEq, Eq)]
struct ValidatedFile {
    sent_key: String,
    temp_key: String,
    file_name: String,
    description: Option<String>,
}

/// A file that made it to its permanent key.
#[derive(Clone, Debug)]
struct MovedFile {
    file_name: String,
    final_key: String,
    url: String,
}

/// Post Request Handler for posts.
#[axum::debug_handler]
pub async fn create_post(
    State(state): State<ServerState>,
    cookie_jar: Cookies,
    payload: Result<Json<CreatePostRequest>, JsonRejection>,
) -> Result<Json<CreatePostResponse>, RootErrors> {
    // Who's trying to do this?
    let Some(session) = User::session_from_cookie_jar(&state, &cookie_jar).await? else {
        return Err(RootErrors::Unauthorized);
    };

    let Json(request) = payload?;

    let files = validate_files(&request.files, &state)?;

    let (Some(title), Some(description), Some(category)) = (
        non_blank(request.title.as_deref()),
        non_blank(request.description.as_deref()),
        request.category,
    ) else {
        return Err(RootErrors::BadRequest("Missing required fields".to_string()));
    };

    let Some(requesting_user) = User::get_by_session(&state, &session).await? else {
        return Err(RootErrors::NotFound("User not found".to_string()));
    };

    let mut tags = request.tags.unwrap_or_default();
    tags.sort();
    tags.dedup();

    let visibility = request.visibility.unwrap_or_default();

    let new_post = NewPostBuilder::default()
        .owner_id(requesting_user.id)
        .title(title)
        .description(description)
        .category(category)
        .tags(tags)
        .visibility(visibility)
        .is_draft(request.is_draft.unwrap_or(false))
        .build()
        .map_err(|err| {
            tracing::error!(error = %err, "[CREATE POST] Couldn't build post row");
            RootErrors::InternalServerError
        })?;

    // Detached from the request future. A request timeout must not stop the writes midway.
    let post_creation = tokio::spawn(store_post(
        state,
        requesting_user,
        new_post,
        files,
        request.cover_image,
    ));

    post_creation.await.map_err(|err| {
        tracing::error!(error = %err, "[CREATE POST] Post creation task died");
        RootErrors::InternalServerError
    })?
}

/// Inserts the post, moves its files into place and finalizes it. Compensates on batch failure.
async fn store_post(
    state: ServerState,
    requesting_user: User,
    new_post: NewPost,
    files: Vec<ValidatedFile>,
    cover_hint: Option<String>,
) -> Result<Json<CreatePostResponse>, RootErrors> {
    let visibility = new_post.visibility;

    let post_id = state.db.insert_post(&new_post).await.map_err(|err| {
        tracing::error!(error = %err, user_id = requesting_user.id, "[CREATE POST] Initial DB insert failed");
        RootErrors::InternalServerError
    })?;

    // ---- We have the ID? Move the files into place, one at a time. ----

    let mut moved_files: Vec<MovedFile> = Vec::new();
    let mut failed_files: Vec<String> = Vec::new();

    for file in &files {
        let target_key = final_file_key(requesting_user.id, post_id, &file.file_name, visibility);

        let url = match state.storage.move_from_temp(&file.temp_key, &target_key).await {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(error = %err, post_id, file_name = %file.file_name, "[CREATE POST] Moving file out of temp failed, skipping it");
                failed_files.push(file.file_name.clone());
                continue;
            }
        };

        let moved_file = MovedFile {
            file_name: file.file_name.clone(),
            final_key: target_key,
            url,
        };

        if let Err(err) = state
            .db
            .insert_image(post_id, &moved_file.url, file.description.as_deref())
            .await
        {
            tracing::warn!(error = %err, post_id, file_name = %file.file_name, "[CREATE POST] Recording image failed, skipping it");

            // The object has nowhere to be referenced from, so it goes.
            if let Err(err) = state.storage.delete_keys(&[moved_file.final_key]).await {
                tracing::warn!(error = %err, post_id, "[CREATE POST] Failed deleting unrecorded file");
            }

            failed_files.push(file.file_name.clone());
            continue;
        }

        moved_files.push(moved_file);
    }

    if moved_files.is_empty() {
        tracing::error!(post_id, failed = ?failed_files, "[CREATE POST] None of the files could be stored");
        abort_post_creation(&state, post_id, &moved_files).await;
        return Err(RootErrors::InternalServerError);
    }

    // ---- Now that the files are up, pick the cover and finish the post. ----

    let cover_image = resolve_cover_image(cover_hint.as_deref(), &files, &moved_files)
        .map(|file| {
            state.config.public_url(&final_file_key(
                requesting_user.id,
                post_id,
                &file.file_name,
                visibility,
            ))
        })
        .or_else(|| moved_files.first().map(|file| file.url.clone()));

    if let Err(err) = state.db.finalize_post(post_id, cover_image.as_deref()).await {
        tracing::error!(error = %err, post_id, "[CREATE POST] Finalizing post failed");
        abort_post_creation(&state, post_id, &moved_files).await;
        return Err(RootErrors::InternalServerError);
    }

    let post = match state.db.get_post_details(post_id).await {
        Ok(Some(post)) => post,
        Ok(None) => {
            tracing::error!(post_id, "[CREATE POST] Post vanished right after being finalized");
            abort_post_creation(&state, post_id, &moved_files).await;
            return Err(RootErrors::InternalServerError);
        }
        Err(err) => {
            tracing::error!(error = %err, post_id, "[CREATE POST] Reading back created post failed");
            abort_post_creation(&state, post_id, &moved_files).await;
            return Err(RootErrors::InternalServerError);
        }
    };

    tracing::info!(
        post_id,
        user_id = requesting_user.id,
        files = moved_files.len(),
        failed = failed_files.len(),
        "[CREATE POST] Post created"
    );

    Ok(Json(CreatePostResponse {
        message: "Post created successfully".to_string(),
        post,
        failed_files,
    }))
}

/// Deletes a half-made post and whatever files were already moved for it. Best effort, failures
/// are logged and left to the stale post cleanup.
async fn abort_post_creation(state: &ServerState, post_id: i32, moved_files: &[MovedFile]) {
    if let Err(err) = state.db.delete_post(post_id).await {
        tracing::error!(error = %err, post_id, "[CREATE POST] Deleting failed post failed too");
    }

    let moved_keys: Vec<String> = moved_files.iter().map(|file| file.final_key.clone()).collect();

    if let Err(err) = state.storage.delete_keys(&moved_keys).await {
        tracing::error!(error = %err, post_id, keys = ?moved_keys, "[CREATE POST] Deleting moved files of failed post failed");
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Makes sure every sent file points into the temp area and has a usable, unique name.
fn validate_files(
    sent_files: &[UploadedFile],
    state: &ServerState,
) -> Result<Vec<ValidatedFile>, RootErrors> {
    if sent_files.is_empty() {
        return Err(RootErrors::BadRequest("Missing required fields".to_string()));
    }

    let mut seen_names: HashSet<String> = HashSet::new();
    let mut validated_files = Vec::with_capacity(sent_files.len());

    for file in sent_files {
        let Some(temp_key) = clean_passed_key(&file.s3_key, &state.config) else {
            return Err(RootErrors::BadRequest(format!(
                "File key {} is not an uploaded file",
                file.s3_key
            )));
        };

        let Some(file_name) = sanitize_file_name(&file.file_name) else {
            return Err(RootErrors::BadRequest(format!(
                "Invalid file name {}",
                file.file_name
            )));
        };

        if !seen_names.insert(file_name.clone()) {
            return Err(RootErrors::BadRequest(format!(
                "File name {file_name} appears more than once"
            )));
        }

        validated_files.push(ValidatedFile {
            sent_key: file.s3_key.trim().to_string(),
            temp_key,
            file_name,
            description: non_blank(file.description.as_deref()),
        });
    }

    Ok(validated_files)
}

/// Figures out which request file the cover hint points at, as long as that file was actually
/// stored. An exact key or name match wins. Otherwise the longest file name the hint ends with.
fn resolve_cover_image<'a>(
    hint: Option<&str>,
    files: &'a [ValidatedFile],
    moved_files: &[MovedFile],
) -> Option<&'a ValidatedFile> {
    let hint = hint.map(str::trim).filter(|hint| !hint.is_empty())?;

    let hinted_file = files
        .iter()
        .find(|file| file.sent_key == hint || file.temp_key == hint || file.file_name == hint)
        .or_else(|| {
            files
                .iter()
                .filter(|file| hint.ends_with(&file.file_name))
                .max_by_key(|file| file.file_name.len())
        })?;

    moved_files
        .iter()
        .any(|moved| moved.file_name == hinted_file.file_name)
        .then_some(hinted_file)
}
