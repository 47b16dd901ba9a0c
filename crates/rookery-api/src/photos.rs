use std::path::Path;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Multipart, State},
    http::StatusCode,
    routing::get,
};
use tokio::io::AsyncWriteExt;
use tower_http::services::ServeDir;
use tracing::{error, info};

use rookery_types::api::{PhotoWall, UploadResponse};

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::CurrentUser;

/// Extensions accepted for upload, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

pub fn router(upload_dir: &Path) -> Router<AppState> {
    Router::new()
        .route("/", get(photo_wall).post(upload_photo))
        .nest_service("/uploads", ServeDir::new(upload_dir))
}

pub fn allowed_file(filename: &str) -> bool {
    filename.rsplit_once('.').is_some_and(|(_, ext)| {
        ALLOWED_EXTENSIONS
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    })
}

/// Reduce a client-supplied filename to a safe, flat name.
///
/// Path separators become spaces, runs of whitespace become `_`, anything
/// outside `[A-Za-z0-9._-]` is dropped and leading/trailing dots and
/// underscores are trimmed. Returns `None` when nothing usable is left.
pub fn secure_filename(filename: &str) -> Option<String> {
    let spaced = filename.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// GET /: names of the uploaded photos, sorted.
pub async fn photo_wall(State(state): State<AppState>) -> Result<Json<PhotoWall>, ApiError> {
    let dir = &state.settings.upload_dir;
    let mut photos = Vec::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Json(PhotoWall { photos }));
        }
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("Failed to read upload directory {}", dir.display()))
                .into());
        }
    };

    while let Some(entry) = entries.next_entry().await.context("Failed to list uploads")? {
        let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
        if let Some(name) = entry.file_name().to_str() {
            if is_file && allowed_file(name) {
                photos.push(name.to_string());
            }
        }
    }
    photos.sort();

    Ok(Json(PhotoWall { photos }))
}

/// POST /: store the multipart field `file` in the upload directory.
pub async fn upload_photo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        let filename = secure_filename(&original)
            .filter(|name| allowed_file(name))
            .ok_or_else(|| ApiError::field("file", "This file can't be uploaded."))?;

        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(ApiError::field("file", "The uploaded file is empty."));
        }

        let dir = &state.settings.upload_dir;
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            error!("Failed to create upload directory {}: {}", dir.display(), e);
            anyhow::Error::new(e)
        })?;

        let path = dir.join(&filename);
        let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
            error!("Failed to create file {}: {}", path.display(), e);
            anyhow::Error::new(e)
        })?;
        file.write_all(&bytes).await.map_err(|e| {
            error!("Failed to write file {}: {}", path.display(), e);
            anyhow::Error::new(e)
        })?;
        // Tokio completes writes in the background; the bytes must be on
        // disk before the upload is reported.
        file.flush().await.map_err(|e| {
            error!("Failed to flush file {}: {}", path.display(), e);
            anyhow::Error::new(e)
        })?;

        info!(user_id = user.id, filename = %filename, size = bytes.len(), "Photo uploaded");

        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                url: format!("/uploads/{filename}"),
                filename,
                size: bytes.len() as u64,
            }),
        ));
    }

    Err(ApiError::field("file", "No file selected."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_filename_flattens_paths() {
        assert_eq!(secure_filename("My cool movie.mov").as_deref(), Some("My_cool_movie.mov"));
        assert_eq!(secure_filename("../../../etc/passwd").as_deref(), Some("etc_passwd"));
        assert_eq!(secure_filename("C:\\photos\\cat.png").as_deref(), Some("C_photos_cat.png"));
        assert_eq!(secure_filename(".hidden.gif").as_deref(), Some("hidden.gif"));
        assert_eq!(secure_filename("caf\u{e9}.jpg").as_deref(), Some("caf.jpg"));
    }

    #[test]
    fn secure_filename_rejects_empty_results() {
        assert_eq!(secure_filename(""), None);
        assert_eq!(secure_filename("../.."), None);
        assert_eq!(secure_filename("\u{1F600}"), None);
    }

    #[test]
    fn extension_allow_list() {
        assert!(allowed_file("cat.png"));
        assert!(allowed_file("cat.JPG"));
        assert!(allowed_file("cat.jpeg"));
        assert!(allowed_file("cat.tar.gif"));
        assert!(!allowed_file("cat.ipg"));
        assert!(!allowed_file("cat.exe"));
        assert!(!allowed_file("png"));
    }
}
