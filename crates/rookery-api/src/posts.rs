use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use tracing::info;

use rookery_types::api::{PageQuery, PostPage, PostRequest};
use rookery_types::models::Post;
use rookery_types::permission::Permission;
use rookery_types::post::PostBody;

use crate::error::ApiError;
use crate::extract::Valid;
use crate::middleware::Viewer;
use crate::{AppState, blocking, page_offset};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}", get(get_post).put(edit_post))
}

pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PostPage>, ApiError> {
    let page = query.page();
    let per_page = state.settings.posts_per_page;

    let (items, total) = blocking(&state, move |s| {
        let rows = s.db.list_posts(per_page, page_offset(page, per_page))?;
        let total = s.db.count_posts()?;
        Ok((rows.into_iter().map(Post::from).collect::<Vec<_>>(), total))
    })
    .await?;

    Ok(Json(PostPage {
        items,
        page,
        per_page,
        total,
    }))
}

pub async fn create_post(
    State(state): State<AppState>,
    viewer: Viewer,
    Valid(req): Valid<PostRequest>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let author_id = viewer.require(Permission::WRITE_ARTICLES)?.id;

    let post = blocking(&state, move |s| {
        let body = PostBody::new(req.body);
        let id = s.db.insert_post(author_id, &body)?;
        let row = s.db.get_post(id)?.ok_or(ApiError::NotFound)?;
        Ok(Post::from(row))
    })
    .await?;

    info!(user_id = author_id, post_id = post.id, "Created post");
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Post>, ApiError> {
    let post = blocking(&state, move |s| {
        let row = s.db.get_post(id)?.ok_or(ApiError::NotFound)?;
        Ok(Post::from(row))
    })
    .await?;

    Ok(Json(post))
}

/// Only the author or an administrator may edit a post.
pub async fn edit_post(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
    Valid(req): Valid<PostRequest>,
) -> Result<Json<Post>, ApiError> {
    let user = viewer.user().ok_or(ApiError::Unauthorized)?;
    let user_id = user.id;
    let is_admin = user.is_administrator();

    let post = blocking(&state, move |s| {
        let existing = s.db.get_post(id)?.ok_or(ApiError::NotFound)?;
        if existing.author_id != user_id && !is_admin {
            return Err(ApiError::Forbidden);
        }

        s.db.set_post_body(id, &PostBody::new(req.body))?;
        let row = s.db.get_post(id)?.ok_or(ApiError::NotFound)?;
        Ok(Post::from(row))
    })
    .await?;

    info!(user_id, post_id = id, "Edited post");
    Ok(Json(post))
}
