use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use tracing::info;

use rookery_crypto::gravatar::gravatar_url;
use rookery_db::Database;
use rookery_types::api::{
    EditProfileRequest, FollowPage, FollowResponse, PageQuery, PostPage, ProfileResponse,
};
use rookery_types::models::{FollowEntry, Post, User};
use rookery_types::permission::Permission;

use crate::error::ApiError;
use crate::extract::Valid;
use crate::middleware::{CurrentUser, Viewer};
use crate::{AppState, blocking, page_offset};

const AVATAR_SIZE: u32 = 256;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/{username}", get(profile))
        .route("/users/{username}/posts", get(user_posts))
        .route("/users/{username}/followers", get(followers))
        .route("/users/{username}/following", get(following))
        .route("/follow/{username}", post(follow))
        .route("/unfollow/{username}", post(unfollow))
        .route("/edit-profile", post(edit_profile))
}

fn find_user(db: &Database, username: &str) -> Result<User, ApiError> {
    db.get_user_by_username(username)?
        .map(User::from)
        .ok_or(ApiError::NotFound)
}

fn build_profile(
    db: &Database,
    user: &User,
    viewer_id: Option<i64>,
    secure: bool,
) -> Result<ProfileResponse, ApiError> {
    let mut profile = ProfileResponse::new(user, gravatar_url(&user.email, AVATAR_SIZE, secure));
    profile.followers = db.follower_count(user.id)?;
    profile.following = db.followed_count(user.id)?;
    profile.post_count = db.count_posts_by_author(user.id)?;
    if let Some(viewer_id) = viewer_id {
        profile.is_following = Some(db.is_following(viewer_id, user.id)?);
        profile.is_followed_by = Some(db.is_followed_by(viewer_id, user.id)?);
    }
    Ok(profile)
}

pub async fn profile(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(username): Path<String>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let viewer_id = viewer.user().map(|u| u.id);

    let profile = blocking(&state, move |s| {
        let user = find_user(&s.db, &username)?;
        build_profile(&s.db, &user, viewer_id, s.settings.is_secure())
    })
    .await?;

    Ok(Json(profile))
}

pub async fn user_posts(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PostPage>, ApiError> {
    let page = query.page();
    let per_page = state.settings.posts_per_page;

    let (items, total) = blocking(&state, move |s| {
        let user = find_user(&s.db, &username)?;
        let rows = s
            .db
            .posts_by_author(user.id, per_page, page_offset(page, per_page))?;
        let total = s.db.count_posts_by_author(user.id)?;
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

pub async fn followers(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<FollowPage>, ApiError> {
    let page = query.page();
    let per_page = state.settings.posts_per_page;

    let (items, total) = blocking(&state, move |s| {
        let user = find_user(&s.db, &username)?;
        let rows = s.db.followers(user.id, per_page, page_offset(page, per_page))?;
        let total = s.db.follower_count(user.id)?;
        Ok((rows.into_iter().map(FollowEntry::from).collect::<Vec<_>>(), total))
    })
    .await?;

    Ok(Json(FollowPage {
        items,
        page,
        per_page,
        total,
    }))
}

pub async fn following(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<FollowPage>, ApiError> {
    let page = query.page();
    let per_page = state.settings.posts_per_page;

    let (items, total) = blocking(&state, move |s| {
        let user = find_user(&s.db, &username)?;
        let rows = s.db.followed(user.id, per_page, page_offset(page, per_page))?;
        let total = s.db.followed_count(user.id)?;
        Ok((rows.into_iter().map(FollowEntry::from).collect::<Vec<_>>(), total))
    })
    .await?;

    Ok(Json(FollowPage {
        items,
        page,
        per_page,
        total,
    }))
}

pub async fn follow(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(username): Path<String>,
) -> Result<Json<FollowResponse>, ApiError> {
    let actor_id = viewer.require(Permission::FOLLOW)?.id;

    let (target, changed) = blocking(&state, move |s| {
        let target = find_user(&s.db, &username)?;
        if target.id == actor_id {
            return Err(ApiError::field("username", "You cannot follow yourself."));
        }
        let changed = s.db.follow(actor_id, target.id)?;
        Ok((target, changed))
    })
    .await?;

    if changed {
        info!(user_id = actor_id, followed_id = target.id, "Followed user");
    }

    Ok(Json(FollowResponse {
        username: target.username,
        following: true,
        changed,
    }))
}

pub async fn unfollow(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(username): Path<String>,
) -> Result<Json<FollowResponse>, ApiError> {
    let actor_id = viewer.require(Permission::FOLLOW)?.id;

    let (target, changed) = blocking(&state, move |s| {
        let target = find_user(&s.db, &username)?;
        let changed = s.db.unfollow(actor_id, target.id)?;
        Ok((target, changed))
    })
    .await?;

    if changed {
        info!(user_id = actor_id, followed_id = target.id, "Unfollowed user");
    }

    Ok(Json(FollowResponse {
        username: target.username,
        following: false,
        changed,
    }))
}

/// Empty or whitespace-only profile fields are stored as NULL.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn edit_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Valid(req): Valid<EditProfileRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user_id = user.id;

    let profile = blocking(&state, move |s| {
        let name = non_blank(req.name);
        let location = non_blank(req.location);
        let about_me = non_blank(req.about_me);
        s.db.update_profile(user_id, name.as_deref(), location.as_deref(), about_me.as_deref())?;

        let user = s
            .db
            .get_user_by_id(user_id)?
            .map(User::from)
            .ok_or(ApiError::NotFound)?;
        build_profile(&s.db, &user, Some(user_id), s.settings.is_secure())
    })
    .await?;

    info!(user_id, "Profile updated");
    Ok(Json(profile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_profile_fields_become_none() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(Some(" Paris ".into())), Some("Paris".into()));
        assert_eq!(non_blank(None), None);
    }
}
