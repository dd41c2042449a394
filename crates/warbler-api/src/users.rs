use std::collections::HashSet;

use axum::{
    Extension, Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::info;

use warbler_db::models::{DEFAULT_HEADER_IMAGE_URL, DEFAULT_IMAGE_URL, UserRow, UserUpdate};
use warbler_types::api::{ProfileForm, SearchQuery};

use crate::auth::{AppState, authenticate, run_blocking};
use crate::error::{ApiError, ApiResult};
use crate::middleware::{AuthUser, CurrentUser, Session};
use crate::validation::{validate_email, validate_username};
use crate::views::{messages_view, redirect, stats_view, user_view, users_view};

const PROFILE_MESSAGE_LIMIT: u32 = 100;

pub async fn list_users(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Response> {
    let search = query.q.filter(|q| !q.trim().is_empty());
    let users = state.db.search_users(search.as_deref())?;

    let page = state.views.page(
        "users_index",
        "Users",
        &session,
        current.0.as_ref(),
        &json!({ "users": users_view(&users), "q": search }),
    )?;
    Ok(page.into_response())
}

/// Template data shared by every page under `/users/{id}`.
fn profile_context(state: &AppState, viewer: &UserRow, user_id: i64) -> ApiResult<(UserRow, Value)> {
    let user = state.db.get_user_by_id(user_id)?.ok_or(ApiError::NotFound)?;
    let stats = stats_view(state.db.get_user_counts(user.id)?);
    let is_following = state.db.is_following(viewer.id, user.id)?;

    let context = json!({
        "user": user_view(&user),
        "stats": stats,
        "is_self": viewer.id == user.id,
        "is_following": is_following,
    });
    Ok((user, context))
}

fn liked_by(state: &AppState, viewer: &UserRow) -> ApiResult<HashSet<i64>> {
    Ok(state.db.get_liked_message_ids(viewer.id)?.into_iter().collect())
}

pub async fn show_user(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(viewer)): Extension<AuthUser>,
    Path(user_id): Path<i64>,
) -> ApiResult<Response> {
    let (user, mut context) = profile_context(&state, &viewer, user_id)?;
    let rows = state.db.get_user_messages(user.id, PROFILE_MESSAGE_LIMIT)?;
    context["messages"] = json!(messages_view(&rows, viewer.id, &liked_by(&state, &viewer)?));

    let page = state
        .views
        .page("user_detail", &user.username, &session, Some(&viewer), &context)?;
    Ok(page.into_response())
}

pub async fn show_following(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(viewer)): Extension<AuthUser>,
    Path(user_id): Path<i64>,
) -> ApiResult<Response> {
    let (user, mut context) = profile_context(&state, &viewer, user_id)?;
    context["heading"] = json!("Following");
    context["users"] = json!(users_view(&state.db.get_following(user.id)?));

    let page = state
        .views
        .page("user_list", &user.username, &session, Some(&viewer), &context)?;
    Ok(page.into_response())
}

pub async fn show_followers(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(viewer)): Extension<AuthUser>,
    Path(user_id): Path<i64>,
) -> ApiResult<Response> {
    let (user, mut context) = profile_context(&state, &viewer, user_id)?;
    context["heading"] = json!("Followers");
    context["users"] = json!(users_view(&state.db.get_followers(user.id)?));

    let page = state
        .views
        .page("user_list", &user.username, &session, Some(&viewer), &context)?;
    Ok(page.into_response())
}

pub async fn show_likes(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(viewer)): Extension<AuthUser>,
    Path(user_id): Path<i64>,
) -> ApiResult<Response> {
    let (user, mut context) = profile_context(&state, &viewer, user_id)?;
    let rows = state.db.get_liked_messages(user.id)?;
    context["messages"] = json!(messages_view(&rows, viewer.id, &liked_by(&state, &viewer)?));

    let page = state
        .views
        .page("user_likes", &user.username, &session, Some(&viewer), &context)?;
    Ok(page.into_response())
}

pub async fn follow(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(followed_id): Path<i64>,
) -> ApiResult<Response> {
    let followed = state.db.get_user_by_id(followed_id)?.ok_or(ApiError::NotFound)?;

    if state.db.add_follow(user.id, followed.id)? {
        info!("User {} now follows {}", user.id, followed.id);
    }

    Ok(redirect(&format!("/users/{}/following", user.id)))
}

pub async fn stop_following(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(followed_id): Path<i64>,
) -> ApiResult<Response> {
    let followed = state.db.get_user_by_id(followed_id)?.ok_or(ApiError::NotFound)?;

    if state.db.remove_follow(user.id, followed.id)? {
        info!("User {} stopped following {}", user.id, followed.id);
    }

    Ok(redirect(&format!("/users/{}/following", user.id)))
}

fn edit_profile_page(
    state: &AppState,
    session: &Session,
    user: &UserRow,
    error: Option<&str>,
) -> ApiResult<Response> {
    let page = state.views.page(
        "edit_profile",
        "Edit profile",
        session,
        Some(user),
        &json!({ "user": user_view(user), "email": user.email, "error": error }),
    )?;
    Ok(page.into_response())
}

pub async fn edit_profile_form(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> ApiResult<Response> {
    edit_profile_page(&state, &session, &user, None)
}

/// Empty input means "not set".
fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn profile_update(form: ProfileForm) -> Result<UserUpdate, String> {
    let username = form.username.and_then(non_empty);
    if let Some(username) = &username {
        validate_username(username)?;
    }

    let email = form.email.and_then(non_empty);
    if let Some(email) = &email {
        validate_email(email)?;
    }

    Ok(UserUpdate {
        username,
        email,
        image_url: form
            .image_url
            .map(|url| non_empty(url).unwrap_or_else(|| DEFAULT_IMAGE_URL.to_string())),
        header_image_url: form
            .header_image_url
            .map(|url| non_empty(url).unwrap_or_else(|| DEFAULT_HEADER_IMAGE_URL.to_string())),
        bio: form.bio.map(non_empty),
        location: form.location.map(non_empty),
    })
}

/// Apply profile changes once the current password has been re-entered.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Form(mut form): Form<ProfileForm>,
) -> ApiResult<Response> {
    let db_state = state.clone();
    let username = user.username.clone();
    let password = std::mem::take(&mut form.password);
    let confirmed = run_blocking(move || {
        authenticate(&db_state.db, &db_state.hasher, &username, &password)
    })
    .await?;

    if confirmed.is_none() {
        info!("Profile update for user {} refused: wrong password", user.id);
        return edit_profile_page(&state, &session, &user, Some("Wrong password. Try again."));
    }

    let update = match profile_update(form) {
        Ok(update) => update,
        Err(reason) => return edit_profile_page(&state, &session, &user, Some(&reason)),
    };

    if !state.db.update_user(user.id, &update)? {
        return edit_profile_page(&state, &session, &user, Some("Username or email already taken."));
    }

    info!("User {} updated their profile", user.id);
    Ok(redirect(&format!("/users/{}", user.id)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> ApiResult<Response> {
    state.db.delete_user(user.id)?;
    session.logout();
    info!("User {} deleted their account", user.id);

    Ok(redirect("/signup"))
}
