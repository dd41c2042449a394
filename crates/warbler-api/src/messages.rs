use std::collections::HashSet;

use axum::{
    Extension, Form,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{info, warn};

use warbler_types::api::MessageForm;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{AuthUser, CurrentUser, Session};
use crate::validation::validate_message;
use crate::views::{messages_view, redirect, stats_view, user_view};

const FEED_LIMIT: u32 = 100;

/// Landing page for visitors, followed-users feed for everyone else.
pub async fn home(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Response> {
    let Some(user) = current.0 else {
        let page = state
            .views
            .page("home_anon", "Warbler", &session, None, &json!({}))?;
        return Ok(page.into_response());
    };

    let rows = state.db.get_feed(user.id, FEED_LIMIT)?;
    let liked: HashSet<i64> = state.db.get_liked_message_ids(user.id)?.into_iter().collect();
    let stats = stats_view(state.db.get_user_counts(user.id)?);

    let page = state.views.page(
        "home",
        "Home",
        &session,
        Some(&user),
        &json!({
            "user": user_view(&user),
            "stats": stats,
            "messages": messages_view(&rows, user.id, &liked),
        }),
    )?;
    Ok(page.into_response())
}

pub async fn new_message_form(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> ApiResult<Response> {
    let page = state
        .views
        .page("new_message", "New message", &session, Some(&user), &json!({}))?;
    Ok(page.into_response())
}

pub async fn add_message(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Form(form): Form<MessageForm>,
) -> ApiResult<Response> {
    if let Err(reason) = validate_message(&form.text) {
        let page = state.views.page(
            "new_message",
            "New message",
            &session,
            Some(&user),
            &json!({ "error": reason, "text": form.text }),
        )?;
        return Ok(page.into_response());
    }

    let message_id = state.db.insert_message(user.id, &form.text)?;
    info!("User {} posted message {}", user.id, message_id);

    Ok(redirect(&format!("/users/{}", user.id)))
}

pub async fn show_message(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(message_id): Path<i64>,
) -> ApiResult<Response> {
    let row = state.db.get_message(message_id)?.ok_or(ApiError::NotFound)?;
    let liked: HashSet<i64> = state.db.get_liked_message_ids(user.id)?.into_iter().collect();
    let message = messages_view(std::slice::from_ref(&row), user.id, &liked)
        .pop()
        .ok_or(ApiError::NotFound)?;

    let page = state.views.page(
        "show_message",
        "Message",
        &session,
        Some(&user),
        &json!({ "message": message }),
    )?;
    Ok(page.into_response())
}

/// Only the author may delete a message.
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(message_id): Path<i64>,
) -> ApiResult<Response> {
    let message = state.db.get_message(message_id)?.ok_or(ApiError::NotFound)?;

    if message.user_id != user.id {
        warn!("User {} tried to delete message {} of user {}", user.id, message.id, message.user_id);
        session.flash("danger", "Access unauthorized.");
        return Ok(redirect("/"));
    }

    state.db.delete_message(message.id)?;
    info!("User {} deleted message {}", user.id, message.id);

    Ok(redirect(&format!("/users/{}", user.id)))
}

pub async fn toggle_like(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(message_id): Path<i64>,
) -> ApiResult<Response> {
    let message = state.db.get_message(message_id)?.ok_or(ApiError::NotFound)?;

    if message.user_id == user.id {
        session.flash("danger", "You can't like your own warble.");
        return Ok(redirect("/"));
    }

    let liked = state.db.toggle_like(user.id, message.id)?;
    info!("User {} {} message {}", user.id, if liked { "liked" } else { "unliked" }, message.id);

    Ok(redirect("/"))
}
