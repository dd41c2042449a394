pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod users;
pub mod validation;
pub mod views;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};

use crate::auth::AppState;
use crate::middleware::{load_session, require_login};

/// Every Warbler route. Session handling wraps the whole tree; the protected
/// half additionally requires a logged-in user.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(messages::home))
        .route("/signup", get(auth::signup_form).post(auth::signup_submit))
        .route("/login", get(auth::login_form).post(auth::login_submit))
        .route("/logout", post(auth::logout))
        .route("/users", get(users::list_users));

    let protected_routes = Router::new()
        .route("/users/profile", get(users::edit_profile_form).post(users::update_profile))
        .route("/users/delete", post(users::delete_user))
        .route("/users/follow/{user_id}", post(users::follow))
        .route("/users/stop-following/{user_id}", post(users::stop_following))
        .route("/users/{user_id}", get(users::show_user))
        .route("/users/{user_id}/following", get(users::show_following))
        .route("/users/{user_id}/followers", get(users::show_followers))
        .route("/users/{user_id}/likes", get(users::show_likes))
        .route("/messages/new", get(messages::new_message_form).post(messages::add_message))
        .route("/messages/{message_id}", get(messages::show_message))
        .route("/messages/{message_id}/delete", post(messages::delete_message))
        .route("/messages/{message_id}/like", post(messages::toggle_like))
        .route_layer(from_fn(require_login));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(from_fn_with_state(state.clone(), load_session))
        .with_state(state)
}
