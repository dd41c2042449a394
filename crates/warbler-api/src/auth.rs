use std::sync::Arc;

use anyhow::anyhow;
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Form,
    extract::State,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{info, warn};

use warbler_db::Database;
use warbler_db::models::UserRow;
use warbler_types::api::{LoginForm, SignupForm};

use crate::error::{ApiError, ApiResult};
use crate::middleware::{CurrentUser, Session};
use crate::validation::{validate_email, validate_password, validate_username};
use crate::views::{Views, redirect};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub session_key: String,
    pub hasher: Argon2<'static>,
    pub views: Views,
}

impl AppStateInner {
    pub fn new(db: Database, session_key: String, hasher: Argon2<'static>) -> anyhow::Result<Self> {
        Ok(Self {
            db,
            session_key,
            hasher,
            views: Views::new()?,
        })
    }
}

/// Argon2id with the given memory cost (KiB) and number of passes.
pub fn password_hasher(memory_kib: u32, iterations: u32) -> anyhow::Result<Argon2<'static>> {
    let params = Params::new(memory_kib, iterations, Params::DEFAULT_P_COST, None)
        .map_err(|e| anyhow!("invalid argon2 parameters: {}", e))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

pub fn hash_password(hasher: &Argon2<'_>, password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check `password` against a stored PHC string. Parameters embedded in the
/// hash win over the hasher's own, so old hashes keep verifying.
pub fn verify_password(hasher: &Argon2<'_>, stored: &str, password: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => hasher.verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            warn!("Unparseable password hash: {}", e);
            false
        }
    }
}

/// Create a user with a hashed password.
///
/// Returns `Ok(None)` and writes nothing when a required field is missing or
/// invalid, or when the username or email is already taken.
pub fn signup(
    db: &Database,
    hasher: &Argon2<'_>,
    username: &str,
    email: &str,
    password: &str,
    image_url: Option<&str>,
) -> ApiResult<Option<UserRow>> {
    let checks = validate_username(username)
        .and_then(|_| validate_email(email))
        .and_then(|_| validate_password(password));
    if let Err(reason) = checks {
        info!("Signup refused: {}", reason);
        return Ok(None);
    }

    let image_url = image_url.filter(|url| !url.trim().is_empty());
    let password_hash = hash_password(hasher, password)?;

    Ok(db.create_user(username, email, &password_hash, image_url)?)
}

/// The user named `username`, if `password` is theirs.
pub fn authenticate(
    db: &Database,
    hasher: &Argon2<'_>,
    username: &str,
    password: &str,
) -> ApiResult<Option<UserRow>> {
    let Some(user) = db.get_user_by_username(username)? else {
        return Ok(None);
    };

    if verify_password(hasher, &user.password, password) {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

/// Run password hashing off the async runtime.
pub(crate) async fn run_blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

// -- Handlers --

pub async fn signup_form(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Response> {
    let page = state.views.page(
        "signup",
        "Sign up",
        &session,
        current.0.as_ref(),
        &json!({ "form": {} }),
    )?;
    Ok(page.into_response())
}

pub async fn signup_submit(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(current): Extension<CurrentUser>,
    Form(form): Form<SignupForm>,
) -> ApiResult<Response> {
    let db_state = state.clone();
    let (username, email, password, image_url) = (
        form.username.clone(),
        form.email.clone(),
        form.password.clone(),
        form.image_url.clone(),
    );
    let user = run_blocking(move || {
        signup(
            &db_state.db,
            &db_state.hasher,
            &username,
            &email,
            &password,
            Some(image_url.as_str()),
        )
    })
    .await?;

    match user {
        Some(user) => {
            info!("New user {} ({})", user.username, user.id);
            session.login(user.id);
            Ok(redirect("/"))
        }
        None => {
            let page = state.views.page(
                "signup",
                "Sign up",
                &session,
                current.0.as_ref(),
                &json!({
                    "error": "Username or email already taken, or the details are invalid.",
                    "form": { "username": form.username, "email": form.email, "image_url": form.image_url },
                }),
            )?;
            Ok(page.into_response())
        }
    }
}

pub async fn login_form(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Response> {
    let page = state
        .views
        .page("login", "Log in", &session, current.0.as_ref(), &json!({}))?;
    Ok(page.into_response())
}

pub async fn login_submit(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(current): Extension<CurrentUser>,
    Form(form): Form<LoginForm>,
) -> ApiResult<Response> {
    let db_state = state.clone();
    let (username, password) = (form.username.clone(), form.password);
    let user = run_blocking(move || {
        authenticate(&db_state.db, &db_state.hasher, &username, &password)
    })
    .await?;

    match user {
        Some(user) => {
            session.login(user.id);
            session.flash("success", format!("Hello, {}!", user.username));
            Ok(redirect("/"))
        }
        None => {
            let page = state.views.page(
                "login",
                "Log in",
                &session,
                current.0.as_ref(),
                &json!({ "error": "Invalid credentials.", "username": form.username }),
            )?;
            Ok(page.into_response())
        }
    }
}

pub async fn logout(Extension(session): Extension<Session>) -> Response {
    session.logout();
    session.flash("success", "You have successfully logged out.");
    redirect("/")
}
