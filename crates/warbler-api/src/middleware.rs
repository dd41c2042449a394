use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    Extension,
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use warbler_db::models::UserRow;
use warbler_types::models::Flash;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::views::redirect;

pub const SESSION_COOKIE: &str = "warbler_session";

const SESSION_TTL_DAYS: i64 = 14;

/// Everything a browser session remembers between requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub curr_user: Option<i64>,
    #[serde(default)]
    pub flashes: Vec<Flash>,
}

impl SessionData {
    fn is_empty(&self) -> bool {
        self.curr_user.is_none() && self.flashes.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    curr_user: Option<i64>,
    #[serde(default)]
    flashes: Vec<Flash>,
    exp: usize,
}

/// Sign session data into the cookie value.
pub fn encode_session(data: &SessionData, secret: &str) -> Result<String, ApiError> {
    let claims = Claims {
        curr_user: data.curr_user,
        flashes: data.flashes.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(SESSION_TTL_DAYS)).timestamp() as usize,
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Verify a cookie value. Tampered or expired tokens yield `None`.
pub fn decode_session(token: &str, secret: &str) -> Option<SessionData> {
    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(data) => Some(SessionData {
            curr_user: data.claims.curr_user,
            flashes: data.claims.flashes,
        }),
        Err(e) => {
            debug!("Discarding session cookie: {}", e);
            None
        }
    }
}

/// Request-scoped handle on the session. Cloned into every handler that
/// needs it; writes are picked up by `load_session` on the way out.
#[derive(Clone, Default)]
pub struct Session {
    inner: Arc<Mutex<SessionState>>,
}

#[derive(Default)]
struct SessionState {
    data: SessionData,
    dirty: bool,
}

impl Session {
    pub fn new(data: SessionData) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState { data, dirty: false })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn user_id(&self) -> Option<i64> {
        self.state().data.curr_user
    }

    pub fn login(&self, user_id: i64) {
        let mut state = self.state();
        state.data.curr_user = Some(user_id);
        state.dirty = true;
    }

    pub fn logout(&self) {
        let mut state = self.state();
        state.data.curr_user = None;
        state.dirty = true;
    }

    pub fn flash(&self, category: &str, message: impl Into<String>) {
        let mut state = self.state();
        state.data.flashes.push(Flash {
            category: category.to_string(),
            message: message.into(),
        });
        state.dirty = true;
    }

    /// Drain pending flashes for display.
    pub fn take_flashes(&self) -> Vec<Flash> {
        let mut state = self.state();
        if state.data.flashes.is_empty() {
            return Vec::new();
        }
        state.dirty = true;
        std::mem::take(&mut state.data.flashes)
    }

    /// Set-Cookie value for a changed session, `None` if nothing changed.
    fn to_cookie(&self, secret: &str) -> Result<Option<Cookie<'static>>, ApiError> {
        let state = self.state();
        if !state.dirty {
            return Ok(None);
        }

        if state.data.is_empty() {
            let mut cookie = Cookie::build((SESSION_COOKIE, "")).path("/").build();
            cookie.make_removal();
            return Ok(Some(cookie));
        }

        let token = encode_session(&state.data, secret)?;
        Ok(Some(
            Cookie::build((SESSION_COOKIE, token))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .build(),
        ))
    }
}

/// The user resolved from the session, if any.
#[derive(Clone)]
pub struct CurrentUser(pub Option<UserRow>);

/// Present only behind `require_login`.
#[derive(Clone)]
pub struct AuthUser(pub UserRow);

/// Decode the session cookie, resolve the current user and write the cookie
/// back if the handler changed the session.
pub async fn load_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let jar = CookieJar::from_headers(req.headers());
    let data = jar
        .get(SESSION_COOKIE)
        .and_then(|c| decode_session(c.value(), &state.session_key))
        .unwrap_or_default();

    let user = match data.curr_user {
        Some(id) => {
            let user = state.db.get_user_by_id(id)?;
            if user.is_none() {
                warn!("Session refers to unknown user {}", id);
            }
            user
        }
        None => None,
    };

    let session = Session::new(data);
    req.extensions_mut().insert(session.clone());
    req.extensions_mut().insert(CurrentUser(user));

    let mut response = next.run(req).await;

    if let Some(cookie) = session.to_cookie(&state.session_key)? {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => error!("Unencodable session cookie: {}", e),
        }
    }

    Ok(response)
}

/// Gate for pages that need a logged-in user.
pub async fn require_login(
    Extension(current): Extension<CurrentUser>,
    Extension(session): Extension<Session>,
    mut req: Request,
    next: Next,
) -> Response {
    match current.0 {
        Some(user) => {
            req.extensions_mut().insert(AuthUser(user));
            next.run(req).await
        }
        None => {
            session.flash("danger", "Access unauthorized.");
            redirect("/")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn session_survives_cookie_round_trip() {
        let data = SessionData {
            curr_user: Some(7),
            flashes: vec![Flash {
                category: "success".into(),
                message: "Hello, u1!".into(),
            }],
        };

        let token = encode_session(&data, SECRET).unwrap();
        assert_eq!(decode_session(&token, SECRET), Some(data));
    }

    #[test]
    fn tampered_session_is_discarded() {
        let token = encode_session(&SessionData::default(), SECRET).unwrap();
        assert_eq!(decode_session(&token, "other-secret"), None);
        assert_eq!(decode_session("not-a-token", SECRET), None);
    }

    #[test]
    fn untouched_session_writes_no_cookie() {
        let session = Session::new(SessionData {
            curr_user: Some(1),
            flashes: vec![],
        });
        assert!(session.to_cookie(SECRET).unwrap().is_none());

        // Draining an empty flash list is not a change either.
        assert!(session.take_flashes().is_empty());
        assert!(session.to_cookie(SECRET).unwrap().is_none());
    }

    #[test]
    fn logout_removes_cookie() {
        let session = Session::new(SessionData {
            curr_user: Some(1),
            flashes: vec![],
        });
        session.logout();

        let cookie = session.to_cookie(SECRET).unwrap().unwrap();
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "");
    }

    #[test]
    fn flashes_are_consumed_once() {
        let session = Session::default();
        session.flash("danger", "Access unauthorized.");

        let cookie = session.to_cookie(SECRET).unwrap().unwrap();
        let stored = decode_session(cookie.value(), SECRET).unwrap();
        assert_eq!(stored.flashes.len(), 1);

        assert_eq!(session.take_flashes()[0].message, "Access unauthorized.");
        assert!(session.take_flashes().is_empty());
        assert_eq!(session.user_id(), None);
    }
}
