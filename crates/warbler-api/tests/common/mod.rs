//! Test client for driving the real router in-process.
//!
//! Each `TestApp` owns a fresh in-memory database, so the schema is recreated
//! for every test. The client keeps the session cookie between requests like
//! a browser would, and `login_as` writes a session directly, which lets a
//! test act as any user id (including ones that do not exist).

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use axum_extra::extract::cookie::Cookie;
use tower::ServiceExt;

use warbler_api::auth::{AppState, AppStateInner, password_hasher, signup};
use warbler_api::middleware::{SESSION_COOKIE, SessionData, encode_session};
use warbler_db::Database;
use warbler_db::models::UserRow;

const SECRET: &str = "test-secret";
const MAX_REDIRECTS: usize = 5;

pub struct TestApp {
    pub state: AppState,
    router: Router,
    session: Option<String>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub html: String,
}

impl TestApp {
    pub fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        // Cheapest argon2 cost; hashing speed is irrelevant here.
        let hasher = password_hasher(1024, 1).unwrap();
        let state: AppState = Arc::new(AppStateInner::new(db, SECRET.into(), hasher).unwrap());

        Self {
            router: warbler_api::router(state.clone()),
            state,
            session: None,
        }
    }

    /// Sign up `username` with email `{username}@email.com` and password "password".
    pub fn signup(&self, username: &str) -> UserRow {
        signup(
            &self.state.db,
            &self.state.hasher,
            username,
            &format!("{username}@email.com"),
            "password",
            None,
        )
        .unwrap()
        .unwrap()
    }

    pub fn login_as(&mut self, user_id: i64) {
        let data = SessionData {
            curr_user: Some(user_id),
            flashes: vec![],
        };
        self.session = Some(encode_session(&data, SECRET).unwrap());
    }

    /// Replace the session cookie with an arbitrary value.
    pub fn set_raw_session(&mut self, token: &str) {
        self.session = Some(token.to_string());
    }

    pub async fn get(&mut self, path: &str) -> TestResponse {
        let req = Request::get(path).body(Body::empty()).unwrap();
        self.send(req).await
    }

    pub async fn post(&mut self, path: &str, form: &[(&str, &str)]) -> TestResponse {
        let req = Request::post(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(serde_urlencoded::to_string(form).unwrap()))
            .unwrap();
        self.send(req).await
    }

    /// Keep issuing GETs while the response is a redirect.
    pub async fn follow(&mut self, mut resp: TestResponse) -> TestResponse {
        for _ in 0..MAX_REDIRECTS {
            match (resp.status.is_redirection(), resp.location.clone()) {
                (true, Some(location)) => resp = self.get(&location).await,
                _ => return resp,
            }
        }
        panic!("too many redirects");
    }

    pub async fn post_and_follow(&mut self, path: &str, form: &[(&str, &str)]) -> TestResponse {
        let resp = self.post(path, form).await;
        self.follow(resp).await
    }

    pub async fn get_and_follow(&mut self, path: &str) -> TestResponse {
        let resp = self.get(path).await;
        self.follow(resp).await
    }

    async fn send(&mut self, mut req: Request<Body>) -> TestResponse {
        if let Some(token) = &self.session {
            let cookie = format!("{SESSION_COOKIE}={token}");
            req.headers_mut()
                .insert(header::COOKIE, cookie.parse().unwrap());
        }

        let resp = self.router.clone().oneshot(req).await.unwrap();

        for value in resp.headers().get_all(header::SET_COOKIE) {
            let cookie = Cookie::parse(value.to_str().unwrap().to_string()).unwrap();
            if cookie.name() == SESSION_COOKIE {
                self.session = Some(cookie.value().to_string()).filter(|v| !v.is_empty());
            }
        }

        let status = resp.status();
        let location = resp
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();

        TestResponse {
            status,
            location,
            html: String::from_utf8(body.to_vec()).unwrap(),
        }
    }
}
