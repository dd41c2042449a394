mod common;

use axum::http::StatusCode;
use warbler_db::models::UserUpdate;

use common::TestApp;

/// `u1` with bio "test_bio", location "test_location" and one message.
fn setup() -> (TestApp, i64) {
    let app = TestApp::new();
    let u1 = app.signup("u1");
    app.state
        .db
        .update_user(
            u1.id,
            &UserUpdate {
                bio: Some(Some("test_bio".into())),
                location: Some(Some("test_location".into())),
                ..Default::default()
            },
        )
        .unwrap();
    app.state.db.insert_message(u1.id, "m1-text").unwrap();
    (app, u1.id)
}

#[tokio::test]
async fn logout() {
    let (mut app, u1) = setup();
    app.login_as(u1);

    let resp = app.post_and_follow("/logout", &[]).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.html.contains("signup"));
    assert!(resp.html.contains("You have successfully logged out."));

    let resp_anon = app.get(&format!("/users/{u1}/following")).await;
    assert_eq!(resp_anon.status, StatusCode::FOUND);

    let resp_anon = app.follow(resp_anon).await;
    assert_eq!(resp_anon.status, StatusCode::OK);
    assert!(resp_anon.html.contains("signup"));
}

#[tokio::test]
async fn show_user() {
    let (mut app, u1) = setup();
    app.login_as(u1);

    let resp = app.get(&format!("/users/{u1}")).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.html.contains("test_bio"));
    assert!(resp.html.contains("test_location"));
    assert!(resp.html.contains("m1-text"));
}

#[tokio::test]
async fn show_unknown_user() {
    let (mut app, u1) = setup();
    app.login_as(u1);

    let resp = app.get("/users/999").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn show_followers() {
    let (mut app, u1) = setup();
    let u2 = app.signup("u2");
    app.state.db.add_follow(u2.id, u1).unwrap();
    app.login_as(u1);

    let resp = app.get(&format!("/users/{u1}/followers")).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.html.contains("test_bio"));
    assert!(resp.html.contains("@u2"));
}

#[tokio::test]
async fn show_following() {
    let (mut app, u1) = setup();
    app.login_as(u1);

    let resp = app.get(&format!("/users/{u1}/following")).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.html.contains("test_bio"));
}

#[tokio::test]
async fn list_users() {
    let (mut app, u1) = setup();
    app.login_as(u1);

    let resp = app.get("/users").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.html.contains("test_bio"));
}

#[tokio::test]
async fn search_users() {
    let (mut app, _) = setup();
    app.signup("alice");

    let resp = app.get("/users?q=ali").await;
    assert!(resp.html.contains("@alice"));
    assert!(!resp.html.contains("@u1"));

    let none = app.get("/users?q=zzz").await;
    assert!(none.html.contains("Sorry, no users found"));
}

#[tokio::test]
async fn follow_and_stop_following() {
    let (mut app, u1) = setup();
    let u2 = app.signup("u2");
    app.login_as(u1);

    let resp = app.post(&format!("/users/follow/{}", u2.id), &[]).await;
    assert_eq!(resp.status, StatusCode::FOUND);
    assert_eq!(resp.location, Some(format!("/users/{u1}/following")));
    assert!(app.state.db.is_following(u1, u2.id).unwrap());
    assert!(app.state.db.is_followed_by(u2.id, u1).unwrap());

    let following = app.follow(resp).await;
    assert!(following.html.contains("@u2"));

    app.post(&format!("/users/stop-following/{}", u2.id), &[]).await;
    assert!(!app.state.db.is_following(u1, u2.id).unwrap());
}

#[tokio::test]
async fn profile() {
    let (mut app, u1) = setup();
    app.login_as(u1);

    let resp = app
        .post_and_follow(
            "/users/profile",
            &[
                ("username", "updated_username"),
                ("bio", "updated_bio"),
                ("password", "password"),
            ],
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.html.contains("updated_username"));
    assert!(resp.html.contains("updated_bio"));

    let user = app.state.db.get_user_by_id(u1).unwrap().unwrap();
    assert_eq!(user.email, "u1@email.com");
    assert_eq!(user.location.as_deref(), Some("test_location"));
}

#[tokio::test]
async fn profile_wrong_password() {
    let (mut app, u1) = setup();
    app.login_as(u1);

    let resp = app
        .post_and_follow(
            "/users/profile",
            &[("username", "updatedU"), ("password", "wrongpassword")],
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.html.contains("Wrong password. Try again."));

    let user = app.state.db.get_user_by_id(u1).unwrap().unwrap();
    assert_eq!(user.username, "u1");
    assert_eq!(user.bio.as_deref(), Some("test_bio"));
}

#[tokio::test]
async fn profile_taken_username() {
    let (mut app, u1) = setup();
    app.signup("u2");
    app.login_as(u1);

    let resp = app
        .post("/users/profile", &[("username", "u2"), ("password", "password")])
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.html.contains("Username or email already taken."));
    assert_eq!(app.state.db.get_user_by_id(u1).unwrap().unwrap().username, "u1");
}

#[tokio::test]
async fn edit_profile_form_is_prefilled() {
    let (mut app, u1) = setup();
    app.login_as(u1);

    let resp = app.get("/users/profile").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.html.contains("u1@email.com"));
    assert!(resp.html.contains("test_location"));
}

#[tokio::test]
async fn delete_account() {
    let (mut app, u1) = setup();
    app.login_as(u1);

    let resp = app.post("/users/delete", &[]).await;
    assert_eq!(resp.status, StatusCode::FOUND);
    assert_eq!(resp.location.as_deref(), Some("/signup"));

    assert!(app.state.db.get_user_by_id(u1).unwrap().is_none());
    assert_eq!(app.state.db.get_user_counts(u1).unwrap().messages, 0);

    let home = app.get("/").await;
    assert!(home.html.contains("Sign up now"));
}
