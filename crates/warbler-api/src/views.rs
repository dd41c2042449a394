//! Page rendering. Templates are embedded in the binary and auto-escaped by
//! handlebars; only the rendered page body is inserted raw into the layout.

use std::collections::HashSet;

use axum::{
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use handlebars::Handlebars;
use serde_json::{Value, json};

use warbler_db::models::{MessageRow, UserCounts, UserRow};
use warbler_types::models::{Message, User, UserStats};

use crate::error::ApiResult;
use crate::middleware::Session;

const TEMPLATES: &[(&str, &str)] = &[
    ("base", include_str!("../templates/base.hbs")),
    ("home_anon", include_str!("../templates/home_anon.hbs")),
    ("home", include_str!("../templates/home.hbs")),
    ("signup", include_str!("../templates/signup.hbs")),
    ("login", include_str!("../templates/login.hbs")),
    ("users_index", include_str!("../templates/users_index.hbs")),
    ("user_detail", include_str!("../templates/user_detail.hbs")),
    ("user_list", include_str!("../templates/user_list.hbs")),
    ("user_likes", include_str!("../templates/user_likes.hbs")),
    ("edit_profile", include_str!("../templates/edit_profile.hbs")),
    ("new_message", include_str!("../templates/new_message.hbs")),
    ("show_message", include_str!("../templates/show_message.hbs")),
];

const PARTIALS: &[(&str, &str)] = &[
    ("profile_header", include_str!("../templates/profile_header.hbs")),
    ("message_list", include_str!("../templates/message_list.hbs")),
];

pub struct Views {
    hbs: Handlebars<'static>,
}

impl Views {
    pub fn new() -> anyhow::Result<Self> {
        let mut hbs = Handlebars::new();
        for (name, source) in PARTIALS {
            hbs.register_partial(name, *source)?;
        }
        for (name, source) in TEMPLATES {
            hbs.register_template_string(name, *source)?;
        }
        Ok(Self { hbs })
    }

    /// Render `template` with `data` inside the site layout. Pending flashes
    /// are consumed from the session.
    pub fn page(
        &self,
        template: &str,
        title: &str,
        session: &Session,
        viewer: Option<&UserRow>,
        data: &Value,
    ) -> ApiResult<Html<String>> {
        let content = self.hbs.render(template, data)?;
        let layout = json!({
            "title": title,
            "content": content,
            "flashes": session.take_flashes(),
            "current_user": viewer.map(user_view),
        });
        Ok(Html(self.hbs.render("base", &layout)?))
    }
}

/// 302 Found, the status browsers and form posts expect after a mutation.
pub fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

pub fn user_view(row: &UserRow) -> User {
    User {
        id: row.id,
        username: row.username.clone(),
        image_url: row.image_url.clone(),
        header_image_url: row.header_image_url.clone(),
        bio: row.bio.clone(),
        location: row.location.clone(),
    }
}

pub fn users_view(rows: &[UserRow]) -> Vec<User> {
    rows.iter().map(user_view).collect()
}

pub fn stats_view(counts: UserCounts) -> UserStats {
    UserStats {
        messages: counts.messages,
        following: counts.following,
        followers: counts.followers,
        likes: counts.likes,
    }
}

/// Messages as seen by `viewer_id`, who has liked the messages in `liked`.
pub fn messages_view(rows: &[MessageRow], viewer_id: i64, liked: &HashSet<i64>) -> Vec<Message> {
    rows.iter()
        .map(|row| Message {
            id: row.id,
            text: row.text.clone(),
            timestamp: row
                .created_at()
                .map(|ts| ts.format("%d %B %Y").to_string())
                .unwrap_or_else(|| row.timestamp.clone()),
            author: User {
                id: row.user_id,
                username: row.author_username.clone(),
                image_url: row.author_image_url.clone(),
                header_image_url: String::new(),
                bio: None,
                location: None,
            },
            liked: liked.contains(&row.id),
            own: row.user_id == viewer_id,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(bio: &str) -> UserRow {
        UserRow {
            id: 1,
            email: "u1@email.com".into(),
            username: "u1".into(),
            image_url: "/static/images/default-pic.png".into(),
            header_image_url: "/static/images/warbler-hero.jpg".into(),
            bio: Some(bio.into()),
            location: None,
            password: "hash".into(),
            created_at: "2026-10-16 12:00:00".into(),
        }
    }

    #[test]
    fn pages_escape_user_content() {
        let views = Views::new().unwrap();
        let user = row("<script>alert(1)</script>");
        let data = json!({ "users": users_view(std::slice::from_ref(&user)), "q": "" });

        let Html(html) = views
            .page("users_index", "Users", &Session::default(), None, &data)
            .unwrap();

        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
    }

    #[test]
    fn layout_shows_and_consumes_flashes() {
        let views = Views::new().unwrap();
        let session = Session::default();
        session.flash("danger", "Access unauthorized.");

        let Html(html) = views
            .page("home_anon", "Warbler", &session, None, &json!({}))
            .unwrap();
        assert!(html.contains("Access unauthorized."));
        assert!(html.contains("/signup"));
        assert!(session.take_flashes().is_empty());
    }

    #[test]
    fn message_timestamps_are_humanized() {
        let rows = vec![MessageRow {
            id: 3,
            text: "hi".into(),
            timestamp: "2026-10-16 12:00:00".into(),
            user_id: 1,
            author_username: "u1".into(),
            author_image_url: "/a.png".into(),
        }];

        let liked = HashSet::from([3]);
        let messages = messages_view(&rows, 2, &liked);
        assert_eq!(messages[0].timestamp, "16 October 2026");
        assert!(messages[0].liked);
        assert!(!messages[0].own);
    }

    #[test]
    fn redirect_is_302() {
        let resp = redirect("/users/1");
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[header::LOCATION], "/users/1");
    }
}
