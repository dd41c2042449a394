use serde::{Deserialize, Serialize};

/// Public view of a user, safe to hand to templates (no email, no hash).
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub image_url: String,
    pub header_image_url: String,
    pub bio: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i64,
    pub text: String,
    /// Already formatted for display, e.g. "16 October 2026".
    pub timestamp: String,
    pub author: User,
    pub liked: bool,
    /// Written by the viewing user.
    pub own: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserStats {
    pub messages: i64,
    pub following: i64,
    pub followers: i64,
    pub likes: i64,
}

/// One-time status text shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flash {
    pub category: String,
    pub message: String,
}
