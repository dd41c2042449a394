//! Input validation for signup and profile forms

use regex::Regex;
use std::sync::OnceLock;

pub const MAX_MESSAGE_CHARS: usize = 140;
pub const MIN_PASSWORD_CHARS: usize = 6;

/// Validate username
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.trim().is_empty() {
        return Err("Username is required".to_string());
    }

    if username.chars().count() > 30 {
        return Err("Username must be at most 30 characters long".to_string());
    }

    Ok(())
}

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Invalid email address".to_string());
    }

    Ok(())
}

/// Validate password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(format!("Password must be at least {MIN_PASSWORD_CHARS} characters long"));
    }

    Ok(())
}

/// Validate the text of a new message
pub fn validate_message(text: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err("Message can't be empty".to_string());
    }

    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(format!("Message must be at most {MAX_MESSAGE_CHARS} characters long"));
    }

    Ok(())
}
