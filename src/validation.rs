// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! Account and content validation rules.
//!
//! Inputs are NFC-normalized before checking so visually identical Unicode
//! sequences validate (and collide) consistently.

use unicode_normalization::UnicodeNormalization;

use crate::error::ApiError;
use crate::models::UserUpdate;

/// Maximum post length in characters (not bytes).
pub const MAX_POST_CHARS: usize = 140;

/// Maximum display-name length in characters.
pub const MAX_DISPLAY_NAME_CHARS: usize = 50;

/// Maximum bio length in characters.
pub const MAX_BIO_CHARS: usize = 160;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 15;
const PASSWORD_MIN_BYTES: usize = 8;

/// Handles that can never be registered because they collide with routes or
/// well-known pages.
const RESERVED_USERNAMES: &[&str] = &[
    "admin", "root", "system", "murmur", "api", "help", "support", "me", "about", "settings",
    "login", "register", "auth", "posts", "users", "timeline", "search", "explore",
];

/// Validate a username: 3-15 characters, lowercase alphanumeric plus
/// underscore, no leading/trailing/consecutive underscores, not reserved.
pub fn validate_username(username: &str) -> Result<(), ApiError> {
    let lower: String = username.nfc().collect::<String>().to_lowercase();
    let length = lower.chars().count();

    if !(USERNAME_MIN..=USERNAME_MAX).contains(&length) {
        return Err(
            ApiError::validation("Username must be 3-15 characters").with_field("username")
        );
    }
    if !lower
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        || lower.starts_with('_')
        || lower.ends_with('_')
    {
        return Err(ApiError::validation(
            "Username must be alphanumeric and underscores only, cannot start or end with underscore",
        )
        .with_field("username"));
    }
    if lower.contains("__") {
        return Err(
            ApiError::validation("Username cannot contain consecutive underscores")
                .with_field("username"),
        );
    }
    if RESERVED_USERNAMES.contains(&lower.as_str()) {
        return Err(ApiError::validation("Username is reserved").with_field("username"));
    }
    Ok(())
}

/// Validate an email address structurally: one `@`, non-empty local part,
/// domain with at least one dot and no whitespace.
pub fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.is_empty() {
        return Err(ApiError::validation("Email is required").with_field("email"));
    }

    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();

    let ok = !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace);

    if !ok {
        return Err(ApiError::validation("Invalid email format").with_field("email"));
    }
    Ok(())
}

/// Validate a password: at least 8 bytes. Strength beyond length is the
/// user's business.
pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < PASSWORD_MIN_BYTES {
        return Err(
            ApiError::validation("Password must be at least 8 characters").with_field("password")
        );
    }
    Ok(())
}

/// Validate post content: non-empty after trimming, at most 140 characters.
pub fn validate_post_content(content: &str) -> Result<(), ApiError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Post content cannot be empty").with_field("content"));
    }
    if trimmed.chars().count() > MAX_POST_CHARS {
        return Err(ApiError::content_too_long(
            "Post must be 140 characters or fewer",
        ));
    }
    Ok(())
}

/// Validate a profile update: bounded display name and bio.
pub fn validate_user_update(update: &UserUpdate) -> Result<(), ApiError> {
    if let Some(display_name) = &update.display_name {
        if display_name.trim().is_empty() {
            return Err(ApiError::validation("Display name cannot be empty")
                .with_field("display_name"));
        }
        if display_name.chars().count() > MAX_DISPLAY_NAME_CHARS {
            return Err(
                ApiError::validation("Display name must be 50 characters or fewer")
                    .with_field("display_name"),
            );
        }
    }
    if let Some(bio) = &update.bio {
        if bio.chars().count() > MAX_BIO_CHARS {
            return Err(
                ApiError::validation("Bio must be 160 characters or fewer").with_field("bio")
            );
        }
    }
    Ok(())
}
