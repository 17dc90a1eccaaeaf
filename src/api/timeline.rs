// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! Reverse-chronological timeline.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::ApiError;
use crate::models::{Post, TimelineResponse};
use crate::state::AppState;

/// Default page size when the client does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Upper bound on a single page.
pub const MAX_PAGE_SIZE: usize = 50;

/// Cursor pagination query.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PageQuery {
    /// Opaque cursor from a previous page (`next_cursor`)
    pub cursor: Option<String>,
    /// Page size, capped at 50
    pub limit: Option<usize>,
}

impl PageQuery {
    /// Parse the cursor into the "strictly older than" bound.
    pub fn before(&self) -> Result<Option<DateTime<Utc>>, ApiError> {
        self.cursor
            .as_deref()
            .map(|cursor| {
                DateTime::parse_from_rfc3339(cursor)
                    .map(|ts| ts.with_timezone(&Utc))
                    .map_err(|_| ApiError::validation("Invalid cursor").with_field("cursor"))
            })
            .transpose()
    }

    pub fn page_size(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

/// Assemble a page: fetch one extra row to detect a following page, then
/// derive the continuation cursor from the last visible post.
pub(crate) fn page_response(mut posts: Vec<Post>, limit: usize) -> TimelineResponse {
    let has_more = posts.len() > limit;
    posts.truncate(limit);
    let next_cursor = if has_more {
        posts.last().map(|post| post.created_at.to_rfc3339())
    } else {
        None
    };

    TimelineResponse {
        posts,
        next_cursor,
        has_more,
    }
}

/// Global timeline, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/timeline",
    tag = "Timeline",
    security(("bearer" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "A timeline page", body = TimelineResponse),
        (status = 401, description = "Unauthorized"),
    )
)]
pub async fn get_timeline(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<TimelineResponse>, ApiError> {
    let before = query.before()?;
    let limit = query.page_size();

    let mut posts = state.posts.get_timeline(before, limit + 1)?;
    for post in &mut posts {
        post.author = state.users.get_user_by_id(&post.author_id)?;
    }

    Ok(Json(page_response(posts, limit)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_at(id: &str, ts: DateTime<Utc>) -> Post {
        Post {
            id: id.into(),
            author_id: "a".into(),
            author: None,
            content: "x".into(),
            created_at: ts,
        }
    }

    #[test]
    fn page_response_reports_continuation() {
        let now = Utc::now();
        let posts = vec![
            post_at("1", now),
            post_at("2", now - chrono::Duration::seconds(1)),
            post_at("3", now - chrono::Duration::seconds(2)),
        ];

        let page = page_response(posts, 2);
        assert_eq!(page.posts.len(), 2);
        assert!(page.has_more);
        let cursor = page.next_cursor.expect("cursor for a continued page");
        let parsed = DateTime::parse_from_rfc3339(&cursor).unwrap();
        assert_eq!(parsed.with_timezone(&Utc), page.posts[1].created_at);
    }

    #[test]
    fn page_response_ends_without_cursor() {
        let page = page_response(vec![post_at("1", Utc::now())], 2);
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn page_query_rejects_garbage_cursor() {
        let query = PageQuery {
            cursor: Some("yesterday-ish".into()),
            limit: None,
        };
        assert!(query.before().is_err());
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(PageQuery { cursor: None, limit: Some(500) }.page_size(), MAX_PAGE_SIZE);
        assert_eq!(PageQuery { cursor: None, limit: Some(0) }.page_size(), 1);
        assert_eq!(PageQuery { cursor: None, limit: None }.page_size(), DEFAULT_PAGE_SIZE);
    }
}
