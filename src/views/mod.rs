//! Read-side projections of posts for the public pages and the dashboard list.

pub mod handlers;


use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::draft::parse_date;
use crate::posting::models::{Post, PostBody};
use crate::sync::FeedStatus;

/// Human-readable date, e.g. `May 1, 2024`.
pub fn format_date(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return "No date provided".to_string();
    }
    match parse_date(value) {
        Some(date) => date.format("%B %-d, %Y").to_string(),
        None => "Invalid date".to_string(),
    }
}

/// A post as a reader sees it. `cover` is the first image, if any.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub collection: String,
    pub heading: String,
    pub category: Option<String>,
    pub text: String,
    pub date: String,
    pub display_date: String,
    pub cover: Option<String>,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Post> for PostView {
    fn from(post: &Post) -> Self {
        let images: Vec<String> = post
            .body
            .images()
            .iter()
            .map(|img| img.source().to_string())
            .collect();
        let category = match &post.body {
            PostBody::Event(_) => None,
            PostBody::News(a) | PostBody::Blog(a) => Some(a.category.clone()),
        };

        Self {
            id: post.id.clone(),
            collection: post.kind().collection().to_string(),
            heading: post.body.label().to_string(),
            category,
            text: post.body.text().to_string(),
            date: post.body.date().to_string(),
            display_date: format_date(post.body.date()),
            cover: images.first().cloned(),
            images,
            created_at: post.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FeedResponse {
    pub collection: String,
    pub status: FeedStatus,
    pub posts: Vec<PostView>,
}

pub fn project(posts: &[Post]) -> Vec<PostView> {
    posts.iter().map(PostView::from).collect()
}
