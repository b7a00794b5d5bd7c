use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::store::Document;

/// Which collection a post lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostKind {
    Event,
    News,
    Blog,
}

impl PostKind {
    pub const ALL: [PostKind; 3] = [PostKind::Event, PostKind::News, PostKind::Blog];

    /// Remote collection name. Writers and readers must agree on these exactly.
    pub fn collection(&self) -> &'static str {
        match self {
            PostKind::Event => "events",
            PostKind::News => "news",
            PostKind::Blog => "blogs",
        }
    }

    /// Dashboard page label, used in notifications.
    pub fn label(&self) -> &'static str {
        match self {
            PostKind::Event => "Events",
            PostKind::News => "News",
            PostKind::Blog => "Blogs",
        }
    }

    pub fn from_collection(name: &str) -> Option<Self> {
        PostKind::ALL.into_iter().find(|k| k.collection() == name)
    }
}

impl fmt::Display for PostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PostKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "event" | "events" => Ok(PostKind::Event),
            "news" => Ok(PostKind::News),
            "blog" | "blogs" => Ok(PostKind::Blog),
            other => Err(format!("unknown post kind '{}'", other)),
        }
    }
}

/// Image embedded directly in the document as a compressed data URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineImage {
    pub base64: String,
    pub mime_type: String,
    pub filename: String,
    pub processed_at: DateTime<Utc>,
}

/// Image kept in object storage and referenced by URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredImage {
    pub url: String,
    pub path: String,
    pub filename: String,
}

/// One picture attached to a post. A deployment uses exactly one representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Image {
    Inline(InlineImage),
    Stored(StoredImage),
}

impl Image {
    /// Value usable as an `<img src>`.
    pub fn source(&self) -> &str {
        match self {
            Image::Inline(img) => &img.base64,
            Image::Stored(img) => &img.url,
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            Image::Inline(img) => &img.filename,
            Image::Stored(img) => &img.filename,
        }
    }

    /// Storage path of the backing object, if there is one.
    pub fn backing_path(&self) -> Option<&str> {
        match self {
            Image::Inline(_) => None,
            Image::Stored(img) => Some(&img.path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPost {
    pub name: String,
    pub description: String,
    pub date: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

/// Shared shape of news items and blog entries. `content` may carry markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticlePost {
    pub title: String,
    pub category: String,
    pub content: String,
    pub date: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PostBody {
    Event(EventPost),
    News(ArticlePost),
    Blog(ArticlePost),
}

impl PostBody {
    pub fn kind(&self) -> PostKind {
        match self {
            PostBody::Event(_) => PostKind::Event,
            PostBody::News(_) => PostKind::News,
            PostBody::Blog(_) => PostKind::Blog,
        }
    }

    pub fn images(&self) -> &[Image] {
        match self {
            PostBody::Event(e) => &e.images,
            PostBody::News(a) | PostBody::Blog(a) => &a.images,
        }
    }

    pub fn date(&self) -> &str {
        match self {
            PostBody::Event(e) => &e.date,
            PostBody::News(a) | PostBody::Blog(a) => &a.date,
        }
    }

    /// Short heading: `name` for events, `title` otherwise.
    pub fn label(&self) -> &str {
        match self {
            PostBody::Event(e) => &e.name,
            PostBody::News(a) | PostBody::Blog(a) => &a.title,
        }
    }

    /// Body text: plain description for events, rich content otherwise.
    pub fn text(&self) -> &str {
        match self {
            PostBody::Event(e) => &e.description,
            PostBody::News(a) | PostBody::Blog(a) => &a.content,
        }
    }

    /// User-supplied fields as a document field map (no `kind`, no `createdAt`).
    pub fn to_fields(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let value = match self {
            PostBody::Event(e) => serde_json::to_value(e)?,
            PostBody::News(a) | PostBody::Blog(a) => serde_json::to_value(a)?,
        };
        match value {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    pub fn from_fields(kind: PostKind, fields: Map<String, Value>) -> Result<Self, serde_json::Error> {
        let value = Value::Object(fields);
        Ok(match kind {
            PostKind::Event => PostBody::Event(serde_json::from_value(value)?),
            PostKind::News => PostBody::News(serde_json::from_value(value)?),
            PostKind::Blog => PostBody::Blog(serde_json::from_value(value)?),
        })
    }
}

pub const CREATED_AT_FIELD: &str = "createdAt";

/// A persisted event, news item or blog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub body: PostBody,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("document {id} has no valid createdAt")]
    MissingCreatedAt { id: String },
    #[error("document {id} does not match the {kind} shape: {source}")]
    Shape {
        id: String,
        kind: PostKind,
        #[source]
        source: serde_json::Error,
    },
}

impl Post {
    pub fn kind(&self) -> PostKind {
        self.body.kind()
    }

    pub fn from_document(kind: PostKind, document: Document) -> Result<Self, DecodeError> {
        let Document { id, mut fields } = document;

        let created_at = fields
            .remove(CREATED_AT_FIELD)
            .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v).ok())
            .ok_or_else(|| DecodeError::MissingCreatedAt { id: id.clone() })?;

        let body = PostBody::from_fields(kind, fields).map_err(|source| DecodeError::Shape {
            id: id.clone(),
            kind,
            source,
        })?;

        Ok(Post {
            id,
            created_at,
            body,
        })
    }

    pub fn to_document(&self) -> Result<Document, serde_json::Error> {
        let mut fields = self.body.to_fields()?;
        fields.insert(
            CREATED_AT_FIELD.to_string(),
            serde_json::to_value(self.created_at)?,
        );
        Ok(Document {
            id: self.id.clone(),
            fields,
        })
    }
}
