//! The admin view's single in-progress post.
//!
//! A [`DraftManager`] owns exactly one [`Draft`]. Every reset or load starts a
//! new draft generation; image batches remember the generation they were
//! started for, and results that arrive after the draft moved on are thrown
//! away (and their backing objects released) instead of being attached to the
//! wrong post.

mod validation;

pub use validation::{Problem, ValidationError, ValidationErrors};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

use crate::intake::{ImageIntake, IntakeReport, SelectedFile};
use crate::notification::Notification;
use crate::posting::models::{ArticlePost, EventPost, Image, Post, PostBody, PostKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DraftField {
    Name,
    Description,
    Title,
    Category,
    Content,
    Date,
}

impl DraftField {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftField::Name => "name",
            DraftField::Description => "description",
            DraftField::Title => "title",
            DraftField::Category => "category",
            DraftField::Content => "content",
            DraftField::Date => "date",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DraftField::Name => "Name",
            DraftField::Description => "Description",
            DraftField::Title => "Title",
            DraftField::Category => "Category",
            DraftField::Content => "Content",
            DraftField::Date => "Date",
        }
    }

    /// Fields that must be non-empty before a post of `kind` can be saved.
    pub fn required_for(kind: PostKind) -> &'static [DraftField] {
        match kind {
            PostKind::Event => &[DraftField::Name, DraftField::Description, DraftField::Date],
            PostKind::News | PostKind::Blog => &[
                DraftField::Title,
                DraftField::Category,
                DraftField::Content,
                DraftField::Date,
            ],
        }
    }
}

impl FromStr for DraftField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(DraftField::Name),
            "description" => Ok(DraftField::Description),
            "title" => Ok(DraftField::Title),
            "category" => Ok(DraftField::Category),
            "content" => Ok(DraftField::Content),
            "date" => Ok(DraftField::Date),
            other => Err(format!("unknown draft field '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DraftFields {
    pub name: String,
    pub description: String,
    pub title: String,
    pub category: String,
    pub content: String,
    pub date: String,
}

impl DraftFields {
    pub fn get(&self, field: DraftField) -> &str {
        match field {
            DraftField::Name => &self.name,
            DraftField::Description => &self.description,
            DraftField::Title => &self.title,
            DraftField::Category => &self.category,
            DraftField::Content => &self.content,
            DraftField::Date => &self.date,
        }
    }

    fn slot(&mut self, field: DraftField) -> &mut String {
        match field {
            DraftField::Name => &mut self.name,
            DraftField::Description => &mut self.description,
            DraftField::Title => &mut self.title,
            DraftField::Category => &mut self.category,
            DraftField::Content => &mut self.content,
            DraftField::Date => &mut self.date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Draft {
    pub kind: PostKind,
    /// Id of the post being edited; `None` for a new post.
    pub editing: Option<String>,
    pub fields: DraftFields,
    pub images: Vec<Image>,
    /// Images that already belong to the post being edited.
    #[serde(skip)]
    persisted_images: Vec<Image>,
    /// Persisted images removed from the draft. Their objects go only once
    /// the update is saved.
    #[serde(skip)]
    pending_release: Vec<Image>,
}

impl Draft {
    pub fn empty(kind: PostKind) -> Self {
        Self {
            kind,
            editing: None,
            fields: DraftFields::default(),
            images: Vec::new(),
            persisted_images: Vec::new(),
            pending_release: Vec::new(),
        }
    }

    /// Loads a persisted post for editing. The date goes back to `YYYY-MM-DD`.
    pub fn from_post(post: &Post) -> Self {
        let mut fields = DraftFields {
            date: date_input_value(post.body.date()),
            ..DraftFields::default()
        };
        match &post.body {
            PostBody::Event(e) => {
                fields.name = e.name.clone();
                fields.description = e.description.clone();
            }
            PostBody::News(a) | PostBody::Blog(a) => {
                fields.title = a.title.clone();
                fields.category = a.category.clone();
                fields.content = a.content.clone();
            }
        }
        Self {
            kind: post.kind(),
            editing: Some(post.id.clone()),
            fields,
            images: post.body.images().to_vec(),
            persisted_images: post.body.images().to_vec(),
            pending_release: Vec::new(),
        }
    }

    pub fn validate(&self, require_article_images: bool) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        for field in DraftField::required_for(self.kind) {
            if self.fields.get(*field).trim().is_empty() {
                errors.add(ValidationError::empty_field(*field));
            }
        }

        let date = self.fields.date.trim();
        if !date.is_empty() && parse_date(date).is_none() {
            errors.add(ValidationError::invalid_date(date));
        }

        if self.kind != PostKind::Event && require_article_images && self.images.is_empty() {
            errors.add(ValidationError::no_images());
        }
        errors
    }

    /// Builds the tagged post body. Callers validate first.
    fn to_body(&self) -> PostBody {
        let date = parse_date(self.fields.date.trim())
            .map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default();
        let f = &self.fields;
        match self.kind {
            PostKind::Event => PostBody::Event(EventPost {
                name: f.name.clone(),
                description: f.description.clone(),
                date,
                images: self.images.clone(),
            }),
            kind => {
                let article = ArticlePost {
                    title: f.title.clone(),
                    category: f.category.clone(),
                    content: f.content.clone(),
                    date,
                    images: self.images.clone(),
                };
                if kind == PostKind::News {
                    PostBody::News(article)
                } else {
                    PostBody::Blog(article)
                }
            }
        }
    }

    /// Staged images that nothing persisted refers to.
    fn unpersisted_images(&self) -> Vec<Image> {
        self.images
            .iter()
            .filter(|img| !self.persisted_images.contains(img))
            .cloned()
            .collect()
    }
}

/// Accepts a calendar date (`YYYY-MM-DD`) or a full RFC 3339 timestamp.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Stored timestamp rendered back into a date input value.
pub fn date_input_value(stored: &str) -> String {
    parse_date(stored)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("no image at position {index} (draft has {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// A validated draft, frozen for submission.
#[derive(Debug, Clone)]
pub struct PreparedDraft {
    pub generation: u64,
    pub kind: PostKind,
    pub editing: Option<String>,
    pub body: PostBody,
    /// Objects to release after the body is saved.
    pub released: Vec<Image>,
}

#[derive(Debug)]
pub struct AddImagesOutcome {
    pub report: IntakeReport,
    /// The draft was reset while the batch was running; nothing was attached.
    pub superseded: bool,
}

impl AddImagesOutcome {
    pub fn notification(&self) -> Notification {
        if self.superseded {
            Notification::info("The draft changed while images were processing; they were discarded")
        } else {
            self.report.notification()
        }
    }
}

struct DraftState {
    draft: Draft,
    generation: u64,
}

pub struct DraftManager {
    state: Mutex<DraftState>,
    intake: ImageIntake,
    require_article_images: bool,
}

impl DraftManager {
    pub fn new(kind: PostKind, intake: ImageIntake, require_article_images: bool) -> Self {
        Self {
            state: Mutex::new(DraftState {
                draft: Draft::empty(kind),
                generation: 0,
            }),
            intake,
            require_article_images,
        }
    }

    pub fn draft(&self) -> Draft {
        self.state.lock().draft.clone()
    }

    pub fn kind(&self) -> PostKind {
        self.state.lock().draft.kind
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn set_field(&self, field: DraftField, value: impl Into<String>) {
        let mut state = self.state.lock();
        *state.draft.fields.slot(field) = value.into();
    }

    /// Processes `files` and appends the successful images in input order.
    pub async fn add_images(&self, files: Vec<SelectedFile>) -> AddImagesOutcome {
        let generation = self.generation();
        let report = self.intake.process(files).await;

        let mut state = self.state.lock();
        if state.generation != generation {
            drop(state);
            log::info!(
                "Discarding {} image(s) processed for superseded draft generation {}",
                report.succeeded.len(),
                generation
            );
            self.intake.discard_later(report.images());
            return AddImagesOutcome {
                report,
                superseded: true,
            };
        }

        state.draft.images.extend(report.images());
        AddImagesOutcome {
            report,
            superseded: false,
        }
    }

    /// Drops the image at `index`. A staged upload is released right away; an
    /// image the edited post already owns waits for the update to be saved.
    pub fn remove_image(&self, index: usize) -> Result<Image, DraftError> {
        let (removed, owned) = {
            let mut state = self.state.lock();
            let len = state.draft.images.len();
            if index >= len {
                return Err(DraftError::IndexOutOfRange { index, len });
            }
            let removed = state.draft.images.remove(index);
            let owned = state.draft.persisted_images.contains(&removed);
            if owned {
                state.draft.pending_release.push(removed.clone());
            }
            (removed, owned)
        };
        if !owned {
            self.intake.discard_later(vec![removed.clone()]);
        }
        Ok(removed)
    }

    /// Releases images dropped from a post whose update went through.
    pub fn release_saved(&self, images: Vec<Image>) {
        if !images.is_empty() {
            log::debug!("Releasing {} image(s) removed from a saved post", images.len());
        }
        self.intake.discard_later(images);
    }

    /// Replaces the draft with an empty one for `kind`, dropping whatever was
    /// staged. Never asks, never autosaves.
    pub fn reset(&self, kind: PostKind) {
        self.replace(Draft::empty(kind));
    }

    /// Starts editing `post`.
    pub fn load(&self, post: &Post) {
        self.replace(Draft::from_post(post));
    }

    /// Staged uploads of the outgoing draft are released. Persisted images it
    /// had removed stay with their post.
    fn replace(&self, next: Draft) {
        let abandoned = {
            let mut state = self.state.lock();
            let previous = std::mem::replace(&mut state.draft, next);
            state.generation += 1;
            previous.unpersisted_images()
        };
        self.intake.discard_later(abandoned);
    }

    pub fn validate(&self) -> ValidationErrors {
        self.state.lock().draft.validate(self.require_article_images)
    }

    /// Validates and freezes the current draft for submission. The draft itself
    /// is left as is either way.
    pub fn prepare(&self) -> Result<PreparedDraft, ValidationErrors> {
        let state = self.state.lock();
        let errors = state.draft.validate(self.require_article_images);
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(PreparedDraft {
            generation: state.generation,
            kind: state.draft.kind,
            editing: state.draft.editing.clone(),
            body: state.draft.to_body(),
            released: state.draft.pending_release.clone(),
        })
    }

    /// Clears the draft after its submission went through. Its images now
    /// belong to the saved post, so nothing is released. Returns `false` when
    /// the draft had already been replaced.
    pub fn complete(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        let kind = state.draft.kind;
        state.draft = Draft::empty(kind);
        state.generation += 1;
        true
    }
}
