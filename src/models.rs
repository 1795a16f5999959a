use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleMode {
    #[default]
    Auto,
    Manual,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishAction {
    #[default]
    Draft,
    Publish,
}

/// How an image slot (featured, background, in-content) is filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageMode {
    Ai,
    Random,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMode {
    #[default]
    Auto,
    Manual,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentAlignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl ContentAlignment {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentAlignment::Left => "left",
            ContentAlignment::Center => "center",
            ContentAlignment::Right => "right",
            ContentAlignment::Justify => "justify",
        }
    }
}

/// Float strategy for in-content images. Unknown values fall back to `Center`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageAlignment {
    AllLeft,
    AllRight,
    AlternateLeft,
    AlternateRight,
    #[default]
    #[serde(other)]
    Center,
}

impl ImageAlignment {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageAlignment::AllLeft => "all-left",
            ImageAlignment::AllRight => "all-right",
            ImageAlignment::AlternateLeft => "alternate-left",
            ImageAlignment::AlternateRight => "alternate-right",
            ImageAlignment::Center => "center",
        }
    }
}

/// Parameters for one run of the auto-post pipeline. Never persisted.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationRequest {
    pub category: String,
    /// Comma-separated keywords.
    pub keywords: String,
    pub use_random_keyword: bool,
    pub title_mode: TitleMode,
    pub manual_title: Option<String>,
    pub number_of_paragraphs: Option<u32>,
    pub words_per_paragraph: Option<u32>,
    pub publish_action: PublishAction,

    pub featured_image_mode: ImageMode,
    pub featured_image_urls: Vec<String>,
    pub background_image_mode: ImageMode,
    pub background_image_urls: Vec<String>,
    pub in_content_images_mode: ImageMode,
    pub in_content_image_urls: Vec<String>,
    /// "none", "every", "every-N" or a 1-based index list like "1,3,5".
    pub in_content_image_rule: Option<String>,
    pub in_content_image_alignment: ImageAlignment,
    pub watermark_text: Option<String>,

    pub content_alignment: ContentAlignment,
    pub paragraph_spacing: Option<String>,

    pub add_tags: bool,
    pub tag_mode: TagMode,
    /// Raw tag count as entered; only a positive integer takes effect.
    pub number_of_tags: Option<String>,
    pub manual_tags: Vec<String>,

    pub comments_enabled: bool,
}

impl GenerationRequest {
    pub fn placement_rule(&self) -> &str {
        self.in_content_image_rule.as_deref().unwrap_or("none")
    }

    pub fn paragraph_spacing(&self) -> &str {
        self.paragraph_spacing.as_deref().unwrap_or("normal")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Draft,
    Published,
}

impl ArticleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ArticleStatus::Draft => "draft",
            ArticleStatus::Published => "published",
        }
    }
}

impl From<PublishAction> for ArticleStatus {
    fn from(action: PublishAction) -> Self {
        match action {
            PublishAction::Draft => ArticleStatus::Draft,
            PublishAction::Publish => ArticleStatus::Published,
        }
    }
}

/// An article produced by the pipeline, ready to be stored.
/// Stored rows come back as `ArticleRow`.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub slug: String,
    pub content_html: String,
    pub status: ArticleStatus,
    pub author_id: String,
    pub category: String,
    pub keywords: Vec<String>,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub background_image_url: Option<String>,
    pub content_alignment: ContentAlignment,
    pub paragraph_spacing: String,
    pub in_content_image_alignment: ImageAlignment,
    pub comments_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Read model for stored articles (admin API and Atom feed).
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRow {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub content_html: String,
    pub status: String,
    pub author_id: String,
    pub category: String,
    /// JSON array.
    pub keywords: String,
    /// JSON array.
    pub tags: String,
    pub image_url: Option<String>,
    pub background_image_url: Option<String>,
    pub content_alignment: String,
    pub paragraph_spacing: String,
    pub in_content_image_alignment: String,
    pub comments_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl ArticleRow {
    pub fn tag_list(&self) -> Vec<String> {
        serde_json::from_str(&self.tags).unwrap_or_default()
    }
}
