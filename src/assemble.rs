use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::models::{ImageAlignment, ImageMode};

/// Default stride for "every" without a number.
const DEFAULT_EVERY: usize = 2;
/// How much of a paragraph is handed to the image source as context.
const IMAGE_CONTEXT_CHARS: usize = 200;

const IMAGE_WRAPPER_CLASS: &str = "article-image my-6";
const IMG_CLASS_LEFT: &str = "float-left w-1/2 mr-6 mb-4 rounded-lg";
const IMG_CLASS_RIGHT: &str = "float-right w-1/2 ml-6 mb-4 rounded-lg";
const IMG_CLASS_CENTER: &str = "block w-full h-auto rounded-lg";

/// Supplies one image URL per selected paragraph. `None` means no image
/// could be found for this paragraph and nothing is inserted.
#[async_trait]
pub trait InContentImages: Send {
    async fn image_for(&mut self, paragraph_context: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementRule {
    None,
    /// Every Nth paragraph, 1-indexed. Zero disables insertion.
    Every(usize),
    /// Explicit 1-based paragraph numbers, unvalidated.
    Positions(Vec<i64>),
}

impl PlacementRule {
    pub fn parse(rule: &str) -> Self {
        let rule = rule.trim().to_ascii_lowercase();
        if rule.is_empty() || rule == "none" {
            return PlacementRule::None;
        }
        if rule == "every" {
            return PlacementRule::Every(DEFAULT_EVERY);
        }
        if let Some(n) = rule.strip_prefix("every-") {
            let n = n.trim();
            if n.is_empty() {
                return PlacementRule::Every(DEFAULT_EVERY);
            }
            return PlacementRule::Every(n.parse::<usize>().unwrap_or(0));
        }
        PlacementRule::Positions(rule.split(',').filter_map(|p| p.trim().parse::<i64>().ok()).collect())
    }

    /// Zero-based indices of paragraphs that are followed by an image.
    pub fn target_indices(&self, paragraph_count: usize) -> BTreeSet<usize> {
        match self {
            PlacementRule::None | PlacementRule::Every(0) => BTreeSet::new(),
            PlacementRule::Every(n) => (0..paragraph_count).filter(|i| (i + 1) % n == 0).collect(),
            PlacementRule::Positions(positions) => positions
                .iter()
                .filter(|&&p| p >= 1 && p <= paragraph_count as i64)
                .map(|&p| (p - 1) as usize)
                .collect(),
        }
    }
}

pub struct AssembleOptions<'a> {
    pub rule: &'a str,
    pub mode: ImageMode,
    pub alignment: ImageAlignment,
    /// Alt text for inserted images.
    pub alt: &'a str,
}

/// Split plain text on blank lines, dropping empty paragraphs.
pub fn split_paragraphs(draft: &str) -> Vec<String> {
    draft
        .replace("\r\n", "\n")
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn paragraph_html(paragraph: &str) -> String {
    format!("<p>{paragraph}</p>")
}

/// Wrap every paragraph in `<p>` with no images.
pub fn paragraphs_only(draft: &str) -> String {
    split_paragraphs(draft).iter().map(|p| paragraph_html(p)).collect()
}

/// Pick the `<img>` class for the `inserted`-th image (0-based count of
/// images actually placed so far).
fn image_class(alignment: ImageAlignment, inserted: usize) -> &'static str {
    match alignment {
        ImageAlignment::AllLeft => IMG_CLASS_LEFT,
        ImageAlignment::AllRight => IMG_CLASS_RIGHT,
        ImageAlignment::AlternateLeft if inserted % 2 == 0 => IMG_CLASS_LEFT,
        ImageAlignment::AlternateLeft => IMG_CLASS_RIGHT,
        ImageAlignment::AlternateRight if inserted % 2 == 0 => IMG_CLASS_RIGHT,
        ImageAlignment::AlternateRight => IMG_CLASS_LEFT,
        ImageAlignment::Center => IMG_CLASS_CENTER,
    }
}

fn image_block(url: &str, alt: &str, class: &str) -> String {
    format!(
        "<div class=\"{IMAGE_WRAPPER_CLASS}\"><img src=\"{}\" alt=\"{}\" class=\"{class}\" /></div>",
        escape_attr(url),
        escape_attr(alt)
    )
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Build the article HTML from plain draft text, inserting in-content images
/// after the paragraphs selected by the placement rule.
pub async fn assemble_content(
    draft: &str,
    options: &AssembleOptions<'_>,
    images: &mut dyn InContentImages,
) -> Result<String> {
    let rule = PlacementRule::parse(options.rule);
    if rule == PlacementRule::None || options.mode == ImageMode::None {
        return Ok(paragraphs_only(draft));
    }

    let paragraphs = split_paragraphs(draft);
    let targets = rule.target_indices(paragraphs.len());
    debug!(paragraphs = paragraphs.len(), targets = ?targets, "image placement resolved");

    let mut html = String::new();
    let mut inserted = 0usize;

    for (index, paragraph) in paragraphs.iter().enumerate() {
        html.push_str(&paragraph_html(paragraph));

        if !targets.contains(&index) {
            continue;
        }

        let context: String = paragraph.chars().take(IMAGE_CONTEXT_CHARS).collect();
        match images.image_for(&context).await? {
            Some(url) => {
                html.push_str(&image_block(&url, options.alt, image_class(options.alignment, inserted)));
                inserted += 1;
            }
            None => debug!(paragraph = index, "no image available, skipping"),
        }
    }

    info!(paragraphs = paragraphs.len(), images = inserted, "content assembled");
    Ok(html)
}
