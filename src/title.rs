use anyhow::Result;
use rand::seq::IndexedRandom;
use tracing::{debug, info, warn};

use crate::ai::{self, TextGenerator};
use crate::error::GenerationError;
use crate::models::TitleMode;

const TITLE_CANDIDATES: usize = 5;
const FALLBACK_TITLE: &str = "Untitled Post";

/// Split a comma-separated keyword string, trimming and dropping empties.
/// Order is preserved.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct TitleInput<'a> {
    pub mode: TitleMode,
    pub manual_title: Option<&'a str>,
    pub category: &'a str,
    pub keywords: &'a str,
    pub use_random_keyword: bool,
}

/// Resolve the article title: a manual title verbatim, otherwise the first
/// of several AI-suggested candidates.
pub async fn resolve_title(generator: &dyn TextGenerator, input: &TitleInput<'_>) -> Result<String> {
    if input.mode == TitleMode::Manual
        && let Some(manual) = input.manual_title
        && !manual.is_empty()
    {
        debug!(title = %manual, "using manual title");
        return Ok(manual.to_string());
    }

    let keyword_list = parse_keywords(input.keywords);
    if keyword_list.is_empty() {
        return Err(GenerationError::EmptyKeywordList.into());
    }

    let topic = if input.use_random_keyword {
        // Non-empty checked above
        keyword_list
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_else(|| input.keywords.to_string())
    } else {
        input.keywords.to_string()
    };

    let combined_topic = format!("{}: {}", input.category, topic);
    let candidates = suggest_titles(generator, &combined_topic, TITLE_CANDIDATES).await?;

    let title = candidates
        .into_iter()
        .next()
        .unwrap_or_else(|| FALLBACK_TITLE.to_string());

    if title.trim().is_empty() {
        return Err(GenerationError::TitleResolutionFailed.into());
    }

    info!(title = %title, topic = %combined_topic, "title generated");
    Ok(title)
}

/// Ask the model for `count` title ideas as `{"titles": [...]}`.
/// An unparseable answer yields no candidates.
pub async fn suggest_titles(generator: &dyn TextGenerator, topic: &str, count: usize) -> Result<Vec<String>> {
    let prompt = format!(
        "You are an expert blog editor. Suggest exactly {count} engaging, SEO-friendly blog post titles \
         about the following topic.\n\nTopic: {topic}\n\n\
         Respond only with a JSON object of the form {{\"titles\": [\"title 1\", \"title 2\"]}}."
    );

    let raw = generator.generate(&prompt).await?;
    match ai::extract_string_list(&raw, "titles") {
        Some(titles) => Ok(titles),
        None => {
            warn!(response = %ai::truncate_for_log(&raw, 200), "title suggestions were not valid JSON");
            Ok(Vec::new())
        }
    }
}
