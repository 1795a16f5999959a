use anyhow::Result;
use tracing::{info, warn};

use crate::ai::{self, TextGenerator};

/// How much of the body the tag prompt sees.
const CONTENT_EXCERPT_CHARS: usize = 2000;
const DEFAULT_TAG_COUNT: usize = 5;

/// Parse a tag count as entered by the user. Only positive integers count.
pub fn parse_tag_count(raw: Option<&str>) -> Option<usize> {
    raw?.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

/// Ask the model for tags. Any failure to find or parse the JSON object
/// degrades to an empty list; errors from the model call itself propagate.
pub async fn generate_tags(
    generator: &dyn TextGenerator,
    title: &str,
    content: &str,
    count: Option<usize>,
) -> Result<Vec<String>> {
    let count = count.unwrap_or(DEFAULT_TAG_COUNT);
    let excerpt: String = content.chars().take(CONTENT_EXCERPT_CHARS).collect();
    let prompt = format!(
        "Generate exactly {count} relevant topical tags for the following blog post. \
         Tags are short (one to three words), lowercase, without a leading '#'.\n\n\
         Title: {title}\n\nContent:\n{excerpt}\n\n\
         Respond only with a JSON object of the form {{\"tags\": [\"tag1\", \"tag2\"]}}."
    );

    let raw = generator.generate(&prompt).await?;
    let tags = match ai::extract_string_list(&raw, "tags") {
        Some(tags) => tags
            .into_iter()
            .map(|t| t.trim_start_matches('#').to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        None => {
            warn!(response = %ai::truncate_for_log(&raw, 200), "tag response had no usable JSON, continuing without tags");
            Vec::new()
        }
    };

    info!(count = tags.len(), "tags generated");
    Ok(tags)
}

/// Curated tags, truncated to `count` when one is given.
pub fn manual_tags(tags: &[String], count: Option<usize>) -> Vec<String> {
    let cleaned = tags
        .iter()
        .map(|t| t.trim().trim_start_matches('#').to_string())
        .filter(|t| !t.is_empty());
    match count {
        Some(n) => cleaned.take(n).collect(),
        None => cleaned.collect(),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct Reply(&'static str);

    #[async_trait]
    impl TextGenerator for Reply {
        async fn generate(&self, prompt: &str) -> Result<String> {
            assert!(prompt.contains("Title: Borrowing"));
            Ok(self.0.to_string())
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tag_count_requires_positive_integer() {
        assert_eq!(parse_tag_count(Some("3")), Some(3));
        assert_eq!(parse_tag_count(Some(" 2 ")), Some(2));
        assert_eq!(parse_tag_count(Some("0")), None);
        assert_eq!(parse_tag_count(Some("-1")), None);
        assert_eq!(parse_tag_count(Some("many")), None);
        assert_eq!(parse_tag_count(None), None);
    }

    #[test]
    fn manual_tags_truncate_to_count() {
        let tags = strings(&["a", "b", "c", "d"]);
        assert_eq!(manual_tags(&tags, parse_tag_count(Some("2"))), strings(&["a", "b"]));
        assert_eq!(manual_tags(&tags, parse_tag_count(Some("zero"))), tags);
        assert_eq!(manual_tags(&tags, Some(10)), tags);
    }

    #[tokio::test]
    async fn parses_tags_and_strips_hashes() {
        let generator = Reply("Here are your tags: {\"tags\": [\"#rust\", \"ownership\", \"\"]}");
        let tags = generate_tags(&generator, "Borrowing", "body", Some(2)).await.unwrap();
        assert_eq!(tags, strings(&["rust", "ownership"]));
    }

    #[tokio::test]
    async fn response_without_object_yields_no_tags() {
        let generator = Reply("rust, ownership, lifetimes");
        let tags = generate_tags(&generator, "Borrowing", "body", None).await.unwrap();
        assert!(tags.is_empty());
    }

    #[tokio::test]
    async fn malformed_object_yields_no_tags() {
        let generator = Reply("{\"tags\": [\"rust\",]}");
        let tags = generate_tags(&generator, "Borrowing", "body", None).await.unwrap();
        assert!(tags.is_empty());
    }
}
