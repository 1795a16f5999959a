use anyhow::Result;
use tracing::info;

use crate::ai::TextGenerator;

/// Optional size hints forwarded to the model.
#[derive(Debug, Clone, Copy, Default)]
pub struct DraftLength {
    pub paragraphs: Option<u32>,
    pub words_per_paragraph: Option<u32>,
}

/// Generate the article body as plain text, paragraphs separated by blank lines.
/// Failures from the model call propagate unchanged.
pub async fn generate_draft(generator: &dyn TextGenerator, title: &str, length: DraftLength) -> Result<String> {
    let prompt = draft_prompt(title, length);
    let content = generator.generate(&prompt).await?;
    info!(title = %title, chars = content.len(), "draft generated");
    Ok(content)
}

fn draft_prompt(title: &str, length: DraftLength) -> String {
    let mut prompt = format!(
        "Write a complete, well-structured blog post with the title \"{title}\".\n\n\
         Write in plain text only: no markdown, no HTML, no headings, no title line. \
         Separate paragraphs with a single blank line."
    );

    match (length.paragraphs, length.words_per_paragraph) {
        (Some(p), Some(w)) => prompt.push_str(&format!(" Write {p} paragraphs of about {w} words each.")),
        (Some(p), None) => prompt.push_str(&format!(" Write {p} paragraphs.")),
        (None, Some(w)) => prompt.push_str(&format!(" Keep paragraphs to about {w} words each.")),
        (None, None) => {}
    }

    prompt
}
