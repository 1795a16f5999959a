use anyhow::Result;
use tracing::{debug, info};

use crate::ai::{ImageModel, TextGenerator};
use crate::error::GenerationError;
use crate::imghost::ImageUploader;

/// The role an image plays on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSlot {
    Featured,
    Background,
    InContent,
}

impl ImageSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSlot::Featured => "featured",
            ImageSlot::Background => "background",
            ImageSlot::InContent => "in-content",
        }
    }

    fn framing(self) -> &'static str {
        match self {
            ImageSlot::Featured => "a striking wide hero image that represents the whole article",
            ImageSlot::Background => "a subtle, low-contrast background texture that will sit behind text",
            ImageSlot::InContent => "an illustrative photo for one section of the article",
        }
    }
}

/// What an image should depict.
#[derive(Debug, Clone, Copy)]
pub struct ImageSubject<'a> {
    pub title: &'a str,
    pub category: &'a str,
    pub keywords: &'a str,
    pub slot: ImageSlot,
    pub watermark: Option<&'a str>,
}

/// Prompt → image → hosted URL.
pub struct ImageGenerator<'a> {
    pub text: &'a dyn TextGenerator,
    pub model: &'a dyn ImageModel,
    pub uploader: &'a dyn ImageUploader,
}

impl ImageGenerator<'_> {
    pub async fn generate(&self, subject: &ImageSubject<'_>) -> Result<String> {
        let slot = subject.slot.as_str();

        let scene = self.text.generate(&scene_prompt(subject)).await?;
        let scene = scene.trim();
        if scene.is_empty() {
            return Err(GenerationError::PromptGenerationFailed(slot.to_string()).into());
        }
        debug!(slot, scene = %scene, "image prompt generated");

        let data_uri = self
            .model
            .generate_image(&image_prompt(scene, subject.watermark))
            .await?
            .filter(|d| !d.is_empty())
            .ok_or(GenerationError::ImageGenerationFailed)?;

        let url = self.uploader.upload(&data_uri).await?;
        if url.is_empty() {
            return Err(GenerationError::ImageHostingFailed.into());
        }

        info!(slot, url = %url, "image generated and hosted");
        Ok(url)
    }
}

fn scene_prompt(subject: &ImageSubject<'_>) -> String {
    format!(
        "Write a short (under 60 words), vivid description of a photorealistic scene for {}.\n\
         Article title: {}\nCategory: {}\nKeywords: {}\n\n\
         Describe only the visual scene. No text, letters or logos in the image. \
         Respond with the description only.",
        subject.slot.framing(),
        subject.title,
        subject.category,
        subject.keywords,
    )
}

fn image_prompt(scene: &str, watermark: Option<&str>) -> String {
    let mut prompt = format!("Photorealistic, high detail, natural lighting. {scene}");
    if let Some(mark) = watermark.map(str::trim).filter(|m| !m.is_empty()) {
        prompt.push_str(&format!(" Add a small, unobtrusive watermark reading \"{mark}\" in the bottom-right corner."));
    }
    prompt
}
