use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::seq::IndexedRandom;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::ai::{ImageModel, OpenRouterClient, TextGenerator};
use crate::assemble::{self, AssembleOptions, InContentImages};
use crate::config::Config;
use crate::draft::{self, DraftLength};
use crate::error::GenerationError;
use crate::imagegen::{ImageGenerator, ImageSlot, ImageSubject};
use crate::imghost::{ImageUploader, ImgbbUploader};
use crate::models::{ArticleStatus, GenerationRequest, ImageMode, NewArticle, PublishAction, TagMode};
use crate::store::{ArticleStore, SqliteArticleStore};
use crate::tags;
use crate::title::{self, TitleInput};

/// External services one pipeline run talks to.
pub struct Collaborators<'a> {
    pub text: &'a dyn TextGenerator,
    pub image_model: &'a dyn ImageModel,
    pub uploader: &'a dyn ImageUploader,
    pub store: &'a dyn ArticleStore,
}

impl Collaborators<'_> {
    fn image_generator(&self) -> ImageGenerator<'_> {
        ImageGenerator {
            text: self.text,
            model: self.image_model,
            uploader: self.uploader,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Unconditional pause after each successful AI image.
    pub image_delay: Duration,
}

/// Run the whole auto-post pipeline and return the stored article's id.
///
/// Steps run strictly in sequence: title, draft, tags, featured image,
/// background image, content assembly, persistence. Any failure aborts the
/// run with nothing persisted; images already hosted stay at the host.
pub async fn generate_auto_blog_post(
    deps: &Collaborators<'_>,
    settings: &PipelineSettings,
    user_id: Option<&str>,
    request: &GenerationRequest,
) -> Result<String> {
    let user_id = user_id
        .filter(|u| !u.is_empty())
        .ok_or(GenerationError::Unauthenticated)?;

    let keywords = title::parse_keywords(&request.keywords);
    if keywords.is_empty() {
        return Err(GenerationError::EmptyKeywordList.into());
    }

    info!(user = %user_id, category = %request.category, keywords = ?keywords, "auto-post pipeline started");

    let title = title::resolve_title(
        deps.text,
        &TitleInput {
            mode: request.title_mode,
            manual_title: request.manual_title.as_deref(),
            category: &request.category,
            keywords: &request.keywords,
            use_random_keyword: request.use_random_keyword,
        },
    )
    .await?;
    info!(title = %title, "title resolved");

    let content = draft::generate_draft(
        deps.text,
        &title,
        DraftLength {
            paragraphs: request.number_of_paragraphs,
            words_per_paragraph: request.words_per_paragraph,
        },
    )
    .await?;
    info!(chars = content.len(), "draft ready");

    // Tags come from the plain draft, before any HTML or images are added
    let tags = resolve_tags(deps.text, request, &title, &content).await?;
    info!(tags = ?tags, "tags resolved");

    let image_generator = deps.image_generator();

    let image_url = resolve_slot_image(
        &image_generator,
        settings,
        request.featured_image_mode,
        &request.featured_image_urls,
        ImageSubject {
            title: &title,
            category: &request.category,
            keywords: &request.keywords,
            slot: ImageSlot::Featured,
            watermark: request.watermark_text.as_deref(),
        },
    )
    .await?;
    info!(url = ?image_url, "featured image resolved");

    let background_context = format!("abstract, pattern, subtle, {}", request.keywords);
    let background_image_url = resolve_slot_image(
        &image_generator,
        settings,
        request.background_image_mode,
        &request.background_image_urls,
        ImageSubject {
            title: &title,
            category: &request.category,
            keywords: &background_context,
            slot: ImageSlot::Background,
            watermark: request.watermark_text.as_deref(),
        },
    )
    .await?;
    info!(url = ?background_image_url, "background image resolved");

    let mut in_content_images = PipelineImages {
        mode: request.in_content_images_mode,
        candidates: &request.in_content_image_urls,
        generator: &image_generator,
        settings,
        title: &title,
        category: &request.category,
        watermark: request.watermark_text.as_deref(),
    };
    let content_html = assemble::assemble_content(
        &content,
        &AssembleOptions {
            rule: request.placement_rule(),
            mode: request.in_content_images_mode,
            alignment: request.in_content_image_alignment,
            alt: &title,
        },
        &mut in_content_images,
    )
    .await?;
    info!(html_len = content_html.len(), "content assembled");

    let now = Utc::now();
    let article = NewArticle {
        slug: slugify(&title),
        title,
        content_html,
        status: ArticleStatus::from(request.publish_action),
        author_id: user_id.to_string(),
        category: request.category.clone(),
        keywords,
        tags,
        image_url,
        background_image_url,
        content_alignment: request.content_alignment,
        paragraph_spacing: request.paragraph_spacing().to_string(),
        in_content_image_alignment: request.in_content_image_alignment,
        comments_enabled: request.comments_enabled,
        created_at: now,
        published_at: (request.publish_action == PublishAction::Publish).then_some(now),
    };

    let id = deps.store.save_article(&article).await?;
    info!(id = %id, title = %article.title, status = article.status.as_str(), "article persisted");

    Ok(id)
}

async fn resolve_tags(
    generator: &dyn TextGenerator,
    request: &GenerationRequest,
    title: &str,
    content: &str,
) -> Result<Vec<String>> {
    if !request.add_tags {
        return Ok(Vec::new());
    }
    let count = tags::parse_tag_count(request.number_of_tags.as_deref());
    match request.tag_mode {
        TagMode::Auto => tags::generate_tags(generator, title, content, count).await,
        TagMode::Manual => Ok(tags::manual_tags(&request.manual_tags, count)),
    }
}

async fn resolve_slot_image(
    generator: &ImageGenerator<'_>,
    settings: &PipelineSettings,
    mode: ImageMode,
    candidates: &[String],
    subject: ImageSubject<'_>,
) -> Result<Option<String>> {
    match mode {
        ImageMode::Ai => {
            let url = generator.generate(&subject).await?;
            throttle(settings).await;
            Ok(Some(url))
        }
        ImageMode::Random => Ok(pick_random(candidates)),
        ImageMode::None => {
            debug!(slot = subject.slot.as_str(), "image slot disabled");
            Ok(None)
        }
    }
}

fn pick_random(candidates: &[String]) -> Option<String> {
    candidates.choose(&mut rand::rng()).cloned()
}

async fn throttle(settings: &PipelineSettings) {
    if settings.image_delay.is_zero() {
        return;
    }
    debug!(delay_ms = settings.image_delay.as_millis() as u64, "pausing after image generation");
    tokio::time::sleep(settings.image_delay).await;
}

/// In-content image source for one run.
struct PipelineImages<'a> {
    mode: ImageMode,
    candidates: &'a [String],
    generator: &'a ImageGenerator<'a>,
    settings: &'a PipelineSettings,
    title: &'a str,
    category: &'a str,
    watermark: Option<&'a str>,
}

#[async_trait]
impl InContentImages for PipelineImages<'_> {
    async fn image_for(&mut self, paragraph_context: &str) -> Result<Option<String>> {
        match self.mode {
            ImageMode::Ai => {
                let subject = ImageSubject {
                    title: self.title,
                    category: self.category,
                    keywords: paragraph_context,
                    slot: ImageSlot::InContent,
                    watermark: self.watermark,
                };
                let url = self.generator.generate(&subject).await?;
                throttle(self.settings).await;
                Ok(Some(url))
            }
            ImageMode::Random => Ok(pick_random(self.candidates)),
            ImageMode::None => Ok(None),
        }
    }
}

/// Long-lived collaborators shared by the admin API, the scheduler and the CLI.
pub struct Services {
    pub text: Arc<dyn TextGenerator>,
    pub image_model: Arc<dyn ImageModel>,
    pub uploader: Arc<dyn ImageUploader>,
    pub store: Arc<dyn ArticleStore>,
    pub settings: PipelineSettings,
}

impl Services {
    /// Wire the production clients from config.
    pub fn from_config(config: &Config, pool: SqlitePool) -> Result<Self> {
        let ai = Arc::new(OpenRouterClient::new(&config.ai)?);
        Ok(Self {
            text: ai.clone(),
            image_model: ai,
            uploader: Arc::new(ImgbbUploader::new(&config.image_host)?),
            store: Arc::new(SqliteArticleStore::new(pool)),
            settings: PipelineSettings {
                image_delay: config.image_delay()?,
            },
        })
    }

    pub async fn run(&self, user_id: Option<&str>, request: &GenerationRequest) -> Result<String> {
        let deps = Collaborators {
            text: self.text.as_ref(),
            image_model: self.image_model.as_ref(),
            uploader: self.uploader.as_ref(),
            store: self.store.as_ref(),
        };
        generate_auto_blog_post(&deps, &self.settings, user_id, request).await
    }
}

/// URL slug: lowercase alphanumerics joined by single hyphens.
pub fn slugify(title: &str) -> String {
    let slug = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() { "post".to_string() } else { slug }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::imagegen::tests::{CountingUploader, RecordingModel};
    use crate::models::{ContentAlignment, ImageAlignment, TitleMode};

    /// Answers each prompt kind the way a cooperative model would.
    #[derive(Default)]
    struct FakeModel {
        prompts: Mutex<Vec<String>>,
        tag_reply: Option<&'static str>,
    }

    impl FakeModel {
        fn prompts_containing(&self, needle: &str) -> Vec<String> {
            self.prompts
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.contains(needle))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl TextGenerator for FakeModel {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let reply = if prompt.contains("blog post titles") {
                "{\"titles\": [\"Generated Title!\", \"Other\"]}"
            } else if prompt.contains("complete, well-structured blog post") {
                "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.\n\nFourth paragraph."
            } else if prompt.contains("topical tags") {
                self.tag_reply.unwrap_or("{\"tags\": [\"one\", \"two\"]}")
            } else if prompt.contains("photorealistic scene") {
                "A quiet scene."
            } else {
                ""
            };
            Ok(reply.to_string())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<Vec<NewArticle>>,
        fail: bool,
    }

    #[async_trait]
    impl ArticleStore for MemoryStore {
        async fn save_article(&self, article: &NewArticle) -> Result<String> {
            if self.fail {
                anyhow::bail!("document store unavailable");
            }
            let mut saved = self.saved.lock().unwrap();
            saved.push(article.clone());
            Ok(format!("article-{}", saved.len()))
        }
    }

    const NO_DELAY: PipelineSettings = PipelineSettings {
        image_delay: Duration::ZERO,
    };

    struct Harness {
        text: FakeModel,
        model: RecordingModel,
        uploader: CountingUploader,
        store: MemoryStore,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                text: FakeModel::default(),
                model: RecordingModel::default(),
                uploader: CountingUploader::new(),
                store: MemoryStore::default(),
            }
        }

        fn deps(&self) -> Collaborators<'_> {
            Collaborators {
                text: &self.text,
                image_model: &self.model,
                uploader: &self.uploader,
                store: &self.store,
            }
        }

        async fn run(&self, request: &GenerationRequest) -> Result<String> {
            generate_auto_blog_post(&self.deps(), &NO_DELAY, Some("u-1"), request).await
        }

        fn saved(&self) -> NewArticle {
            self.store.saved.lock().unwrap().last().cloned().unwrap()
        }
    }

    fn manual_request() -> GenerationRequest {
        GenerationRequest {
            category: "Tech".to_string(),
            keywords: "a,b".to_string(),
            title_mode: TitleMode::Manual,
            manual_title: Some("Test".to_string()),
            add_tags: false,
            ..GenerationRequest::default()
        }
    }

    #[tokio::test]
    async fn manual_title_without_images_or_tags() {
        let harness = Harness::new();
        let id = harness.run(&manual_request()).await.unwrap();
        assert_eq!(id, "article-1");

        let article = harness.saved();
        assert_eq!(article.title, "Test");
        assert_eq!(article.slug, "test");
        assert_eq!(
            article.content_html,
            "<p>First paragraph.</p><p>Second paragraph.</p><p>Third paragraph.</p><p>Fourth paragraph.</p>"
        );
        assert_eq!(article.image_url, None);
        assert_eq!(article.background_image_url, None);
        assert!(article.tags.is_empty());
        assert_eq!(article.keywords, vec!["a", "b"]);
        assert_eq!(article.author_id, "u-1");
        assert_eq!(article.status, ArticleStatus::Draft);
        assert!(article.published_at.is_none());

        assert!(harness.text.prompts_containing("blog post titles").is_empty());
        assert!(harness.model.prompts.lock().unwrap().is_empty());
        assert!(harness.uploader.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_user_is_unauthenticated() {
        let harness = Harness::new();
        for user in [None, Some("")] {
            let err = generate_auto_blog_post(&harness.deps(), &NO_DELAY, user, &manual_request())
                .await
                .unwrap_err();
            assert!(matches!(
                err.downcast_ref::<GenerationError>(),
                Some(GenerationError::Unauthenticated)
            ));
        }
        assert!(harness.text.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_keywords_fail_even_with_manual_title() {
        let harness = Harness::new();
        let request = GenerationRequest {
            keywords: " , ".to_string(),
            ..manual_request()
        };
        let err = harness.run(&request).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenerationError>(),
            Some(GenerationError::EmptyKeywordList)
        ));
        assert!(harness.store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_ai_run() {
        let harness = Harness::new();
        let request = GenerationRequest {
            category: "Tech".to_string(),
            keywords: "rust, async".to_string(),
            title_mode: TitleMode::Auto,
            publish_action: PublishAction::Publish,
            featured_image_mode: ImageMode::Ai,
            background_image_mode: ImageMode::Ai,
            in_content_images_mode: ImageMode::Ai,
            in_content_image_rule: Some("every-2".to_string()),
            in_content_image_alignment: ImageAlignment::AlternateRight,
            content_alignment: ContentAlignment::Center,
            add_tags: true,
            tag_mode: TagMode::Auto,
            number_of_tags: Some("2".to_string()),
            comments_enabled: true,
            ..GenerationRequest::default()
        };

        harness.run(&request).await.unwrap();
        let article = harness.saved();

        assert_eq!(article.title, "Generated Title!");
        assert_eq!(article.slug, "generated-title");
        assert_eq!(article.status, ArticleStatus::Published);
        assert!(article.published_at.is_some());
        assert_eq!(article.tags, vec!["one", "two"]);
        // featured, background, then two in-content images
        assert_eq!(article.image_url.as_deref(), Some("https://img.test/1.png"));
        assert_eq!(article.background_image_url.as_deref(), Some("https://img.test/2.png"));
        assert!(article.content_html.contains("src=\"https://img.test/3.png\""));
        assert!(article.content_html.contains("src=\"https://img.test/4.png\""));
        assert_eq!(harness.uploader.uploads.lock().unwrap().len(), 4);
        assert_eq!(article.content_alignment, ContentAlignment::Center);

        // Tags were computed from the plain draft, not the HTML
        let tag_prompt = &harness.text.prompts_containing("topical tags")[0];
        assert!(tag_prompt.contains("First paragraph.\n\nSecond paragraph."));
        assert!(!tag_prompt.contains("<p>"));

        let scene_prompts = harness.text.prompts_containing("photorealistic scene");
        assert_eq!(scene_prompts.len(), 4);
        assert!(scene_prompts[1].contains("Keywords: abstract, pattern, subtle, rust, async"));
        assert!(scene_prompts[2].contains("Keywords: Second paragraph."));
        assert!(scene_prompts[3].contains("Keywords: Fourth paragraph."));
    }

    #[tokio::test]
    async fn random_slots_pick_from_candidates() {
        let harness = Harness::new();
        let request = GenerationRequest {
            featured_image_mode: ImageMode::Random,
            featured_image_urls: vec!["https://cdn.test/only.png".to_string()],
            background_image_mode: ImageMode::Random,
            in_content_images_mode: ImageMode::Random,
            in_content_image_urls: vec!["https://cdn.test/inline.png".to_string()],
            in_content_image_rule: Some("1".to_string()),
            ..manual_request()
        };

        harness.run(&request).await.unwrap();
        let article = harness.saved();
        assert_eq!(article.image_url.as_deref(), Some("https://cdn.test/only.png"));
        // Empty candidate list is a no-op
        assert_eq!(article.background_image_url, None);
        assert!(
            article
                .content_html
                .starts_with("<p>First paragraph.</p><div class=\"article-image my-6\"><img src=\"https://cdn.test/inline.png\"")
        );
        assert!(harness.model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn manual_tags_are_truncated() {
        let harness = Harness::new();
        let request = GenerationRequest {
            add_tags: true,
            tag_mode: TagMode::Manual,
            manual_tags: ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect(),
            number_of_tags: Some("2".to_string()),
            ..manual_request()
        };
        harness.run(&request).await.unwrap();
        assert_eq!(harness.saved().tags, vec!["a", "b"]);
        assert!(harness.text.prompts_containing("topical tags").is_empty());
    }

    #[tokio::test]
    async fn unparseable_tags_do_not_abort() {
        let harness = Harness {
            text: FakeModel {
                tag_reply: Some("tags: rust, async"),
                ..Default::default()
            },
            ..Harness::new()
        };
        let request = GenerationRequest {
            add_tags: true,
            ..manual_request()
        };
        harness.run(&request).await.unwrap();
        assert!(harness.saved().tags.is_empty());
    }

    #[tokio::test]
    async fn image_failure_aborts_before_persisting() {
        let harness = Harness {
            model: RecordingModel {
                empty: true,
                ..Default::default()
            },
            ..Harness::new()
        };
        let request = GenerationRequest {
            featured_image_mode: ImageMode::Ai,
            ..manual_request()
        };
        let err = harness.run(&request).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenerationError>(),
            Some(GenerationError::ImageGenerationFailed)
        ));
        assert!(harness.store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_leaves_hosted_images_behind() {
        let harness = Harness {
            store: MemoryStore {
                fail: true,
                ..Default::default()
            },
            ..Harness::new()
        };
        let request = GenerationRequest {
            featured_image_mode: ImageMode::Ai,
            ..manual_request()
        };
        let err = harness.run(&request).await.unwrap_err();
        assert_eq!(err.to_string(), "document store unavailable");
        assert_eq!(harness.uploader.uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_after_each_ai_image() {
        let harness = Harness::new();
        let request = GenerationRequest {
            featured_image_mode: ImageMode::Ai,
            background_image_mode: ImageMode::Ai,
            ..manual_request()
        };
        let settings = PipelineSettings {
            image_delay: Duration::from_secs(2),
        };

        let started = tokio::time::Instant::now();
        generate_auto_blog_post(&harness.deps(), &settings, Some("u-1"), &request)
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_secs(4));
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("Hello, World! 2026"), "hello-world-2026");
        assert_eq!(slugify("  --  "), "post");
    }
}
