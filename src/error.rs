use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("validation error: {0}")]
    Validation(String),
}

/// Fatal conditions raised by the generation pipeline.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("caller is not authenticated")]
    Unauthenticated,
    #[error("keyword list is empty")]
    EmptyKeywordList,
    #[error("could not resolve a title")]
    TitleResolutionFailed,
    #[error("image prompt generation returned nothing for '{0}'")]
    PromptGenerationFailed(String),
    #[error("image model returned no image payload")]
    ImageGenerationFailed,
    #[error("image host returned no URL")]
    ImageHostingFailed,
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("image host API key is not configured")]
    MissingCredential,
    #[error("image host rejected upload ({status}): {body}")]
    UploadRejected { status: u16, body: String },
    #[error("malformed image host response: {0}")]
    MalformedHostResponse(String),
    #[error("image host request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI API key is not configured")]
    MissingApiKey,
    #[error("AI request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("AI provider returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("failed to parse AI response: {0}")]
    Parse(String),
}
