use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::models::GenerationRequest;
use crate::scheduler::Schedule;
use crate::title;

pub const AI_API_KEY_ENV: &str = "BLOGSMITH_AI_API_KEY";
pub const IMAGE_HOST_API_KEY_ENV: &str = "BLOGSMITH_IMAGE_HOST_API_KEY";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub blogsmith: BlogsmithConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub image_host: ImageHostConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub admin: Vec<AdminConfig>,
    #[serde(default)]
    pub auto_post: Vec<AutoPostConfig>,
}

#[derive(Debug, Deserialize)]
pub struct BlogsmithConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_version() -> u32 {
    1
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_listen() -> String {
    "127.0.0.1:8787".to_string()
}
fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "blogsmith.db".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_ai_timeout")]
    pub timeout: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: default_ai_base_url(),
            api_key: None,
            text_model: default_text_model(),
            image_model: default_image_model(),
            timeout: default_ai_timeout(),
        }
    }
}

fn default_ai_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
fn default_text_model() -> String {
    "google/gemini-2.0-flash-001".to_string()
}
fn default_image_model() -> String {
    "google/gemini-2.5-flash-image-preview".to_string()
}
fn default_ai_timeout() -> String {
    "120s".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageHostConfig {
    #[serde(default = "default_image_host_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Seconds until the hosted image expires; unset keeps it forever.
    #[serde(default)]
    pub expiration: Option<u64>,
}

impl Default for ImageHostConfig {
    fn default() -> Self {
        Self {
            endpoint: default_image_host_endpoint(),
            api_key: None,
            expiration: None,
        }
    }
}

fn default_image_host_endpoint() -> String {
    "https://api.imgbb.com/1/upload".to_string()
}

#[derive(Debug, Deserialize)]
pub struct PipelineConfig {
    /// Pause after every successful image generation.
    #[serde(default = "default_image_delay")]
    pub image_delay: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_delay: default_image_delay(),
        }
    }
}

fn default_image_delay() -> String {
    "2s".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub user_id: String,
    pub name: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoPostConfig {
    pub name: String,
    pub schedule: String,
    pub user_id: String,
    #[serde(default = "default_auto_post_enabled")]
    pub enabled: bool,
    pub request: GenerationRequest,
}

fn default_auto_post_enabled() -> bool {
    true
}

impl Config {
    /// Resolve the database path (relative to data_dir if not absolute).
    pub fn db_path(&self) -> PathBuf {
        let db_path = Path::new(&self.database.path);
        if db_path.is_absolute() {
            db_path.to_path_buf()
        } else {
            self.blogsmith.data_dir.join(db_path)
        }
    }

    pub fn image_delay(&self) -> Result<Duration> {
        humantime::parse_duration(&self.pipeline.image_delay)
            .with_context(|| format!("parsing image_delay '{}'", self.pipeline.image_delay))
    }

    /// Fill API keys from the environment. Env values win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(AI_API_KEY_ENV)
            && !key.is_empty()
        {
            self.ai.api_key = Some(key);
        }
        if let Ok(key) = std::env::var(IMAGE_HOST_API_KEY_ENV)
            && !key.is_empty()
        {
            self.image_host.api_key = Some(key);
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(ConfigError::ReadFile)
        .context("reading config file")?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<()> {
    if config.blogsmith.version != 1 {
        return Err(ConfigError::Validation(format!(
            "unsupported config version {} (this binary supports version 1)",
            config.blogsmith.version
        ))
        .into());
    }

    config
        .blogsmith
        .timezone
        .parse::<chrono_tz::Tz>()
        .map_err(|_| ConfigError::Validation(format!("unknown timezone '{}'", config.blogsmith.timezone)))?;

    humantime::parse_duration(&config.ai.timeout)
        .map_err(|e| ConfigError::Validation(format!("ai timeout '{}': {}", config.ai.timeout, e)))?;

    humantime::parse_duration(&config.pipeline.image_delay).map_err(|e| {
        ConfigError::Validation(format!("pipeline image_delay '{}': {}", config.pipeline.image_delay, e))
    })?;

    // Admin identities
    let mut user_ids = HashSet::new();
    let mut tokens = HashSet::new();
    for admin in &config.admin {
        if admin.user_id.trim().is_empty() {
            return Err(ConfigError::Validation(format!("admin '{}': user_id must not be empty", admin.name)).into());
        }
        if !user_ids.insert(admin.user_id.as_str()) {
            return Err(ConfigError::Validation(format!("duplicate admin user_id: '{}'", admin.user_id)).into());
        }
        if admin.token.is_empty() {
            return Err(ConfigError::Validation(format!("admin '{}': token must not be empty", admin.name)).into());
        }
        if !tokens.insert(admin.token.as_str()) {
            return Err(ConfigError::Validation(format!("admin '{}': token is shared with another admin", admin.name)).into());
        }
    }

    // Auto-post jobs
    let mut job_names = HashSet::new();
    for job in &config.auto_post {
        if !job_names.insert(job.name.as_str()) {
            return Err(ConfigError::Validation(format!("duplicate auto_post name: '{}'", job.name)).into());
        }

        Schedule::parse(&job.schedule)
            .map_err(|e| ConfigError::Validation(format!("auto_post '{}': {:#}", job.name, e)))?;

        if !user_ids.contains(job.user_id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "auto_post '{}': references unknown admin user_id '{}'",
                job.name, job.user_id
            ))
            .into());
        }

        if title::parse_keywords(&job.request.keywords).is_empty() {
            return Err(ConfigError::Validation(format!("auto_post '{}': request has no keywords", job.name)).into());
        }
    }

    Ok(())
}
