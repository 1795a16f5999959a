mod ai;
mod assemble;
mod cli;
mod config;
mod daemon;
mod db;
mod draft;
mod error;
mod imagegen;
mod imghost;
mod models;
mod pipeline;
mod scheduler;
mod server;
mod store;
mod tags;
mod title;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::config::{load_config, validate_config};
use crate::models::GenerationRequest;
use crate::pipeline::Services;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        load_config(&cli.config).with_context(|| format!("loading config from {}", cli.config.display()))?;
    config.apply_env_overrides();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.blogsmith.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(config_path = %cli.config.display(), "config loaded");

    validate_config(&config).context("config validation failed")?;
    info!("config validated successfully");

    match cli.command {
        Some(Commands::Validate) => {
            println!("Configuration is valid.");
        }
        Some(Commands::Generate { request, user, output }) => {
            if !config.admin.iter().any(|a| a.user_id == user) {
                anyhow::bail!("user '{user}' is not a configured [[admin]]");
            }

            let raw = std::fs::read_to_string(&request)
                .with_context(|| format!("reading request from {}", request.display()))?;
            let generation_request: GenerationRequest =
                toml::from_str(&raw).with_context(|| format!("parsing request {}", request.display()))?;

            let pool = db::create_pool(&config).await.context("creating database")?;
            info!(db_path = %config.db_path().display(), "database ready");

            let services = Services::from_config(&config, pool.clone()).context("creating pipeline clients")?;
            let id = services.run(Some(&user), &generation_request).await?;

            if let Some(output_path) = output {
                let article = store::get_article(&pool, &id)
                    .await?
                    .with_context(|| format!("article {id} missing after save"))?;
                std::fs::write(&output_path, &article.content_html)
                    .with_context(|| format!("writing output to {}", output_path.display()))?;
                info!(path = %output_path.display(), "wrote article HTML");
                println!("Article HTML written to: {}", output_path.display());
            }
            println!("Article stored: {id}");

            pool.close().await;
        }
        Some(Commands::Show { id }) => {
            let pool = db::create_pool(&config).await.context("creating database")?;
            let article = store::get_article(&pool, &id)
                .await?
                .with_context(|| format!("no article with id '{id}'"))?;
            println!("{}", serde_json::to_string_pretty(&article).context("serializing article")?);
            pool.close().await;
        }
        None => {
            daemon::run(config).await?;
        }
    }

    Ok(())
}
