use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::pipeline::Services;
use crate::{db, scheduler, server};

pub async fn run(config: Config) -> Result<()> {
    let pool = db::create_pool(&config).await.context("creating database")?;
    info!(db_path = %config.db_path().display(), "database ready");

    if config.admin.is_empty() {
        warn!("no [[admin]] entries configured, the admin API will reject every request");
    }

    let services = Arc::new(Services::from_config(&config, pool.clone()).context("creating pipeline clients")?);
    let config = Arc::new(config);
    let cancel = CancellationToken::new();

    let scheduler_handle = tokio::spawn(scheduler::scheduler_loop(
        pool.clone(),
        config.clone(),
        services.clone(),
        cancel.clone(),
    ));

    let app_state = server::AppState {
        pool: pool.clone(),
        services,
        admins: Arc::new(config.admin.clone()),
    };

    let router = server::build_router(app_state);
    let listener = tokio::net::TcpListener::bind(&config.blogsmith.listen)
        .await
        .with_context(|| format!("binding to {}", config.blogsmith.listen))?;

    info!(listen = %config.blogsmith.listen, "HTTP server listening");

    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                server_cancel.cancelled().await;
            })
            .await
    });

    wait_for_shutdown().await;
    info!("shutdown signal received");

    cancel.cancel();

    // An in-flight pipeline run is abandoned after this
    let shutdown_timeout = std::time::Duration::from_secs(10);
    let _ = tokio::time::timeout(shutdown_timeout, async {
        let _ = scheduler_handle.await;
        let _ = server_handle.await;
    })
    .await;

    pool.close().await;
    info!("shutdown complete");

    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
