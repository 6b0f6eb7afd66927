use std::net::SocketAddr;

use anyhow::{Context, Result};

use mediagate_service::config::Config;

use crate::endpoints;
use crate::service::ServiceState;

/// Creates the service state and runs the HTTP server until it is stopped.
pub fn run(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("mediagate")
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let socket = config
            .bind
            .parse::<SocketAddr>()
            .context("invalid bind address")?;

        let service = ServiceState::create(config)
            .await
            .context("failed to create service state")?;

        tracing::info!("Starting HTTP server on {}", socket);
        axum_server::bind(socket)
            .serve(endpoints::create_app(service).into_make_service())
            .await?;
        tracing::info!("System shutdown complete");

        Ok(())
    })
}
