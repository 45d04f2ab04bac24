use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use tab_bridge::bootstrap::SessionBootstrap;
use tab_bridge::brain::DecisionClient;
use tab_bridge::executor::CommandExecutor;
use tab_bridge::hands::ChromeConnector;
use tab_bridge::link::BackendLink;
use tab_bridge::{Config, Dispatcher, face};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let config = Config::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tab_bridge=info")))
        .with(fmt::layer().with_target(true))
        .init();

    info!("Starting tab-bridge, Chrome at {}", config.chrome_endpoint);

    let connector = Arc::new(ChromeConnector::new(
        &config.chrome_endpoint,
        config.executor_config().attach_wait,
        config.browser_idle(),
    ));
    let resolver = Arc::new(
        DecisionClient::new(&config.backend_http, config.decision_timeout())
            .context("Failed to build decision client")?,
    );
    info!("Decision endpoint: {}", resolver.endpoint());

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let executor = CommandExecutor::new(resolver, config.executor_config());
    let bootstrap = SessionBootstrap::new(connector, outbound_tx);
    let (dispatcher, handle) = Dispatcher::new(executor, bootstrap, config.session_idle());

    tokio::spawn(dispatcher.run());
    tokio::spawn(BackendLink::new(&config.backend_ws, config.reconnect()).run(handle.clone(), outbound_rx));

    let (listener, port) = face::bind(config.port)
        .await
        .with_context(|| format!("Could not bind any port from {}", config.port))?;
    info!("Caller API listening on http://localhost:{}", port);

    if let Err(e) = axum::serve(listener, face::router(handle)).await {
        error!("Server stopped: {}", e);
        return Err(e.into());
    }
    Ok(())
}
