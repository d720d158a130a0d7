use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use passgate::{config, jobs, server};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "passgate=debug,tower_http=debug".into()),
    );
    let json = config::env_bool("PASSGATE_LOG_JSON", false);
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::CheckConfig) => check_config(cfg),
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    let sweep_every = Duration::from_secs(cfg.sweep_interval_secs);
    let state = Arc::new(server::AppState::new(cfg)?);

    tracing::info!(
        enabled = state.passes.is_enabled(),
        ttl_secs = state.passes.ttl().as_secs(),
        max_uses = state.passes.max_uses(),
        header = state.headers.pass.as_str(),
        "access passes configured"
    );

    let sweeper = jobs::sweep::spawn(state.passes.store().clone(), sweep_every);
    tracing::info!("Background pass sweep started (every {}s)", sweep_every.as_secs());

    let app = server::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("passgate listening on {}", addr);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("passgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

fn check_config(cfg: config::Config) -> anyhow::Result<()> {
    let state = server::AppState::new(cfg)?;
    let passes = &state.passes;
    println!(
        "Access passes:\n  Enabled:   {}\n  TTL:       {}s\n  Max uses:  {}\n  Header:    {}\n  Bind addr: {}\n  Bind UA:   {}\n  Capacity:  {}",
        passes.is_enabled(),
        passes.ttl().as_secs(),
        passes.max_uses(),
        state.headers.pass.as_str(),
        state.config.pass.bind_address,
        state.config.pass.bind_user_agent,
        passes.store().max_entries(),
    );
    println!(
        "Challenge:\n  Header:    {}\n  Verifier:  {}\n  Secret:    {}",
        state.headers.challenge.as_str(),
        state.config.challenge.verify_url,
        if state.config.challenge.secret.is_some() { "set" } else { "MISSING" },
    );
    println!("Upstream:\n  URL:       {}", state.config.upstream.url);
    Ok(())
}
