use anyhow::Context;
use clap::Parser;
use sentinel_config::{ConfigLoader, LogFormat};
use sentinel_engine::Engine;
use sentinel_server::{create_router, logging, AppState};
use sentinel_shutdown::{ResourceManager, ShutdownCoordinator, ShutdownPhase, SignalHandler};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/sentinel.toml")]
    config: PathBuf,

    /// Override the query API bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the query API port
    #[arg(long)]
    port: Option<u16>,

    /// Override the log level (RUST_LOG still wins)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ConfigLoader::new(&args.config)
        .load()
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.json_logs {
        config.logging.format = LogFormat::Json;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    logging::init(&config.logging)?;
    info!("Starting Sentinel with config: {}", args.config.display());

    let server_config = config.server.clone();
    let shutdown_timeout = config.engine.shutdown_timeout();

    let engine = Arc::new(Engine::builder(config).build()?);
    engine.start().await?;

    let (signal_handler, _signal_rx) = SignalHandler::new();

    // 查询 API
    let server_task = if server_config.enabled {
        let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port)
            .parse()
            .with_context(|| {
                format!("invalid server address {}:{}", server_config.host, server_config.port)
            })?;
        let app = create_router(AppState::new(engine.clone()));
        let server = axum::Server::try_bind(&addr)
            .with_context(|| format!("failed to bind {}", addr))?;
        let mut shutdown_rx = signal_handler.subscribe();

        info!("Query API listening on http://{}", addr);
        Some(tokio::spawn(async move {
            server
                .serve(app.into_make_service())
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
        }))
    } else {
        info!("Query API disabled");
        None
    };

    let mut resources = ResourceManager::new().with_timeout(shutdown_timeout + Duration::from_secs(1));
    resources.register(engine.clone());

    let coordinator = ShutdownCoordinator::builder()
        .with_signal_handler(signal_handler.clone())
        .with_resource_manager(resources)
        .with_shutdown_timeout(shutdown_timeout + Duration::from_secs(5))
        .build();

    let listener = signal_handler.clone();
    tokio::spawn(async move {
        listener.wait_for_system_signal().await;
    });

    let phase = coordinator.run().await;

    if let Some(task) = server_task {
        match task.await {
            Ok(Ok(())) => info!("Query API stopped"),
            Ok(Err(e)) => error!("Query API error: {}", e),
            Err(e) => error!("Query API task failed: {}", e),
        }
    }

    if phase == ShutdownPhase::TimedOut {
        warn!("Shutdown did not complete in time");
    }
    info!("Sentinel stopped");
    Ok(())
}
