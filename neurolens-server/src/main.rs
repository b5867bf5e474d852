use std::sync::Arc;

use clap::Parser;
use neurolens_core::NeurolensConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use neurolens_server::router::AppState;
use neurolens_server::{http, server};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "neurolens.toml")]
    config: String,

    /// Check storage and capabilities, then exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience; production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match NeurolensConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let state = match AppState::from_config(config).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Failed to open subject storage: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        let repository = state.tracker.repository();
        match repository.health().await {
            Ok(v) => println!("✅ Storage ({}) ok: {}", repository.name(), v),
            Err(e) => {
                println!("❌ Storage ({}) check failed: {}", repository.name(), e);
                std::process::exit(1);
            }
        }

        let status = state.extractor.capabilities().status();
        for (name, available) in [
            ("parser", status.parser),
            ("embedder", status.embedder),
            ("transcriber", status.transcriber),
        ] {
            let mark = if available { "✅" } else { "⚠️ " };
            let detail = if available { "available" } else { "unavailable (degraded)" };
            println!("{} {}: {}", mark, name, detail);
        }

        println!("✅ Neurolens health check passed");
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    if state.config.http.enabled {
        let http_state = state.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = http::start_http_server(http_state, http_shutdown).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = state.config.service.resolved_socket_path();
    server::run_unix_server(&socket_path, state, tx.subscribe()).await?;

    Ok(())
}
