//! HeritagePAL server
//!
//! Main entry point: loads configuration, wires the store and the
//! generation service, and serves the HTTP API.

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use heritagepal_genai::{GeminiClient, OfflineGenerator, TextGenerator};
use heritagepal_server::{create_router, AppState, Config};
use heritagepal_store::{MemoryStore, Store, SupabaseConfig, SupabaseStore};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// HeritagePAL - Guyanese heritage and social studies learning backend
///
/// Serves topics, grade-appropriate content, AI-generated quizzes and
/// flashcards, and a tutor chat for primary-school students.
#[derive(Parser, Debug)]
#[command(name = "heritagepal")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: heritagepal.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Port for the HTTP API server (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,

    /// Serve from a seeded in-memory store instead of Supabase
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Variables from .env must be visible before config and logging read them.
    let dotenv = dotenvy::dotenv();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let production = std::env::var("NODE_ENV")
        .is_ok_and(|env| env.trim().eq_ignore_ascii_case("production"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!production)
        .init();

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => tracing::debug!("No .env file found"),
        Err(e) => tracing::warn!(error = %e, "Failed to read .env"),
    }

    tracing::info!("HeritagePAL starting");
    tracing::debug!(config = ?args.config, in_memory = args.in_memory, "Arguments");

    match run_server(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Runs the HTTP server until Ctrl+C.
async fn run_server(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    config.apply_process_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }

    // Re-validate after overrides
    config.validate()?;
    if !args.in_memory {
        config.validate_supabase()?;
    }

    print_config(&config, args.in_memory);

    let store = build_store(&config, args.in_memory)?;
    let generator = build_generator(&config)?;

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let router = create_router(AppState::new(config, store, generator));

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!();
    println!("Server running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {e}"))?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

fn build_store(config: &Config, in_memory: bool) -> anyhow::Result<Arc<dyn Store>> {
    if in_memory {
        tracing::warn!("Using in-memory store; data is lost on exit");
        return Ok(Arc::new(MemoryStore::seeded()));
    }

    let store = SupabaseStore::new(SupabaseConfig {
        url: config.supabase.url.clone(),
        anon_key: config.supabase.key.clone(),
        service_key: config.supabase.service_key.clone(),
    })
    .map_err(|e| anyhow::anyhow!("Failed to create Supabase client: {e}"))?;
    if config.supabase.service_key.is_none() {
        tracing::warn!("SUPABASE_SERVICE_KEY not set, table access uses the anon key");
    }
    Ok(Arc::new(store))
}

fn build_generator(config: &Config) -> anyhow::Result<Arc<dyn TextGenerator>> {
    match config.gemini_api_key() {
        Some(key) => {
            let client = GeminiClient::new(key, &config.gemini.model)
                .map_err(|e| anyhow::anyhow!("Failed to create Gemini client: {e}"))?;
            tracing::info!(model = %client.model(), "Gemini client ready");
            Ok(Arc::new(client))
        }
        None => {
            tracing::warn!(
                "GOOGLE_GEMINI_API_KEY is missing or a placeholder; AI features return canned responses"
            );
            Ok(Arc::new(OfflineGenerator))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, shutting down");
}

/// Prints the loaded configuration.
fn print_config(config: &Config, in_memory: bool) {
    println!("Configuration loaded:");
    println!("  Environment: {}", config.environment);
    println!("  Port: {}", config.port);
    if in_memory {
        println!("  Store: in-memory (seeded)");
    } else {
        println!("  Store: {}", config.supabase.url);
    }
    println!(
        "  Gemini: {}",
        if config.gemini_api_key().is_some() {
            config.gemini.model.as_str()
        } else {
            "offline"
        }
    );
    println!("  CORS origins: {}", config.cors_origins.join(", "));
}
