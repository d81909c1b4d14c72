use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use media_relay::config;
use media_relay::downloader::tools::detect_tools;
use media_relay::downloader::ExtractorMode;

#[derive(Parser)]
#[command(name = "media-relay")]
#[command(author, version, about = "Resolve media metadata and relay downloads through yt-dlp")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config, falls back to $PORT)
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Extractor backend: cli, python, remote or auto (overrides config)
        #[arg(long)]
        extractor: Option<ExtractorMode>,

        /// Path to the yt-dlp binary (overrides config)
        #[arg(long)]
        ytdlp_path: Option<String>,

        /// Base URL of the extraction helper for the remote backend
        #[arg(long)]
        remote_url: Option<String>,

        /// Proxy passed to yt-dlp (overrides config)
        #[arg(long)]
        proxy: Option<String>,
    },

    /// Check that the extractor tools are available
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "media_relay=debug,tower_http=debug".to_string()
        } else {
            "media_relay=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt().with_env_filter(&env_filter).init();

    let mut config = config::load_config_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            extractor,
            ytdlp_path,
            remote_url,
            proxy,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            let mut overrides = std::mem::take(&mut config.extractor);
            if let Some(mode) = extractor {
                overrides = overrides.with_mode(mode);
            }
            if ytdlp_path.is_some() {
                overrides = overrides.with_ytdlp_path(ytdlp_path);
            }
            if remote_url.is_some() {
                overrides = overrides.with_remote_url(remote_url);
            }
            if proxy.is_some() {
                overrides = overrides.with_proxy(proxy);
            }
            config.extractor = overrides;
            config::validate_config(&config)?;

            tracing::info!(
                "Server will listen on {}:{} (extractor: {})",
                config.server.host,
                config.server.port,
                config.extractor.mode
            );
            media_relay::serve(config).await
        }
        Commands::Tools => {
            for tool in detect_tools(&config.extractor).await {
                let status = if tool.is_available { "ok" } else { "missing" };
                println!(
                    "{:<18} {:<8} {:<12} {}",
                    tool.name,
                    status,
                    tool.version.as_deref().unwrap_or("-"),
                    tool.path.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
    }
}
