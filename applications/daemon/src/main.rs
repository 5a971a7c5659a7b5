//! Nocturne Daemon - background playback with a line-based control socket
use anyhow::Context;
use clap::{Parser, Subcommand};
use nocturne_daemon::{config::DaemonConfig, ipc, start_service};
use nocturne_playback::ServiceMessage;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nocturne-daemon")]
#[command(about = "Nocturne background playback daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon
    Serve {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Send one request to a running daemon and print the reply
    Send {
        /// Control socket address
        #[arg(short, long, default_value = "127.0.0.1:7700", env = "NOCTURNE_ADDRESS")]
        address: String,
        /// Request words, e.g. `open 1 2 3` or `status`
        #[arg(required = true, trailing_var_arg = true)]
        request: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nocturne_daemon=info,nocturne_playback=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            serve(config).await?;
        }
        Commands::Send { address, request } => {
            send(&address, &request.join(" ")).await?;
        }
    }

    Ok(())
}

async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    // Load configuration
    let config = DaemonConfig::load(config_path.as_deref())?;
    config.validate()?;

    tracing::info!("Starting Nocturne daemon");
    tracing::info!("Control socket: {}", config.ipc.address);

    let service = Arc::new(start_service(&config)?);

    let listener = TcpListener::bind(config.socket_addr()?)
        .await
        .with_context(|| format!("binding {}", config.ipc.address))?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };
    ipc::serve(listener, Arc::clone(&service), shutdown).await?;

    tracing::info!("Shutting down");
    match Arc::try_unwrap(service) {
        Ok(service) => tokio::task::spawn_blocking(move || service.shutdown()).await?,
        // Open connections still hold the service; the last one to close
        // joins the worker
        Err(service) => {
            let _ = service.send(ServiceMessage::Shutdown);
        }
    }

    Ok(())
}

async fn send(address: &str, request: &str) -> anyhow::Result<()> {
    let stream = TcpStream::connect(address)
        .await
        .with_context(|| format!("connecting to {address}"))?;
    let (reader, mut writer) = stream.into_split();

    writer.write_all(format!("{request}\n").as_bytes()).await?;
    writer.shutdown().await?;

    let mut reply = String::new();
    BufReader::new(reader).read_line(&mut reply).await?;
    if reply.is_empty() {
        anyhow::bail!("daemon closed the connection without replying");
    }
    println!("{}", reply.trim_end());

    if reply.starts_with("err ") {
        std::process::exit(1);
    }
    Ok(())
}
