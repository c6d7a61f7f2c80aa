use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wa_gateway::{
    api,
    protocol::{qr, MessagingClient, PairingEvent},
    Config, GatewayService, LocalClient,
};

/// HTTP gateway for WhatsApp login and outbound messages.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to the JSON session file (overrides WA_SESSION_FILE).
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Port to listen on (overrides HTTP_PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Choose a command to run; defaults to `serve`.
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server.
    Serve,
    /// Print the current pairing code as a QR code in the terminal.
    Pair,
    /// Record the paired account JID, completing pairing for this session.
    Register { jid: String },
    /// Print the resolved configuration and session summary.
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(path) = cli.state_file {
        config = config.with_session_file(path);
    }
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }

    let client = Arc::new(
        LocalClient::open(&config)
            .with_context(|| format!("cannot open session {}", config.session_file.display()))?,
    );

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let service = Arc::new(GatewayService::new(client.clone(), config.login_timeout));
            api::serve(&config, service, shutdown_signal())
                .await
                .with_context(|| format!("API server on {} failed", config.bind_addr()))?;
            client.disconnect().await?;
            info!("Shut down cleanly");
        }
        Commands::Pair => pair(&client, &config).await?,
        Commands::Register { jid } => {
            let recipient = wa_gateway::parse_recipient(&jid);
            if !recipient.valid {
                bail!("{jid:?} is not a valid JID");
            }
            client.register(&recipient.jid).await?;
            println!("Registered device: {}", recipient.jid);
        }
        Commands::ShowConfig => {
            let state = client.state().await;
            println!("Config: {}", serde_json::to_string_pretty(&config)?);
            println!(
                "Session: device={} paired={} sent={}",
                state.device_name,
                state.registered_jid.as_deref().unwrap_or("no"),
                state.sent.len()
            );
        }
    }

    Ok(())
}

async fn pair(client: &LocalClient, config: &Config) -> anyhow::Result<()> {
    if client.has_identity().await {
        println!("Device already paired.");
        return Ok(());
    }

    let mut pairing = client.pairing_channel().await?;
    client.connect().await?;

    match tokio::time::timeout(config.login_timeout, pairing.recv()).await {
        Ok(Some(PairingEvent::Code { code, timeout })) => {
            println!("{}", qr::render_ascii(&code)?);
            println!("Scan within {}s, then run `register <jid>`.", timeout.as_secs());
        }
        Ok(Some(other)) => bail!("pairing ended with {}", other.name()),
        Ok(None) => bail!("pairing channel closed"),
        Err(_) => bail!("timed out waiting for a pairing code"),
    }

    client.disconnect().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Cannot listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining connections");
}
