//! session-tail - attach to a realtime companion session from a terminal
//!
//! Prints every status change and inbound frame as one JSON line on stdout.
//! Each stdin line is sent as a chat message; `/interrupt` sends an interrupt,
//! `/status` prints the current status. EOF or Ctrl-C disconnects.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use companion_session::{
    ConnectionStatus, EnvToken, InboundFrame, SessionClient, SessionConfig, SessionEvent,
    WebSocketTransportFactory,
};
use dotenv::dotenv;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "session-tail", version, about = "Tail a realtime companion session")]
struct Cli {
    /// Realtime endpoint (overrides SESSION_ENDPOINT from the environment)
    #[arg(long)]
    endpoint: Option<String>,

    /// Session (conversation) id to attach to
    #[arg(long, env = "SESSION_ID")]
    session: String,

    /// Environment variable holding the access token
    #[arg(long, env = "SESSION_TOKEN_ENV", default_value = "COMPANION_ACCESS_TOKEN")]
    token_env: String,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum OutputLine<'a> {
    Status { status: &'a ConnectionStatus },
    Frame { frame: &'a InboundFrame },
}

fn print_line(line: &OutputLine<'_>) {
    match serde_json::to_string(line) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(error = %e, "failed to render output line"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();

    let mut config = SessionConfig::from_env();
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    info!(endpoint = %config.endpoint, session_id = %cli.session, "🔌 session-tail starting");

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let transports = Arc::new(WebSocketTransportFactory::new(&config));
    let client = SessionClient::new(
        config,
        Arc::new(EnvToken::new(cli.token_env)),
        transports,
        Arc::new(event_tx),
    );

    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match &event {
                SessionEvent::Status(status) => print_line(&OutputLine::Status { status }),
                SessionEvent::Frame(frame) => print_line(&OutputLine::Frame { frame }),
            }
        }
    });

    client
        .connect(&cli.session)
        .await
        .context("Failed to connect session")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, disconnecting");
                break;
            }
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => handle_input(&client, line.trim()),
                    None => break,
                }
            }
        }
    }

    client.disconnect();
    drop(client);
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;

    Ok(())
}

fn handle_input(client: &SessionClient, line: &str) {
    let result = match line {
        "" => return,
        "/status" => {
            print_line(&OutputLine::Status {
                status: &client.status(),
            });
            return;
        }
        "/interrupt" => client.send_interrupt(),
        text => client.send_chat(text, Some(uuid::Uuid::new_v4().to_string())),
    };

    if let Err(e) = result {
        warn!(error = %e, "send failed");
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "companion_session=debug,session_tail=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate root .env when launched from elsewhere
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}
