//! gatelink CLI
//!
//! Command-line interface for talking to a gateway directly:
//! - Make one-off RPC calls
//! - Send a chat message
//! - Watch a session's chat stream live
//! - Generate a config file

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

use gatelink::chat::{ChatStreamReducer, Outcome, Role};
use gatelink::config::Config;
use gatelink::gateway::{GatewayClient, GatewayConfig, GatewayEvent};
use gatelink::bridge::send_chat;
use gatelink::protocol::ChatEventKind;

#[derive(Parser)]
#[command(name = "gatelink-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Talk to an agent gateway from the command line")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Gateway URL (overrides config)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Gateway token (overrides config)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Seconds to wait for the gateway handshake
    #[arg(long, default_value = "10", global = true)]
    pub timeout: u64,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Call a gateway method and print the response
    Call {
        /// Method name (e.g. sessions.list)
        method: String,
        /// JSON params
        #[arg(default_value = "{}")]
        params: String,
    },

    /// Send a chat message to a session
    Send {
        /// Session key
        session: String,
        /// Message text
        message: String,
    },

    /// Stream chat events until interrupted
    Watch {
        /// Only show this session
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::from_env(),
    };
    gatelink::logging::init(&gatelink::config::LoggingConfig {
        level: "warn".to_string(),
        ..config.logging.clone()
    })
    .context("initializing logging")?;

    let timeout = Duration::from_secs(cli.timeout);

    match cli.command {
        Commands::Call { method, params } => {
            let params: Value = serde_json::from_str(&params).context("params must be JSON")?;
            let (client, _events) = connect(gateway_config(&config, &cli.url, &cli.token)?, timeout).await?;

            let result = client.request(method, params).await;
            client.stop().await;

            println!("{}", serde_json::to_string_pretty(&result?)?);
        }

        Commands::Send { session, message } => {
            let (client, _events) = connect(gateway_config(&config, &cli.url, &cli.token)?, timeout).await?;

            let mut reducer = ChatStreamReducer::new(config.chat.reducer_config());
            let result = send_chat(&client, &mut reducer, &session, &message).await;
            client.stop().await;

            for turn in reducer.history() {
                print_message(turn.role, &turn.text);
            }
            let response = result?;
            match response.get("runId").and_then(Value::as_str) {
                Some(run_id) => println!("Sent (run {})", run_id),
                None => println!("Sent"),
            }
        }

        Commands::Watch { session } => {
            let (client, events) = connect(gateway_config(&config, &cli.url, &cli.token)?, timeout).await?;
            let reducer = ChatStreamReducer::new(config.chat.reducer_config());

            tokio::select! {
                _ = watch(events, reducer, session) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
            client.stop().await;
        }

        Commands::Config { output } => {
            let config = gatelink::config::generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

fn gateway_config(
    config: &Config,
    url: &Option<String>,
    token: &Option<String>,
) -> anyhow::Result<GatewayConfig> {
    let mut settings = config.gateway.clone();
    if let Some(url) = url {
        settings.url = Some(url.clone());
    }
    if let Some(token) = token {
        settings.token = Some(token.clone());
    }
    match settings.client_config() {
        Some(mut gateway) => {
            gateway.mode = "cli".to_string();
            Ok(gateway)
        }
        None => bail!("no gateway URL: pass --url or set GATELINK_GATEWAY_URL"),
    }
}

/// Start a client and wait for its handshake
async fn connect(
    config: GatewayConfig,
    timeout: Duration,
) -> anyhow::Result<(GatewayClient, mpsc::UnboundedReceiver<GatewayEvent>)> {
    let url = config.url.clone();
    let (client, events) = GatewayClient::with_channel(config);
    client.start();

    let mut state = client.subscribe_state();
    let connected = tokio::time::timeout(timeout, async {
        state.wait_for(|s| s.is_connected()).await.is_ok()
    })
    .await;

    if !matches!(connected, Ok(true)) {
        client.stop().await;
        bail!("could not connect to gateway at {} within {:?}", url, timeout);
    }
    Ok((client, events))
}

async fn watch(
    mut events: mpsc::UnboundedReceiver<GatewayEvent>,
    mut reducer: ChatStreamReducer,
    session: Option<String>,
) {
    let mut stdout = std::io::stdout();

    while let Some(event) = events.recv().await {
        match event {
            GatewayEvent::State(state) => eprintln!("-- gateway {}", state),
            GatewayEvent::Chat(chat) => {
                if let (Some(wanted), Some(actual)) = (&session, &chat.session_key) {
                    if wanted != actual {
                        continue;
                    }
                }

                let fragment = match &chat.kind {
                    ChatEventKind::Delta { text } => Some(text.clone()),
                    _ => None,
                };
                let was_streaming = reducer.stream_text().is_some();

                match reducer.apply(chat) {
                    Outcome::Updated => {
                        if let Some(fragment) = fragment {
                            print!("{}", fragment);
                            let _ = stdout.flush();
                        }
                    }
                    Outcome::Appended => {
                        if was_streaming {
                            // Text was already shown as it streamed
                            println!();
                        }
                        if let Some(message) = reducer.last_turn() {
                            if !was_streaming || message.is_error {
                                print_message(message.role, &message.text);
                            }
                        }
                    }
                    Outcome::Closed => {
                        if was_streaming {
                            println!();
                        }
                    }
                    Outcome::Discarded => {}
                }
            }
            GatewayEvent::Closed { code, reason } => {
                eprintln!("-- connection closed ({:?}) {}", code, reason);
            }
            _ => {}
        }
    }
}

fn print_message(role: Role, text: &str) {
    let label = match role {
        Role::User => "you",
        Role::Assistant => "agent",
        Role::System => "system",
    };
    println!("[{}] {}", label, text);
}
