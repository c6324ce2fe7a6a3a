//! Terminal chat client for a Quill server.
//!
//! Reads prompts from stdin, streams the assistant's tokens to stdout.
//! `/clear` erases the conversation, `/quit` leaves.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::warn;
use tokio::io::{AsyncBufReadExt, BufReader};

use quill_client::{
    ClientConfig, ClientEvent, ClientSession, ConnectionState, WsTransport,
};
use quill_protocol::Role;

#[derive(Debug, Parser)]
#[command(author, version, about = "Quill terminal chat client.")]
struct Cli {
    /// Gateway base URL
    #[arg(long, default_value = "http://127.0.0.1:8787", env = "QUILL_SERVER")]
    server: String,
    /// Opaque user key identifying the conversation
    #[arg(long, env = "QUILL_USER")]
    user: String,
    /// Reconnect delay in milliseconds
    #[arg(long, default_value_t = 2000)]
    reconnect_ms: u64,
}

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn try_main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let transport = Arc::new(WsTransport::new(cli.server));
    let config = ClientConfig {
        reconnect_delay: Duration::from_millis(cli.reconnect_ms),
    };
    let handle = ClientSession::spawn(transport, config);
    let mut events = handle.subscribe();

    handle.connect(cli.user.clone()).await?;

    // Render incoming events.
    let renderer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ClientEvent::StateChanged(ConnectionState::Connected) => {
                    eprintln!("[connected]");
                }
                ClientEvent::StateChanged(ConnectionState::Connecting) => {
                    eprintln!("[connecting...]");
                }
                ClientEvent::StateChanged(ConnectionState::Disconnected) => {
                    eprintln!("[disconnected]");
                }
                ClientEvent::HistoryLoaded(count) if count > 0 => {
                    eprintln!("[{count} messages restored]");
                }
                ClientEvent::HistoryLoaded(_) => {}
                ClientEvent::Token(delta) => {
                    print!("{delta}");
                    let _ = io::stdout().flush();
                }
                ClientEvent::Usage(_) | ClientEvent::Data(_) => {}
                ClientEvent::TurnCompleted => println!(),
                ClientEvent::TurnFailed(error) => eprintln!("\n[error: {error}]"),
            }
        }
    });

    // Replay restored history once connected.
    let snapshot = handle.snapshot().await?;
    for message in &snapshot.transcript {
        let speaker = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        println!("{speaker}: {}", message.content);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "/quit" => break,
            "/clear" => {
                if let Err(e) = handle.clear_history().await {
                    warn!("clear failed: {e}");
                } else {
                    eprintln!("[history cleared]");
                }
            }
            prompt => {
                if let Err(e) = handle.send_prompt(prompt).await {
                    eprintln!("[not sent: {e}]");
                }
            }
        }
    }

    handle.disconnect().await?;
    renderer.abort();
    Ok(())
}
