//! guardian — interactive REPL over a running guardian.
//! The background loop runs as its own task while stdin is read line by line.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use guardian_core::config::Config;
use guardian_core::events::GuardianEvent;
use guardian_core::lookup::WikipediaLookup;
use guardian_core::senses::Capabilities;
use guardian_core::{Command, Guardian, RequestHandler};

const LOG_FILE: &str = "guardian.log";

fn init_tracing() {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    };

    // Log to a file, not stdout, since the REPL owns the terminal
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(LOG_FILE)
    {
        Ok(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        Err(_) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(io::stderr)
                .try_init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = Config::load_or_default(&project_root).context("Invalid configuration")?;

    let lookup = WikipediaLookup::from_config(&config).context("Failed to build HTTP client")?;
    let guardian = Arc::new(Guardian::from_config(config, Capabilities::none()));
    guardian.load_state().await;
    let handler = RequestHandler::new(guardian.clone(), Arc::new(lookup));

    // Surface dreams and instability in the terminal
    let mut rx = guardian.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if event.is_instability() {
                        println!("  (feeling unstable)");
                    }
                    if let GuardianEvent::Dream(dream) = event {
                        println!("  (dreamed of: {})", dream.fragment);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    });

    let background = guardian.spawn();
    info!("Guardian started, state at {}", guardian.state_path().display());
    println!("Guardian initialized. Type 'exit' or 'quit' to save and leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            // stdin closed
            if let Err(e) = guardian.save().await {
                error!("Final save failed: {}", e);
            }
            break;
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let shutdown = Command::parse(line).is_shutdown();
        let reply = handler.handle(line).await;
        println!("{}", reply);
        if shutdown {
            break;
        }
    }

    background.abort();
    info!("Guardian shutting down.");
    Ok(())
}
