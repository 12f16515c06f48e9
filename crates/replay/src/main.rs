// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! mx-replay: drives the mx client from recorded sync responses.
//!
//! Replays a JSONL file of sync responses through the full client (sync
//! loop, projector, local echoes) and prints the resulting rooms.
//!
//! Usage:
//!   mx-replay <FIXTURE> [--user @me:example.org] [--send '!room:example.org=hello']

mod error;
mod render;
mod transport;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mx_client::{Client, ClientConfig, ClientEvent, FileStore, MemoryStore, Persistence, SyncState};
use mx_core::SystemClock;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use error::{Error, Result};
use transport::ReplayTransport;

const DEFAULT_USER: &str = "@replay:localhost";

/// mx-replay: replay recorded sync responses through the mx client
#[derive(Parser, Debug)]
#[command(name = "mx-replay")]
#[command(about = "Replay recorded sync responses through the mx client and print the rooms")]
struct Args {
    /// JSONL file with one sync response per line
    fixture: PathBuf,

    /// User the recording belongs to
    #[arg(short, long)]
    user: Option<String>,

    /// Client config file (TOML); command line flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep old timelines reachable after gaps
    #[arg(long)]
    timeline_support: bool,

    /// Send a message once the recording is applied, as ROOM_ID=BODY
    #[arg(long = "send", value_name = "ROOM_ID=BODY")]
    sends: Vec<String>,

    /// Store sync progress in this directory
    #[arg(long)]
    store: Option<PathBuf>,

    /// Store sync progress in the default state directory
    #[arg(long, conflicts_with = "store")]
    persist: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging(args.verbose);

    if let Err(e) = run(args).await {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn setup_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<()> {
    let config = build_config(&args)?;
    let sends = args.sends.iter().map(|s| parse_send(s)).collect::<Result<Vec<_>>>()?;
    let transport = Arc::new(ReplayTransport::open(&args.fixture)?);
    info!(batches = transport.remaining(), fixture = %args.fixture.display(), "loaded recording");

    match store_dir(&args)? {
        Some(dir) => {
            info!(dir = %dir.display(), "using file store");
            let store = Arc::new(FileStore::open(&dir)?);
            replay(config, transport, store, sends).await
        }
        None => replay(config, transport, Arc::new(MemoryStore::new()), sends).await,
    }
}

fn build_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::new(DEFAULT_USER),
    };
    if let Some(user) = &args.user {
        config.user_id = user.clone();
    }
    if args.timeline_support {
        config.timeline_support = true;
    }
    config.validate()?;
    Ok(config)
}

fn store_dir(args: &Args) -> Result<Option<PathBuf>> {
    if let Some(dir) = &args.store {
        return Ok(Some(dir.clone()));
    }
    if !args.persist {
        return Ok(None);
    }
    dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
        .map(|dir| Some(dir.join("mx-replay")))
        .ok_or(Error::NoStateDir)
}

/// Splits `ROOM_ID=BODY`.
fn parse_send(arg: &str) -> Result<(String, String)> {
    match arg.split_once('=') {
        Some((room_id, body)) if room_id.starts_with('!') && !body.is_empty() => {
            Ok((room_id.to_string(), body.to_string()))
        }
        _ => Err(Error::BadSend(arg.to_string())),
    }
}

async fn replay<P: Persistence>(
    config: ClientConfig,
    transport: Arc<ReplayTransport>,
    store: Arc<P>,
    sends: Vec<(String, String)>,
) -> Result<()> {
    let client = Client::with_clock(config, Arc::clone(&transport), store, Arc::new(SystemClock))?;
    let events = tokio::spawn(log_events(client.subscribe()));
    let sync = client.start();

    transport.exhausted().await;
    if sync.state() == Some(SyncState::Error) {
        warn!("sync ended in ERROR state");
    }

    for (room_id, body) in sends {
        let pending = client.send_event(&room_id, "m.room.message", json!({"msgtype": "m.text", "body": body})).await?;
        let outcome = pending.handle.outcome().await?;
        debug!(%room_id, txn_id = %pending.txn_id, ?outcome, "sent");
    }

    sync.stop();
    sync.join().await;
    client.stop();
    events.abort();

    for room_id in client.rooms().room_ids().await {
        if let Some(room) = client.room(&room_id).await {
            print!("{}", render::render_room(&room));
        }
    }
    Ok(())
}

async fn log_events(mut rx: tokio::sync::broadcast::Receiver<ClientEvent>) {
    loop {
        match rx.recv().await {
            Ok(ClientEvent::SyncStateChanged { new, old, error }) => match error {
                Some(error) => warn!(?old, %new, %error, "sync state changed"),
                None => info!(?old, %new, "sync state changed"),
            },
            Ok(ClientEvent::Room(notification)) => debug!(?notification, "room notification"),
            Ok(ClientEvent::ToDevice(event)) => debug!(event_type = %event.event_type, "to-device event"),
            Err(RecvError::Lagged(missed)) => warn!(missed, "event log lagged"),
            Err(RecvError::Closed) => return,
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
