// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::Parser;
use orket_coordinator::{build_app, AppState, Card, CoordinatorStore, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "orket-coordinator", version, about = "Orket lease coordinator")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "127.0.0.1:8177")]
    bind: String,

    /// JSON file with the initial card set (an array of cards).
    #[arg(long)]
    seed_cards: Option<PathBuf>,

    /// Enable request/response debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("orket=debug")
    } else {
        EnvFilter::new("orket=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = Arc::new(CoordinatorStore::new(Arc::new(SystemClock::new())));
    if let Some(path) = &args.seed_cards {
        let raw = std::fs::read(path)
            .with_context(|| format!("read seed cards {}", path.display()))?;
        let cards: Vec<Card> = serde_json::from_slice(&raw)
            .with_context(|| format!("parse seed cards {}", path.display()))?;
        info!(count = cards.len(), "seeding card set");
        store.reset(cards);
    }

    let app = build_app(AppState { store });
    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(bind = %args.bind, "orket-coordinator listening");

    axum::serve(listener, app).await.context("serve")
}
