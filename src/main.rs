//! ChemRoll · Classroom Review Game Backend
//!
//! - Axum HTTP + WebSocket API
//! - Dice-driven turn flow over a roll-total board of review questions
//! - JSON file persistence under a configurable data directory
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT             : u16 (default 3000)
//!   GAME_CONFIG_PATH : path to TOML config (data dir, dice mode, turn pacing)
//!   LOG_LEVEL        : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT       : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod ids;
mod store;
mod board;
mod turn;
mod reconcile;
mod state;
mod protocol;
mod logic;
mod routes;

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state: load the collections from disk and deal
  // the first board.
  let config = config::load_game_config_from_env().unwrap_or_default();
  let state = AppState::new(config).await?;

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state);

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "chemroll_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
