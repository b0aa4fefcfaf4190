//! Worldview Quiz Backend
//!
//! - Axum HTTP + WebSocket API (quiz channel and live voice bridge)
//! - Optional Gemini integration (via environment variables)
//! - Per-profile progress and saved results on local disk
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT               : u16 (default 3000)
//!   DATA_DIR           : storage root (default "./data")
//!   PUBLIC_BASE_URL    : base of share links (default "http://localhost:3000")
//!   GEMINI_API_KEY     : enables Gemini integration if present
//!   GEMINI_BASE_URL    : default "https://generativelanguage.googleapis.com/v1beta"
//!   GEMINI_TEXT_MODEL  : options and reports
//!   GEMINI_IMAGE_MODEL : stage images
//!   GEMINI_LIVE_MODEL  : voice sessions
//!   GEMINI_LIVE_URL    : live WebSocket endpoint
//!   QUIZ_CONFIG_PATH   : path to TOML config (prompts, tuning, retry, optional question bank)
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default), "compact" or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod seeds;
mod bank;
mod retry;
mod genai;
mod options;
mod quiz;
mod scoring;
mod report;
mod imagery;
mod share;
mod store;
mod results;
mod state;
mod protocol;
mod logic;
mod voice;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared application state (question bank, Gemini client, storage, sessions).
  let state = Arc::new(AppState::new());
  info!(target: "worldview_quiz", data_dir = %state.store.root().display(), public_base_url = %state.public_base_url, "Storage ready");

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "worldview_quiz", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "worldview_quiz", "Shutdown signal received");
    })
    .await?;
  Ok(())
}
