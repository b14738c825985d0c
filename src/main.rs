//! dashboard-server keeps a handful of home-dashboard feeds fresh and
//! serves them as one JSON document.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌──────────────┐  set()   ┌──────────┐  get()   ┌────────────┐  JSON
//! │ scheduler.rs │ ───────► │ cache.rs │ ───────► │ server.rs  │ ──────► client
//! │ (thread per  │          │ (shared) │          │ (axum)     │
//! │  source)     │          └──────────┘          └────────────┘
//! └──────────────┘                                      │
//!        │ fetch()                                      │ format()
//!        ▼                                              ▼
//!  ┌──────────────────────── source/ ─────────────────────────┐
//!  │  date · bus_stops · weather · recycling                  │
//!  └──────────────────────────────────────────────────────────┘
//! ```
//!
//! * **`source/`**: the `DataSource` trait and the concrete feeds.
//! * **`cadence`**: when each source is next due.
//! * **`scheduler`**: one background thread per source, fetching on cadence.
//! * **`cache`**: last good raw value per source.
//! * **`app`**: the registered sources plus the cache; builds snapshots.
//! * **`server`**: HTTP endpoint returning the snapshot.
//! * **`main`**: wires everything together. Parse config, start logging,
//!   populate the cache, then serve.

mod app;
mod cache;
mod cadence;
mod config;
mod error;
mod scheduler;
mod server;
mod source;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use app::App;
use config::{Cli, Config};

fn init_tracing(directive: &str) -> Result<()> {
    let filter = EnvFilter::try_new(directive).context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    // -- configuration (fatal on error, before anything starts) -------------
    let config = Config::from_cli(Cli::parse()).context("invalid configuration")?;
    init_tracing(&config.log_level)?;

    // -- sources and shared state --------------------------------------------
    let sources = source::registry(&config).context("failed to build sources")?;
    let app = Arc::new(App::new(sources)?);

    // -- background refresh (returns after the cold-start fetch) -------------
    let scheduler = scheduler::spawn(app.sources(), Arc::clone(app.cache()), config.tick)
        .context("failed to start refresh workers")?;

    // -- HTTP ----------------------------------------------------------------
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let served = runtime.block_on(server::serve(Arc::clone(&app), config.port));

    info!("stopping refresh workers");
    scheduler.shutdown();
    served.with_context(|| format!("server on port {} failed", config.port))
}
