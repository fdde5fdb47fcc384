//! Debounced code-autosave service for the judge backend.
//!
//!
//!
//! # How a save becomes a row
//!
//! - Editor saves → [`service::stage_code`] writes the code under a data key
//!   and arms a short-TTL debounce key; every further save overwrites the
//!   code and resets the TTL
//! - User goes quiet → the debounce key's TTL elapses → Redis publishes the
//!   key name on `__keyevent@{db}__:expired`
//! - The listener decodes the key, reads the staged code, resolves the user
//!   id to a username, upserts into Postgres, and deletes the staged copy
//!
//! Rapid edits thus collapse into a single durable write, and nothing ever
//! hits Postgres while the user is still typing.
//!
//!
//!
//! # Notes
//!
//! ## Why two keys per save
//!
//! The debounce key only exists to expire; the code lives under a separate
//! data key. If the code itself carried the short TTL, it would be gone by
//! the time the expiry notification arrives (expired keys are unreadable).
//! Splitting them lets the TTL fire while the payload is still readable.
//!
//! ## Commit-then-delete
//!
//! The committer writes to Postgres first and deletes the staged copy only
//! after success. A failure or crash in between leaves the code staged, so
//! the worst case is a duplicate upsert, never a lost save.
//!
//! ## Missed notifications
//!
//! Pub/sub does not replay. Expiries published while the subscriber is
//! reconnecting are lost, so the subscription is supervised with backoff and
//! a periodic sweep commits any staged code whose debounce key has already
//! expired. Eventual persistence holds even across Redis restarts.
//!
//!
//!
//! # Configuration
//!
//! Environment-driven, read once at startup into [`config::Config`]. See
//! that module for the recognized variables and defaults. `RUST_LOG`
//! controls log filtering as usual.
use std::sync::Arc;

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod committer;
pub mod config;
pub mod database;
pub mod error;
pub mod keys;
pub mod listener;
pub mod repository;
pub mod service;
pub mod staging;
pub mod state;

use committer::Committer;
use listener::{ExpiryListener, Sweeper, enable_keyspace_events};
use repository::{CodeRepository, IdentityResolver, PgCodeRepository, PgIdentityResolver};
use staging::{RedisStagingStore, StagingStore};
use state::State;

pub async fn start() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = State::new().await;

    enable_keyspace_events(&state.redis_connection).await;

    let staging: Arc<dyn StagingStore> =
        Arc::new(RedisStagingStore::new(state.redis_connection.clone()));
    let codes: Arc<dyn CodeRepository> = Arc::new(PgCodeRepository::new(state.pg_pool.clone()));
    let identity: Arc<dyn IdentityResolver> =
        Arc::new(PgIdentityResolver::new(state.pg_pool.clone()));

    let committer = Arc::new(Committer::new(
        &state.config.code_save_prefix,
        staging.clone(),
        codes,
        identity,
    ));

    info!("Starting expiry listener...");
    let expiry_listener =
        ExpiryListener::new(state.redis_client.clone(), &state.config, committer.clone());
    tokio::spawn(expiry_listener.run());

    if state.config.sweep_interval_secs > 0 {
        let sweeper = Sweeper::new(&state.config, staging, committer);
        tokio::spawn(sweeper.run());
    }

    info!("Autosave service running");
    shutdown_signal().await;

    println!("Autosave service shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
