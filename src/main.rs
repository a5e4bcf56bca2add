mod args;
mod client;
mod config;
mod dota2;
mod engine;
mod scheduler;
mod sink;
mod store;

use anyhow::Context;
use args::Args;
use clap::Parser;
use client::Client;
use config::Config;
use engine::{Engine, NetworkBackoff};
use sink::LogSink;
use store::FileCursorStore;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;
    if let Some(state_file) = args.state_file {
        config.state_file = state_file;
    }
    if let Some(proxy) = args.proxy {
        config.proxy = Some(proxy);
    }

    let client = Client::new(&config)?;
    let store = FileCursorStore::new(&config.state_file);
    let account_id = config.account_id();
    log::info!(
        "watching account {}, cursor kept in {}",
        account_id,
        store.path().display()
    );

    let mut engine = Engine::new(client, store, LogSink::new(account_id), account_id);
    if config.network_backoff {
        engine = engine.with_backoff(NetworkBackoff::new(config.interval()));
    }

    let (shutdown, stopped) = watch::channel(false);
    let worker = tokio::spawn(scheduler::run(config.interval(), engine, stopped));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    log::info!("ctrl-c received, shutting down");
    shutdown.send(true)?;
    worker.await?;

    Ok(())
}
