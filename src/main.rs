use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use teloxide::{dptree, prelude::*};
use tokio::sync::broadcast;
use tracing::{info, warn};

mod autodelete;
mod chart;
mod config;
mod handlers;
mod stats;
mod store;

use crate::handlers::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path =
        config::parse_config_arg(&args).unwrap_or_else(|| PathBuf::from("config.yaml"));

    let cfg = config::load_config(&config_path)?;
    config::validate_config(&cfg)?;

    let filter = cfg.bot.log_level.clone().unwrap_or_else(|| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let data_dir = cfg
        .runtime
        .data_dir
        .clone()
        .unwrap_or_else(|| "./data".to_string());

    let store = store::Store::new(&data_dir);
    if let Err(e) = store.restore() {
        warn!("state restore failed (starting fresh): {e:?}");
    }
    let seeded = store.seed_users(&cfg.members);
    if seeded > 0 {
        info!("seeded {seeded} new member(s) from config");
    }
    store.persist()?;

    let bot = Bot::new(cfg.bot.token.clone());
    let state = Arc::new(AppState::new(&cfg, store));

    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let h_autodelete = tokio::spawn(autodelete::autodelete_task(
        bot.clone(),
        state.clone(),
        shutdown_tx.subscribe(),
    ));
    let h_prune = tokio::spawn(handlers::session_prune_task(
        state.clone(),
        shutdown_tx.subscribe(),
    ));

    info!(
        "start polling for group {} ({})",
        state.group_name, state.group_id
    );

    Dispatcher::builder(bot, handlers::schema())
        .dependencies(dptree::deps![state.clone()])
        .default_handler(|upd| async move {
            let _ = upd;
        })
        .error_handler(LoggingErrorHandler::with_custom_text("Dispatcher error"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    let _ = shutdown_tx.send(());
    let _ = h_autodelete.await;
    let _ = h_prune.await;

    Ok(())
}
