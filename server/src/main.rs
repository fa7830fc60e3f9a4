use std::path::PathBuf;

use anyhow::{Context, Result};
use sidebet_server::config::ServerConfig;
use sidebet_server::connection_manager::handle_listen_server;
use sidebet_server::database::DatabaseConnection;
use sidebet_server::ledger::RecordBacklog;
use sidebet_server::reconciler::RecordReconciler;
use sidebet_server::store::UserDirectory;
use tokio::join;
use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = ServerConfig::load(config_path.as_deref())?;
    init_tracing(&config.log_level);

    let database = DatabaseConnection::connect(&config.database).await?;
    info!(address = %config.database.address, "database connected");

    let seeding = database.session(None);
    for user in &config.seed_users {
        // do not care about failure, as the user could already have been created
        if let Err(error) = seeding.register_user(&user.id, &user.display_name).await {
            debug!(user_id = %user.id, "seed user skipped: {:#}", error);
        }
    }

    let backlog = RecordBacklog::default();
    let reconciler = RecordReconciler::new(
        database.session(None),
        backlog.clone(),
        config.reconcile_interval(),
    );
    let reconcile_task = tokio::spawn(async move {
        reconciler.manage().await;
    });

    let listener = TcpListener::bind(&config.listen_address)
        .await
        .with_context(|| format!("binding {}", config.listen_address))?;
    info!(address = %config.listen_address, "listening");

    let listen_server_task = tokio::spawn(async move {
        handle_listen_server(listener, database, backlog).await;
    });

    let (res1, res2) = join!(reconcile_task, listen_server_task);
    res1?;
    res2?;
    Ok(())
}
