//! UTM gateway - main entry point.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use utm_gateway::api::auth::SessionStore;
use utm_gateway::api::{ApiState, UtmApi};
use utm_gateway::config::Config;
use utm_gateway::dispatch::DockerRunner;
use utm_gateway::store::{MemStore, Store, User};

#[derive(Parser, Debug)]
#[command(name = "utm-gateway")]
#[command(about = "REST gateway for running the UTM image-analysis algorithm in Docker")]
#[command(version)]
struct Args {
    /// Bind address (overrides UTM_BIND_ADDR).
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("utm_gateway=info,tower_http=warn"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr = args
        .bind
        .unwrap_or_else(|| config.server.bind_addr.clone());

    let store: Arc<dyn Store> = Arc::new(MemStore::new());
    let dispatcher = Arc::new(DockerRunner::new(config.runner.clone(), store.clone()));
    let sessions = SessionStore::new();

    // Bootstrap an administrator session so the tagging and run routes are
    // reachable on a fresh store.
    let admin = User {
        id: uuid::Uuid::new_v4(),
        login: "admin".to_string(),
        admin: true,
    };
    store.upsert_user(admin.clone()).await;
    let token = sessions.create_token(admin.id).await;
    // Printed in a machine-parseable form so scripts can pick it up.
    println!("UTM_ADMIN_TOKEN={}", token);

    tracing::info!(image = %config.runner.image, "Starting UTM gateway");

    let state = ApiState {
        store,
        dispatcher,
        sessions,
        image: config.runner.image.clone(),
    };
    UtmApi::start(state, &addr)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    Ok(())
}
