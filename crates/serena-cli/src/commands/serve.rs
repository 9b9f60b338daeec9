// `serena serve`: run the HTTP API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use colored::Colorize;
use serena_axum::{JwtAuthenticator, Serena};
use serena_billing::{BillingService, StripeClient};
use serena_core::{SerenaOptions, SubscriptionStore};
use serena_memory::MemoryStore;
use serena_sqlx::SqlxStore;
use tracing::{info, warn};

#[derive(Args)]
pub struct ServeArgs {
    /// Path to a `serena.toml`. Without it, configuration comes from the environment.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address, e.g. `127.0.0.1:8080`
    #[arg(long)]
    bind: Option<String>,

    /// Route prefix
    #[arg(long, default_value = Serena::DEFAULT_BASE_PATH)]
    base_path: String,
}

pub fn run(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    serena_core::env::init_logger();
    let options = super::load_options(args.config.as_deref())?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(options, args.bind, args.base_path))
}

async fn open_store(database_url: Option<&str>) -> Result<Arc<dyn SubscriptionStore>, Box<dyn std::error::Error>> {
    match database_url {
        Some(url) => {
            let store = SqlxStore::connect_and_migrate(url).await?;
            info!(kind = ?store.kind(), "database store ready");
            let store: Arc<dyn SubscriptionStore> = Arc::new(store);
            Ok(store)
        }
        None => {
            warn!("no database configured, records live in memory and are lost on exit");
            let store: Arc<dyn SubscriptionStore> = Arc::new(MemoryStore::new());
            Ok(store)
        }
    }
}

async fn serve(
    options: SerenaOptions,
    bind: Option<String>,
    base_path: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(options.server.database_url.as_deref()).await?;
    let provider = Arc::new(StripeClient::new(&options.billing));
    let billing = BillingService::new(options.billing.clone(), store, provider);
    let authenticator = Arc::new(JwtAuthenticator::new(&options.server.jwt_secret));

    let app = Serena::new(billing, authenticator)
        .with_base_path(base_path.clone())
        .router_with_cors();

    let addr = bind.unwrap_or(options.server.bind_addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!(
        "{} listening on {}{}",
        "●".green(),
        addr.bold(),
        base_path.dimmed()
    );
    info!(addr = %addr, base_path = %base_path, "server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
