//! SMS Ledger - entry point
//!
//! ```text
//! sms_ledger [--env dev] [--port N] [--gateway]      HTTP API + workers (default)
//! sms_ledger [--env dev] --reconcile [--apply]       phantom frozen report / fix
//! sms_ledger [--env dev] --migrate                   apply migrations and exit
//! ```

use anyhow::{Context, Result, bail};
use std::sync::Arc;

use sms_ledger::account::UserRepository;
use sms_ledger::config::AppConfig;
use sms_ledger::db::Database;
use sms_ledger::gateway::{self, AppState, auth::TokenVerifier};
use sms_ledger::ledger::PgLedger;
use sms_ledger::payments::PaymentService;
use sms_ledger::providers::ProviderRegistry;
use sms_ledger::purchase::{CoordinatorSettings, PriceBook, PurchaseCoordinator, PurchaseDb};
use sms_ledger::reconcile::Reconciler;

// ============================================================
// COMMAND LINE
// ============================================================

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

fn has_flag(flag: &str) -> bool {
    std::env::args().any(|a| a == flag)
}

// ============================================================
// MODES
// ============================================================

async fn connect(config: &AppConfig) -> Result<Database> {
    let url = config
        .database_url()
        .context("No PostgreSQL URL: set DATABASE_URL or postgres_url")?;
    Database::connect(&url, config.postgres_pool_size)
        .await
        .context("Failed to connect to PostgreSQL")
}

async fn run_migrate(config: &AppConfig) -> Result<()> {
    let db = connect(config).await?;
    db.migrate().await.context("Migration failed")?;
    Ok(())
}

async fn run_reconcile(config: &AppConfig, apply: bool) -> Result<()> {
    let db = connect(config).await?;
    let reconciler = Reconciler::new(db.pool().clone());

    let report = if apply {
        reconciler.run().await?
    } else {
        reconciler.scan().await?
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !apply && (report.drifted > 0 || report.stranded > 0) {
        tracing::warn!(
            drifted = report.drifted,
            stranded = report.stranded,
            "Drift found; rerun with --apply to correct it"
        );
    }
    Ok(())
}

async fn run_gateway(mut config: AppConfig) -> Result<()> {
    if let Some(port) = get_port_override() {
        config.gateway.port = port;
    }
    let Some(jwt_secret) = config.jwt_secret() else {
        bail!("No JWT secret: set JWT_SECRET or jwt_secret");
    };

    let db = connect(&config).await?;
    db.migrate().await.context("Migration failed")?;
    let pool = db.pool().clone();

    let providers =
        ProviderRegistry::from_config(&config.providers).context("Invalid provider settings")?;

    let ledger = Arc::new(PgLedger::new(pool.clone()));
    let coordinator = Arc::new(PurchaseCoordinator::new(
        Arc::new(PurchaseDb::new(pool.clone())),
        ledger.clone(),
        providers,
        PriceBook::new(&config.pricing, &config.ledger),
        CoordinatorSettings::from_config(&config.workers),
    ));
    let payments = PaymentService::from_config(
        ledger.clone(),
        Arc::new(UserRepository::new(pool)),
        &config.payments,
        config.ledger.decimals,
    )
    .context("Invalid payment settings")?;

    let state = AppState::new(
        coordinator,
        ledger,
        Arc::new(payments),
        Arc::new(TokenVerifier::new(&jwt_secret)),
        config.ledger.decimals,
    )
    .with_database(db);

    gateway::spawn_workers(&state, &config.workers);
    gateway::run_server(&config.gateway, Arc::new(state))
        .await
        .context("Gateway stopped")
}

// ============================================================
// MAIN
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _log_guard = sms_ledger::logging::init_logging(&config);

    tracing::info!(
        env = %env,
        version = env!("GIT_HASH"),
        currency = %config.ledger.currency,
        "Starting SMS Ledger"
    );

    if has_flag("--migrate") {
        return run_migrate(&config).await;
    }
    if has_flag("--reconcile") {
        return run_reconcile(&config, has_flag("--apply")).await;
    }
    run_gateway(config).await
}
