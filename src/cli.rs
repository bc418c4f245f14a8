use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::CallContext;

#[derive(Parser)]
#[command(name = "ompay-connector")]
#[command(
    about = "OMPay gateway connector - payments, vaulting and reconciliation",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,

    /// Re-fetch pending transactions of a payment from the gateway
    Refresh {
        /// Tenant owning the payment (defaults to DEFAULT_TENANT_ID)
        #[arg(long)]
        tenant: Option<Uuid>,

        /// Payment UUID
        #[arg(long, value_name = "PAYMENT_ID")]
        payment: Uuid,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");
    Ok(())
}

pub async fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Storage: {:?}", config.storage);
    println!(
        "  Database URL: {}",
        config
            .database_url
            .as_deref()
            .map(mask_password)
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  OMPay API URL: {}", config.gateway.api_base_url);
    println!(
        "  OMPay Merchant: {}",
        config.gateway.merchant_id.as_deref().unwrap_or("-")
    );
    println!("  OMPay Test Mode: {}", config.gateway.test_mode);
    println!(
        "  Webhook Signatures: {}",
        if config.gateway.webhook_secret.is_some() { "enabled" } else { "disabled" }
    );
    println!("  Host URL: {}", config.host.base_url);

    let report = crate::startup::validate_environment(config).await;
    report.print();
    if !report.is_valid() {
        anyhow::bail!("Configuration is invalid");
    }

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");
    Ok(())
}

pub async fn handle_refresh(
    config: &Config,
    tenant: Option<Uuid>,
    payment_id: Uuid,
) -> anyhow::Result<()> {
    let tenant_id = match tenant.or(config.default_tenant_id) {
        Some(tenant_id) => tenant_id,
        None => anyhow::bail!("--tenant is required when DEFAULT_TENANT_ID is not set"),
    };

    let state = crate::startup::build_state(config).await?;
    let ctx = CallContext::new(tenant_id);
    let report = state.orchestrator.refresh_pending(&ctx, payment_id).await?;

    println!(
        "✓ Payment {}: {} pending examined, {} updated, {} unchanged, {} host notifications",
        payment_id,
        report.examined,
        report.updated.len(),
        report.unchanged,
        report.notified
    );
    for failure in &report.failures {
        println!("  ❌ {}: {}", failure.transaction_id, failure.error);
    }
    if !report.failures.is_empty() {
        anyhow::bail!("{} transaction(s) could not be refreshed", report.failures.len());
    }
    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
