use anyhow::{Context, Result};
use std::sync::Arc;

use crate::adapters::{
    HttpHostPlatform, InMemoryLedger, InMemoryVault, PostgresLedger, PostgresVault,
};
use crate::config::{Config, StorageBackend};
use crate::gateway::GatewayClient;
use crate::ports::{PaymentMethodStore, TransactionLedger};
use crate::services::{OrchestratorSettings, PaymentOrchestrator};
use crate::AppState;

/// Wires stores, gateway client and host platform from configuration.
/// With Postgres storage the pool is created and migrated first.
pub async fn build_state(config: &Config) -> Result<AppState> {
    let (db, ledger, vault) = match config.storage {
        StorageBackend::Postgres => {
            let pool = crate::db::create_pool(config).await?;
            crate::db::run_migrations(&pool).await?;
            let ledger: Arc<dyn TransactionLedger> = Arc::new(PostgresLedger::new(pool.clone()));
            let vault: Arc<dyn PaymentMethodStore> = Arc::new(PostgresVault::new(pool.clone()));
            (Some(pool), ledger, vault)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; ledger and vault are lost on restart");
            let ledger: Arc<dyn TransactionLedger> = Arc::new(InMemoryLedger::new());
            let vault: Arc<dyn PaymentMethodStore> = Arc::new(InMemoryVault::new());
            (None, ledger, vault)
        }
    };

    if !config.gateway.is_complete() {
        tracing::warn!("OMPay credentials are incomplete; gateway calls will be rejected");
    }
    let gateway = GatewayClient::new(&config.gateway).context("failed to build gateway client")?;
    tracing::info!("OMPay client initialized with URL: {}", gateway.base_url());

    let host = HttpHostPlatform::new(config.host.clone()).context("failed to build host client")?;

    let orchestrator = PaymentOrchestrator::new(
        gateway,
        ledger,
        vault,
        Arc::new(host),
        OrchestratorSettings {
            host_base_url: config.host.base_url.clone(),
            is_sandbox: config.gateway.test_mode,
        },
    );

    Ok(AppState {
        orchestrator: Arc::new(orchestrator),
        db,
        gateway_config: config.gateway.clone(),
        default_tenant_id: config.default_tenant_id,
    })
}

pub struct ValidationReport {
    pub environment: bool,
    pub gateway: bool,
    pub database: Option<bool>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.gateway && self.database.unwrap_or(true)
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Gateway Credentials:   {}", status(self.gateway));
        match self.database {
            Some(ok) => println!("Database Connectivity: {}", status(ok)),
            None => println!("Database Connectivity: - (in-memory storage)"),
        }

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(config: &Config) -> ValidationReport {
    let mut report = ValidationReport {
        environment: true,
        gateway: config.gateway.is_complete(),
        database: None,
        errors: Vec::new(),
    };

    if let Err(e) = config.validate() {
        report.environment = false;
        report.errors.push(format!("Environment: {:#}", e));
    }
    if !report.gateway {
        report.errors.push(
            "Gateway: OMPAY_MERCHANT_ID, OMPAY_CLIENT_ID and OMPAY_CLIENT_SECRET are required"
                .to_string(),
        );
    }

    if config.storage == StorageBackend::Postgres {
        match check_database(config).await {
            Ok(()) => report.database = Some(true),
            Err(e) => {
                report.database = Some(false);
                report.errors.push(format!("Database: {}", e));
            }
        }
    }

    report
}

async fn check_database(config: &Config) -> Result<()> {
    let pool = crate::db::create_pool(config).await?;
    sqlx::query("SELECT 1").execute(&pool).await?;
    Ok(())
}
