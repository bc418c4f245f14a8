use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

pub const SANDBOX_BASE_URL: &str = "https://api.sandbox.ompay.com/v1/merchants";
pub const LIVE_BASE_URL: &str = "https://api.ompay.com/v1/merchants";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub gateway: GatewayConfig,
    pub host: HostConfig,
    pub default_tenant_id: Option<Uuid>,
    pub log_format: LogFormat,
}

/// Gateway credentials and endpoints. The Basic auth header is computed once.
#[derive(Clone)]
pub struct GatewayConfig {
    pub merchant_id: Option<String>,
    pub client_id: Option<String>,
    pub test_mode: bool,
    pub api_base_url: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub webhook_secret: Option<String>,
    auth_header: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let storage = match var("STORAGE").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("postgres") => StorageBackend::Postgres,
            Some("memory") => StorageBackend::Memory,
            Some(other) => anyhow::bail!("STORAGE must be 'postgres' or 'memory', got '{}'", other),
        };

        let database_url = var("DATABASE_URL");
        if storage == StorageBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required unless STORAGE=memory");
        }

        let test_mode = match var("OMPAY_TEST_MODE") {
            Some(v) => parse_bool(&v).context("OMPAY_TEST_MODE must be a boolean")?,
            None => true,
        };

        let gateway = GatewayConfig::new(
            var("OMPAY_MERCHANT_ID"),
            var("OMPAY_CLIENT_ID"),
            var("OMPAY_CLIENT_SECRET"),
            test_mode,
            var("OMPAY_API_BASE_URL"),
        )
        .with_timeouts(
            Duration::from_millis(
                parse_or(var("OMPAY_CONNECT_TIMEOUT_MS"), 10_000)
                    .context("OMPAY_CONNECT_TIMEOUT_MS must be a number of milliseconds")?,
            ),
            Duration::from_millis(
                parse_or(var("OMPAY_READ_TIMEOUT_MS"), 30_000)
                    .context("OMPAY_READ_TIMEOUT_MS must be a number of milliseconds")?,
            ),
        )
        .with_webhook_secret(var("OMPAY_WEBHOOK_SECRET"));

        let default_tenant_id = var("DEFAULT_TENANT_ID")
            .map(|raw| Uuid::parse_str(raw.trim()))
            .transpose()
            .context("DEFAULT_TENANT_ID must be a UUID")?;

        let log_format = match var("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Config {
            server_port: parse_or(var("SERVER_PORT"), 3000)
                .context("SERVER_PORT must be a port number")?,
            storage,
            database_url,
            gateway,
            host: HostConfig {
                base_url: var("HOST_BASE_URL")
                    .unwrap_or_else(|| "http://127.0.0.1:8080".to_string()),
                api_key: var("HOST_API_KEY"),
                api_secret: var("HOST_API_SECRET"),
                username: var("HOST_USERNAME"),
                password: var("HOST_PASSWORD"),
            },
            default_tenant_id,
            log_format,
        })
    }

    /// Checks that every configured URL parses.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.gateway.api_base_url)
            .with_context(|| format!("invalid OMPAY_API_BASE_URL: {}", self.gateway.api_base_url))?;
        Url::parse(&self.host.base_url)
            .with_context(|| format!("invalid HOST_BASE_URL: {}", self.host.base_url))?;
        if let Some(db) = &self.database_url {
            Url::parse(db).context("invalid DATABASE_URL")?;
        }
        Ok(())
    }
}

impl GatewayConfig {
    pub fn new(
        merchant_id: Option<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
        test_mode: bool,
        api_base_url: Option<String>,
    ) -> Self {
        let auth_header = match (&client_id, &client_secret) {
            (Some(id), Some(secret)) => {
                Some(format!("Basic {}", BASE64.encode(format!("{}:{}", id, secret))))
            }
            _ => None,
        };
        let api_base_url = api_base_url.unwrap_or_else(|| {
            if test_mode {
                SANDBOX_BASE_URL.to_string()
            } else {
                LIVE_BASE_URL.to_string()
            }
        });

        GatewayConfig {
            merchant_id,
            client_id,
            test_mode,
            api_base_url,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            webhook_secret: None,
            auth_header,
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn with_webhook_secret(mut self, secret: Option<String>) -> Self {
        self.webhook_secret = secret;
        self
    }

    pub fn auth_header(&self) -> Option<&str> {
        self.auth_header.as_deref()
    }

    /// Base URL scoped to the configured merchant.
    pub fn merchant_base_url(&self) -> String {
        let base = self.api_base_url.trim_end_matches('/');
        match &self.merchant_id {
            Some(merchant) => format!("{}/{}", base, merchant),
            None => base.to_string(),
        }
    }

    /// Everything a gateway call needs is present.
    pub fn is_complete(&self) -> bool {
        self.merchant_id.is_some() && !self.api_base_url.is_empty() && self.auth_header.is_some()
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("merchant_id", &self.merchant_id)
            .field("client_id", &self.client_id)
            .field("test_mode", &self.test_mode)
            .field("api_base_url", &self.api_base_url)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "****"))
            .field("auth_header", &self.auth_header.as_ref().map(|_| "****"))
            .finish()
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => anyhow::bail!("not a boolean: {}", other),
    }
}

fn parse_or<T>(raw: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => Ok(v.trim().parse()?),
        None => Ok(default),
    }
}
