//! Host platform client over its REST API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::config::HostConfig;
use crate::domain::{CallContext, TransactionResult, ValueExt};
use crate::ports::{HostAccount, HostError, HostPlatform};

const CREATED_BY: &str = "ompay-connector";
pub const PLUGIN_NAME: &str = "ompay-connector";

#[derive(Clone)]
pub struct HttpHostPlatform {
    client: Client,
    config: HostConfig,
}

impl HttpHostPlatform {
    pub fn new(config: HostConfig) -> Result<Self, HostError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/1.0/kb{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: RequestBuilder, ctx: &CallContext) -> RequestBuilder {
        let mut request = request
            .header("Accept", "application/json")
            .header("X-Killbill-CreatedBy", CREATED_BY)
            .header("X-Tenant-Id", ctx.tenant_id.to_string());
        if let Some(key) = &self.config.api_key {
            request = request.header("X-Killbill-ApiKey", key);
        }
        if let Some(secret) = &self.config.api_secret {
            request = request.header("X-Killbill-ApiSecret", secret);
        }
        if let Some(user) = &self.config.username {
            request = request.basic_auth(user, self.config.password.as_ref());
        }
        request
    }

    async fn ensure_success(response: Response) -> Result<Response, HostError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(HostError::Rejected { status, body })
    }
}

#[async_trait]
impl HostPlatform for HttpHostPlatform {
    async fn get_account(
        &self,
        ctx: &CallContext,
        account_id: Uuid,
    ) -> Result<HostAccount, HostError> {
        let request = self.client.get(self.url(&format!("/accounts/{}", account_id)));
        let response = self.authorized(request, ctx).send().await?;
        let body: Value = Self::ensure_success(response).await?.json().await?;

        let (first_name, last_name) = split_name(body.get_string("name"));
        Ok(HostAccount {
            account_id,
            email: body.get_string("email"),
            first_name,
            last_name,
            phone: body.get_string("phone"),
            address1: body.get_string("address1"),
            address2: body.get_string("address2"),
            city: body.get_string("city"),
            state: body.get_string("state"),
            postal_code: body.get_string("postalCode"),
            country: body.get_string("country"),
        })
    }

    async fn notify_pending_transaction_resolved(
        &self,
        ctx: &CallContext,
        account_id: Uuid,
        transaction: &TransactionResult,
        success: bool,
    ) -> Result<(), HostError> {
        let body = json!({
            "accountId": account_id,
            "paymentId": transaction.payment_id,
            "transactionId": transaction.transaction_id,
            "transactionType": transaction.kind,
            "status": if success { "SUCCESS" } else { "PAYMENT_FAILURE" },
            "gatewayErrorCode": transaction.gateway_error_code,
            "gatewayErrorMsg": transaction.gateway_error,
        });
        let request = self
            .client
            .post(self.url(&format!("/paymentTransactions/{}", transaction.transaction_id)))
            .json(&body);
        let response = self.authorized(request, ctx).send().await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn register_payment_method(
        &self,
        ctx: &CallContext,
        account_id: Uuid,
        gateway_card_id: &str,
        properties: &Value,
    ) -> Result<Uuid, HostError> {
        let body = json!({
            "accountId": account_id,
            "externalKey": gateway_card_id,
            "pluginName": PLUGIN_NAME,
            "pluginInfo": {
                "externalPaymentMethodId": gateway_card_id,
                "properties": properties,
            },
        });
        let request = self
            .client
            .post(self.url(&format!("/accounts/{}/paymentMethods", account_id)))
            .json(&body);
        let response = Self::ensure_success(self.authorized(request, ctx).send().await?).await?;

        let from_location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|loc| loc.trim_end_matches('/').rsplit('/').next())
            .and_then(|id| Uuid::parse_str(id).ok());
        if let Some(id) = from_location {
            return Ok(id);
        }

        let body: Value = response.json().await?;
        body.get_string("paymentMethodId")
            .and_then(|id| Uuid::parse_str(&id).ok())
            .ok_or_else(|| HostError::InvalidResponse("missing paymentMethodId".to_string()))
    }
}

fn split_name(name: Option<String>) -> (Option<String>, Option<String>) {
    match name {
        Some(full) => {
            let mut parts = full.trim().splitn(2, ' ');
            let first = parts.next().map(str::to_string).filter(|s| !s.is_empty());
            let last = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
            (first, last)
        }
        None => (None, None),
    }
}
