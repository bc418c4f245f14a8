use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::call_context;
use crate::domain::{CanonicalStatus, TransactionKind, TransactionResult};
use crate::error::AppError;
use crate::services::{InitiateRequest, PaymentOptions};
use crate::AppState;

const DEFAULT_PAGE_LIMIT: i64 = 100;

/// Body the hosted card form posts after tokenizing a card.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessNonceRequest {
    pub kb_account_id: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    pub nonce: String,
    #[serde(default)]
    pub return_url: Option<String>,
    #[serde(default)]
    pub cancel_url: Option<String>,
    #[serde(default, rename = "force3ds")]
    pub force_3ds: Option<bool>,
}

impl ProcessNonceRequest {
    fn kind(&self) -> TransactionKind {
        match self.payment_intent.as_deref() {
            Some(intent) if intent.eq_ignore_ascii_case("sale") => TransactionKind::Purchase,
            _ => TransactionKind::Authorize,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProcessNonceResponse {
    pub success: bool,
    pub kb_payment_id: Uuid,
    pub kb_transaction_id: Uuid,
    pub transaction_type: TransactionKind,
    pub status: CanonicalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ompay_transaction_id: Option<String>,
    pub requires_3ds: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl From<TransactionResult> for ProcessNonceResponse {
    fn from(result: TransactionResult) -> Self {
        let redirect_url = result.three_ds_url().map(str::to_string);
        let requires_3ds = result.status == CanonicalStatus::Pending && redirect_url.is_some();
        let success = matches!(
            result.status,
            CanonicalStatus::Processed | CanonicalStatus::Pending
        );
        ProcessNonceResponse {
            success,
            kb_payment_id: result.payment_id,
            kb_transaction_id: result.transaction_id,
            transaction_type: result.kind,
            status: result.status,
            ompay_transaction_id: result.first_reference_id,
            requires_3ds,
            redirect_url,
            error_message: if success { None } else { result.gateway_error },
            error_code: if success { None } else { result.gateway_error_code },
        }
    }
}

pub async fn process_nonce(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ProcessNonceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = call_context(&state, &headers)?;
    if payload.nonce.trim().is_empty() {
        return Err(AppError::BadRequest("nonce is required".to_string()));
    }

    let kind = payload.kind();
    let request = InitiateRequest {
        kind,
        account_id: payload.kb_account_id,
        payment_id: Uuid::new_v4(),
        transaction_id: Uuid::new_v4(),
        payment_method_id: None,
        amount: payload.amount,
        currency: payload.currency,
        nonce: Some(payload.nonce),
        options: PaymentOptions {
            return_url: payload.return_url,
            cancel_url: payload.cancel_url,
            force_3ds: payload.force_3ds.unwrap_or(false),
            ..PaymentOptions::default()
        },
    };

    tracing::info!(
        "Processing nonce for account {} as {}",
        request.account_id,
        kind
    );
    let result = state.orchestrator.initiate(&ctx, request).await?;
    Ok(Json(ProcessNonceResponse::from(result)))
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub refresh: bool,
}

pub async fn get_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(payment_id): Path<Uuid>,
    Query(query): Query<RefreshQuery>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = call_context(&state, &headers)?;
    let results = state
        .orchestrator
        .get_payment_info(&ctx, payment_id, query.refresh)
        .await?;
    if results.is_empty() {
        return Err(AppError::NotFound(format!("Payment {} not found", payment_id)));
    }
    Ok(Json(results))
}

pub async fn refresh_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = call_context(&state, &headers)?;
    let report = state.orchestrator.refresh_pending(&ctx, payment_id).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub key: String,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn search_payments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = call_context(&state, &headers)?;
    let offset = query.offset.unwrap_or(0).max(0);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, 1000);
    let page = state
        .orchestrator
        .search_payments(&ctx, &query.key, offset, limit)
        .await?;
    Ok(Json(page))
}
