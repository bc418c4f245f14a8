use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::call_context;
use super::payments::RefreshQuery;
use crate::domain::{CallContext, CardMetadata};
use crate::error::AppError;
use crate::services::AddPaymentMethod;
use crate::AppState;

pub async fn list_payment_methods(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(account_id): Path<Uuid>,
    Query(query): Query<RefreshQuery>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = call_context(&state, &headers)?;
    let methods = state
        .orchestrator
        .list_payment_methods(&ctx, account_id, query.refresh)
        .await?;
    Ok(Json(methods))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPaymentMethodRequest {
    #[serde(default)]
    pub payment_method_id: Option<Uuid>,
    pub gateway_card_id: String,
    pub gateway_payer_id: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub metadata: CardMetadata,
}

pub async fn add_payment_method(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(account_id): Path<Uuid>,
    Json(payload): Json<AddPaymentMethodRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = call_context(&state, &headers)?;
    let record = state
        .orchestrator
        .add_payment_method(
            &ctx,
            AddPaymentMethod {
                account_id,
                payment_method_id: payload.payment_method_id.unwrap_or_else(Uuid::new_v4),
                gateway_card_id: payload.gateway_card_id,
                gateway_payer_id: payload.gateway_payer_id,
                metadata: payload.metadata,
                set_default: payload.is_default,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn ensure_owned(
    state: &AppState,
    ctx: &CallContext,
    account_id: Uuid,
    payment_method_id: Uuid,
) -> Result<(), AppError> {
    match state
        .orchestrator
        .get_payment_method(ctx, payment_method_id)
        .await?
    {
        Some(method) if method.account_id == account_id => Ok(()),
        _ => Err(AppError::NotFound(format!(
            "Payment method {} not found for account {}",
            payment_method_id, account_id
        ))),
    }
}

pub async fn delete_payment_method(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((account_id, payment_method_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = call_context(&state, &headers)?;
    ensure_owned(&state, &ctx, account_id, payment_method_id).await?;
    state
        .orchestrator
        .delete_payment_method(&ctx, payment_method_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_default_payment_method(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((account_id, payment_method_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = call_context(&state, &headers)?;
    state
        .orchestrator
        .set_default_payment_method(&ctx, account_id, payment_method_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
