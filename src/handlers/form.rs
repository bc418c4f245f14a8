use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::call_context;
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormQuery {
    pub kb_account_id: Uuid,
}

/// Client token and callback URL for rendering the hosted card form.
pub async fn form_descriptor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FormQuery>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = call_context(&state, &headers)?;
    let descriptor = state
        .orchestrator
        .build_form_descriptor(&ctx, query.kb_account_id)
        .await?;
    Ok(Json(descriptor))
}
