use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::domain::{LedgerEntry, PurchaseId, PurchaseReceipt, ServiceId, UserId};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub user_id: i64,
    pub service_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub id: i64,
    pub user_id: i64,
    pub service_id: i64,
    pub bv: String,
    pub created_at: i64,
    pub incomes: Vec<EntryDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionResponse {
    pub bv: String,
    pub logs_created: usize,
    pub levels_paid: usize,
    pub entries: Vec<EntryDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDto {
    pub to_user: i64,
    pub level: u32,
    pub amount: String,
}

impl From<&LedgerEntry> for EntryDto {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            to_user: entry.to_user.as_i64(),
            level: entry.level,
            amount: entry.amount.to_canonical_string(),
        }
    }
}

pub async fn create_purchase(
    State(state): State<AppState>,
    Json(body): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<PurchaseReceipt>), AppError> {
    let receipt = state
        .purchases
        .purchase(UserId::new(body.user_id), ServiceId::new(body.service_id))
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn get_purchase(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<PurchaseResponse>, AppError> {
    let id = PurchaseId::new(id);
    let purchase = state
        .repo
        .get_purchase(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("purchase {}", id)))?;
    let incomes = state.repo.purchase_incomes(id).await?;

    Ok(Json(PurchaseResponse {
        id: purchase.id.as_i64(),
        user_id: purchase.user_id.as_i64(),
        service_id: purchase.service_id.as_i64(),
        bv: purchase.bv.to_canonical_string(),
        created_at: purchase.created_at.as_i64(),
        incomes: incomes.iter().map(EntryDto::from).collect(),
    }))
}

/// Audit-only distribution: ledger rows without a purchase.
pub async fn distribute(
    State(state): State<AppState>,
    Json(body): Json<PurchaseRequest>,
) -> Result<Json<DistributionResponse>, AppError> {
    let distribution = state
        .purchases
        .distribute_audit(UserId::new(body.user_id), ServiceId::new(body.service_id))
        .await?;

    Ok(Json(DistributionResponse {
        bv: distribution.bv.to_canonical_string(),
        logs_created: distribution.logs_created,
        levels_paid: distribution.levels_paid,
        entries: distribution.entries.iter().map(EntryDto::from).collect(),
    }))
}
