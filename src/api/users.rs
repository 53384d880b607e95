use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::domain::{Assignment, Decimal, Node, ReferralCode, TreeNode, UserId};
use crate::error::AppError;
use crate::orchestration::{Joined, Registration};

const DEFAULT_TREE_DEPTH: u32 = 3;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub name: String,
    pub email: String,
    pub sponsor_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignParentRequest {
    pub referral_code: String,
}

#[derive(Debug, Deserialize)]
pub struct TreeQuery {
    pub depth: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub referral_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
}

impl From<Node> for UserDto {
    fn from(node: Node) -> Self {
        Self {
            id: node.id.as_i64(),
            name: node.name,
            email: node.email,
            referral_code: node.referral_code.0,
            parent_id: node.parent_id.map(|p| p.as_i64()),
            position: node.position.map(|p| p.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeResponse {
    pub user_id: i64,
    pub total: String,
    pub entry_count: usize,
    pub entries: Vec<IncomeDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeDto {
    pub from_user: i64,
    pub level: u32,
    pub bv: String,
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_id: Option<i64>,
}

pub async fn join(
    State(state): State<AppState>,
    Json(body): Json<JoinRequest>,
) -> Result<(StatusCode, Json<Joined>), AppError> {
    let joined = state
        .membership
        .join(Registration {
            name: body.name,
            email: body.email,
            sponsor_code: body.sponsor_code.map(ReferralCode::new),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(joined)))
}

pub async fn get_user(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<UserDto>, AppError> {
    let node = state.membership.profile(UserId::new(id)).await?;
    Ok(Json(node.into()))
}

pub async fn assign_parent(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(body): Json<AssignParentRequest>,
) -> Result<Json<Assignment>, AppError> {
    let code = body.referral_code.trim();
    if code.is_empty() {
        return Err(AppError::BadRequest("referralCode must not be empty".into()));
    }

    let assignment = state
        .membership
        .assign_parent(UserId::new(id), ReferralCode::new(code.to_string()))
        .await?;
    Ok(Json(assignment))
}

pub async fn get_tree(
    Path(id): Path<i64>,
    Query(params): Query<TreeQuery>,
    State(state): State<AppState>,
) -> Result<Json<TreeNode>, AppError> {
    let depth = params.depth.unwrap_or(DEFAULT_TREE_DEPTH);
    let tree = state.membership.tree(UserId::new(id), depth).await?;
    Ok(Json(tree))
}

pub async fn get_income(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<IncomeResponse>, AppError> {
    let user = state.membership.profile(UserId::new(id)).await?;
    let entries = state.repo.income_for_user(user.id).await?;

    let total = Decimal::checked_sum(entries.iter().map(|e| e.amount)).ok_or_else(|| {
        AppError::Unprocessable(format!(
            "income total for user {} exceeds the decimal range",
            user.id
        ))
    })?;
    let entries: Vec<IncomeDto> = entries
        .into_iter()
        .map(|e| IncomeDto {
            from_user: e.from_user.as_i64(),
            level: e.level,
            bv: e.bv.to_canonical_string(),
            amount: e.amount.to_canonical_string(),
            purchase_id: e.purchase_id.map(|p| p.as_i64()),
        })
        .collect();

    Ok(Json(IncomeResponse {
        user_id: user.id.as_i64(),
        total: total.to_canonical_string(),
        entry_count: entries.len(),
        entries,
    }))
}
