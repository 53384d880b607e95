use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::domain::{Decimal, DistributionRule, RuleId, RuleVariant};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuleRequest {
    pub variant: String,
    pub base_percentage: Option<String>,
    pub decay_enabled: Option<bool>,
    pub payout_per_bv: Option<String>,
    pub max_levels: Option<u32>,
    #[serde(default)]
    pub activate: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub variant: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_percentage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decay_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_per_bv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_levels: Option<u32>,
    pub is_active: bool,
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl From<DistributionRule> for RuleDto {
    fn from(rule: DistributionRule) -> Self {
        let mut dto = RuleDto {
            id: rule.id.map(|id| id.as_i64()),
            variant: rule.variant.tag().to_string(),
            base_percentage: None,
            decay_enabled: None,
            payout_per_bv: None,
            max_levels: None,
            is_active: rule.is_active,
            fallback: rule.is_fallback(),
            created_at: rule.created_at.map(|t| t.as_i64()),
        };
        match rule.variant {
            RuleVariant::Decaying {
                base_percentage,
                decay_enabled,
            } => {
                dto.base_percentage = Some(base_percentage.to_canonical_string());
                dto.decay_enabled = Some(decay_enabled);
            }
            RuleVariant::Capped {
                payout_per_bv,
                max_levels,
            } => {
                dto.payout_per_bv = Some(payout_per_bv.to_canonical_string());
                dto.max_levels = max_levels;
            }
        }
        dto
    }
}

fn parse_fraction(field: &str, value: Option<&str>) -> Result<Decimal, AppError> {
    let raw = value.ok_or_else(|| AppError::BadRequest(format!("{} is required", field)))?;
    Decimal::from_str_canonical(raw)
        .map_err(|_| AppError::BadRequest(format!("{} must be a decimal string", field)))
}

impl CreateRuleRequest {
    fn variant(&self) -> Result<RuleVariant, AppError> {
        match self.variant.as_str() {
            "decaying" => Ok(RuleVariant::Decaying {
                base_percentage: parse_fraction(
                    "basePercentage",
                    self.base_percentage.as_deref(),
                )?,
                decay_enabled: self.decay_enabled.unwrap_or(true),
            }),
            "capped" => Ok(RuleVariant::Capped {
                payout_per_bv: parse_fraction("payoutPerBv", self.payout_per_bv.as_deref())?,
                max_levels: self.max_levels,
            }),
            other => Err(AppError::BadRequest(format!(
                "variant must be decaying or capped, got {}",
                other
            ))),
        }
    }
}

pub async fn create_rule(
    State(state): State<AppState>,
    Json(body): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<RuleDto>), AppError> {
    let variant = body.variant()?;
    let rule = state.repo.create_rule(variant, body.activate).await?;
    Ok((StatusCode::CREATED, Json(rule.into())))
}

pub async fn activate_rule(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<RuleDto>, AppError> {
    let rule = state.repo.activate_rule(RuleId::new(id)).await?;
    Ok(Json(rule.into()))
}

/// The active rule, or the built-in fallback when none was ever activated.
pub async fn get_active_rule(State(state): State<AppState>) -> Result<Json<RuleDto>, AppError> {
    let rule = state
        .repo
        .active_rule()
        .await?
        .unwrap_or_else(DistributionRule::fallback);
    Ok(Json(rule.into()))
}
