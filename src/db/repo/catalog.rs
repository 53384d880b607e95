//! Service catalog and distribution rule operations.

use crate::domain::{
    Decimal, DistributionRule, RuleId, RuleVariant, ServiceBv, ServiceId, ServiceStatus, TimeMs,
};
use crate::error::CoreError;
use crate::store::{RuleStore, ServiceCatalog};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use super::{decimal_column, Repository};

/// Newest activation wins; `is_active` is derived from it.
const RULE_SELECT: &str = r#"
    SELECT r.id, r.variant, r.base_percentage, r.decay_enabled, r.payout_per_bv,
           r.max_levels, r.created_at,
           COALESCE(r.id = (SELECT rule_id FROM rule_activations ORDER BY id DESC LIMIT 1), 0)
               AS is_active
    FROM distribution_rules r
"#;

fn decode_error(column: &str, message: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    }
}

fn rule_from_row(row: &SqliteRow) -> Result<DistributionRule, sqlx::Error> {
    let tag: String = row.try_get("variant")?;
    let variant = match tag.as_str() {
        "decaying" => RuleVariant::Decaying {
            base_percentage: decimal_column(row, "base_percentage")?,
            decay_enabled: row.try_get::<i64, _>("decay_enabled")? != 0,
        },
        "capped" => RuleVariant::Capped {
            payout_per_bv: decimal_column(row, "payout_per_bv")?,
            max_levels: row
                .try_get::<Option<i64>, _>("max_levels")?
                .map(|n| u32::try_from(n).map_err(|e| decode_error("max_levels", e.to_string())))
                .transpose()?,
        },
        other => return Err(decode_error("variant", format!("unknown rule variant {}", other))),
    };

    Ok(DistributionRule {
        id: Some(RuleId::new(row.try_get("id")?)),
        variant,
        is_active: row.try_get::<i64, _>("is_active")? != 0,
        created_at: Some(TimeMs::new(row.try_get("created_at")?)),
    })
}

async fn fetch_rule(
    conn: &mut SqliteConnection,
    id: RuleId,
) -> Result<Option<DistributionRule>, sqlx::Error> {
    let row = sqlx::query(&format!("{} WHERE r.id = ?", RULE_SELECT))
        .bind(id.as_i64())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(rule_from_row).transpose()
}

async fn insert_activation(conn: &mut SqliteConnection, id: RuleId) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO rule_activations (rule_id, activated_at) VALUES (?, ?)")
        .bind(id.as_i64())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[async_trait]
impl ServiceCatalog for SqliteConnection {
    async fn get_bv(&mut self, service: ServiceId) -> Result<Option<ServiceBv>, sqlx::Error> {
        let row = sqlx::query("SELECT bv, status FROM services WHERE id = ?")
            .bind(service.as_i64())
            .fetch_optional(&mut *self)
            .await?;

        row.map(|row| {
            let status: String = row.try_get("status")?;
            Ok(ServiceBv {
                bv: row.try_get("bv")?,
                status: status
                    .parse::<ServiceStatus>()
                    .map_err(|e| decode_error("status", e))?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl RuleStore for SqliteConnection {
    async fn active_rule(&mut self) -> Result<Option<DistributionRule>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "{} WHERE r.id = (SELECT rule_id FROM rule_activations ORDER BY id DESC LIMIT 1)",
            RULE_SELECT
        ))
        .fetch_optional(&mut *self)
        .await?;
        row.as_ref().map(rule_from_row).transpose()
    }
}

impl Repository {
    /// Register a service. The BV text is stored as given and validated when a
    /// purchase resolves it.
    pub async fn insert_service(
        &self,
        name: &str,
        bv: &str,
        status: ServiceStatus,
    ) -> Result<ServiceId, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO services (name, bv, status, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(bv)
        .bind(status.as_str())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(ServiceId::new(result.last_insert_rowid()))
    }

    /// Store a new rule version, optionally activating it in the same unit of work.
    pub async fn create_rule(
        &self,
        variant: RuleVariant,
        activate: bool,
    ) -> Result<DistributionRule, CoreError> {
        variant.validate().map_err(CoreError::Validation)?;

        self.unit_of_work(move |conn| {
            Box::pin(async move {
                let (base_percentage, decay_enabled, payout_per_bv, max_levels) = match variant {
                    RuleVariant::Decaying {
                        base_percentage,
                        decay_enabled,
                    } => (Some(base_percentage), Some(decay_enabled), None, None),
                    RuleVariant::Capped {
                        payout_per_bv,
                        max_levels,
                    } => (None, None, Some(payout_per_bv), max_levels),
                };

                let result = sqlx::query(
                    r#"
                    INSERT INTO distribution_rules (
                        variant, base_percentage, decay_enabled, payout_per_bv, max_levels, created_at
                    ) VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(variant.tag())
                .bind(base_percentage.map(|d: Decimal| d.to_canonical_string()))
                .bind(decay_enabled.map(i64::from))
                .bind(payout_per_bv.map(|d: Decimal| d.to_canonical_string()))
                .bind(max_levels.map(i64::from))
                .bind(chrono::Utc::now().timestamp_millis())
                .execute(&mut *conn)
                .await?;
                let id = RuleId::new(result.last_insert_rowid());

                if activate {
                    insert_activation(conn, id).await?;
                }

                fetch_rule(conn, id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("rule {}", id)))
            })
        })
        .await
    }

    /// Make `id` the active rule. Earlier rules stay stored unchanged.
    pub async fn activate_rule(&self, id: RuleId) -> Result<DistributionRule, CoreError> {
        self.unit_of_work(move |conn| {
            Box::pin(async move {
                if fetch_rule(conn, id).await?.is_none() {
                    return Err(CoreError::NotFound(format!("rule {}", id)));
                }
                insert_activation(conn, id).await?;
                fetch_rule(conn, id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("rule {}", id)))
            })
        })
        .await
    }

    pub async fn get_rule(&self, id: RuleId) -> Result<Option<DistributionRule>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_rule(&mut conn, id).await
    }

    pub async fn active_rule(&self) -> Result<Option<DistributionRule>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        conn.active_rule().await
    }
}
