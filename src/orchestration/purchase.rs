//! Recording a purchase and distributing its BV as one unit of work.

use crate::db::Repository;
use crate::domain::{Distribution, PurchaseId, PurchaseReceipt, ServiceId, UserId};
use crate::engine::IncomeDistributionEngine;
use crate::error::CoreError;
use crate::store::{GraphStore, LedgerStore, RuleStore, ServiceCatalog};
use std::sync::Arc;
use tracing::{info, warn};

/// Run one purchase against any store: validate, record, distribute, then freeze
/// the distributed BV on the purchase row.
pub async fn record_purchase<S>(
    store: &mut S,
    engine: &IncomeDistributionEngine,
    user: UserId,
    service: ServiceId,
) -> Result<(PurchaseId, Distribution), CoreError>
where
    S: GraphStore + LedgerStore + ServiceCatalog + RuleStore + ?Sized,
{
    if store.get(user).await?.is_none() {
        return Err(CoreError::NotFound(format!("user {}", user)));
    }
    // Reject unknown or unusable services before a purchase row exists.
    engine.resolve_bv(store, service).await?;

    let purchase = store.create_purchase(user, service).await?;
    let distribution = engine
        .distribute(store, user, service, Some(purchase))
        .await?;
    store.set_purchase_bv(purchase, distribution.bv).await?;

    Ok((purchase, distribution))
}

/// Drives purchases through the repository's unit of work.
#[derive(Clone)]
pub struct PurchaseOrchestrator {
    repo: Arc<Repository>,
    engine: IncomeDistributionEngine,
}

impl PurchaseOrchestrator {
    pub fn new(repo: Arc<Repository>, engine: IncomeDistributionEngine) -> Self {
        Self { repo, engine }
    }

    pub async fn purchase(
        &self,
        user: UserId,
        service: ServiceId,
    ) -> Result<PurchaseReceipt, CoreError> {
        let engine = self.engine;
        let atomic = self.repo.is_transactional();

        let result = self
            .repo
            .unit_of_work(move |conn| {
                Box::pin(async move { record_purchase(conn, &engine, user, service).await })
            })
            .await;

        let (purchase_id, distribution) = match result {
            Ok(done) => done,
            Err(e) => {
                if !atomic {
                    warn!(
                        user = %user,
                        service = %service,
                        error = %e,
                        "Purchase failed without a transaction; partial rows may remain"
                    );
                }
                return Err(e);
            }
        };

        info!(
            purchase = %purchase_id,
            user = %user,
            bv = %distribution.bv,
            logs = distribution.logs_created,
            "Purchase recorded"
        );

        Ok(PurchaseReceipt {
            purchase_id,
            bv: distribution.bv,
            logs_created: distribution.logs_created,
            levels_paid: distribution.levels_paid,
            atomic,
        })
    }

    /// Distribute a service's BV from `buyer` without recording a purchase.
    /// Only audit log rows are written.
    pub async fn distribute_audit(
        &self,
        buyer: UserId,
        service: ServiceId,
    ) -> Result<Distribution, CoreError> {
        let engine = self.engine;
        self.repo
            .unit_of_work(move |conn| {
                Box::pin(async move {
                    if conn.get(buyer).await?.is_none() {
                        return Err(CoreError::NotFound(format!("user {}", buyer)));
                    }
                    engine.distribute(conn, buyer, service, None).await
                })
            })
            .await
    }
}
