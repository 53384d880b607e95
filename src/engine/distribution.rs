//! Per-purchase BV distribution up the ancestor chain.

use super::walker::AncestorWalker;
use crate::domain::{
    Decimal, Distribution, DistributionRule, LedgerEntry, PurchaseId, ServiceId, ServiceStatus,
    UserId,
};
use crate::error::CoreError;
use crate::store::{GraphStore, LedgerStore, RuleStore, ServiceCatalog};
use std::ops::ControlFlow;
use tracing::{debug, info};

/// Computes and appends the ledger entries for one purchase.
///
/// Entries are built in memory while walking the chain and written with a single
/// `append_batch` call at the end, so a failure anywhere leaves nothing behind
/// once the surrounding unit of work rolls back.
#[derive(Debug, Clone, Copy)]
pub struct IncomeDistributionEngine {
    walker: AncestorWalker,
}

impl IncomeDistributionEngine {
    pub fn new(walker: AncestorWalker) -> Self {
        Self { walker }
    }

    /// Resolve a service to its BV, rejecting unknown, inactive or malformed services.
    pub async fn resolve_bv<S>(&self, store: &mut S, service: ServiceId) -> Result<Decimal, CoreError>
    where
        S: ServiceCatalog + ?Sized,
    {
        let record = store
            .get_bv(service)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("service {}", service)))?;

        if record.status != ServiceStatus::Active {
            return Err(CoreError::InactiveService(service));
        }

        record
            .resolve_bv()
            .map_err(|reason| CoreError::InvalidBv { service, reason })
    }

    pub async fn distribute<S>(
        &self,
        store: &mut S,
        buyer: UserId,
        service: ServiceId,
        purchase: Option<PurchaseId>,
    ) -> Result<Distribution, CoreError>
    where
        S: GraphStore + LedgerStore + ServiceCatalog + RuleStore + ?Sized,
    {
        let bv = self.resolve_bv(store, service).await?;

        let rule = match store.active_rule().await? {
            Some(rule) => rule,
            None => {
                debug!("No distribution rule activated; using fallback");
                DistributionRule::fallback()
            }
        };

        let mut schedule = rule.schedule(bv).ok_or_else(|| CoreError::InvalidBv {
            service,
            reason: format!("{} overflows the payout calculation", bv),
        })?;

        let mut entries = Vec::new();
        self.walker
            .walk(store, buyer, |ancestor, level| match schedule.next() {
                Some(amount) => {
                    entries.push(LedgerEntry {
                        from_user: buyer,
                        to_user: ancestor,
                        level,
                        bv,
                        amount,
                        purchase_id: purchase,
                    });
                    ControlFlow::Continue(())
                }
                None => ControlFlow::Break(()),
            })
            .await?;

        if !entries.is_empty() {
            store.append_batch(&entries).await?;
        }

        let levels_paid = entries.iter().filter(|e| e.amount.is_positive()).count();
        info!(
            buyer = %buyer,
            service = %service,
            purchase = ?purchase.map(|p| p.as_i64()),
            bv = %bv,
            rule = rule.variant.tag(),
            logs = entries.len(),
            levels_paid,
            "Distributed BV"
        );

        Ok(Distribution {
            bv,
            logs_created: entries.len(),
            levels_paid,
            entries,
        })
    }
}
