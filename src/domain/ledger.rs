//! Purchases and the append-only income ledger.

use super::{Decimal, PurchaseId, ServiceId, TimeMs, UserId};
use serde::Serialize;

/// One immutable record of BV-derived income from a buyer to one ancestor.
///
/// Entries without a `purchase_id` are audit-only logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub from_user: UserId,
    pub to_user: UserId,
    pub level: u32,
    pub bv: Decimal,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_id: Option<PurchaseId>,
}

/// A purchase row. `bv` is what was actually distributed, frozen at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: PurchaseId,
    pub user_id: UserId,
    pub service_id: ServiceId,
    pub bv: Decimal,
    pub created_at: TimeMs,
}

/// Outcome of distributing one purchase's BV up the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    pub bv: Decimal,
    pub entries: Vec<LedgerEntry>,
    pub logs_created: usize,
    pub levels_paid: usize,
}

/// What `purchase` reports back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub purchase_id: PurchaseId,
    pub bv: Decimal,
    pub logs_created: usize,
    pub levels_paid: usize,
    /// False when the store ran the purchase without a transaction.
    pub atomic: bool,
}
