//! Storage seams the placement and distribution core runs against.
//!
//! Each trait is implemented for `sqlx::SqliteConnection` (see `db::repo`), so the
//! same algorithm runs on a pooled connection or inside an open transaction, and
//! for [`MemoryStore`] in unit tests.

use crate::domain::{
    ChildLink, Decimal, DistributionRule, LedgerEntry, NewNode, Node, Position, PurchaseId, ReferralCode,
    ServiceBv, ServiceId, UserId,
};
use async_trait::async_trait;

pub mod issuer;
pub mod memory;

pub use issuer::{HashCodeIssuer, ReferralCodeIssuer};
pub use memory::MemoryStore;

/// Node persistence for the referral graph.
#[async_trait]
pub trait GraphStore: Send {
    /// Fetch one node by id.
    async fn get(&mut self, id: UserId) -> Result<Option<Node>, sqlx::Error>;

    /// Direct children of `parent`, left before right, unslotted children last.
    async fn find_children(&mut self, parent: UserId) -> Result<Vec<ChildLink>, sqlx::Error>;

    async fn find_by_referral_code(
        &mut self,
        code: &ReferralCode,
    ) -> Result<Option<Node>, sqlx::Error>;

    async fn find_by_email(&mut self, email: &str) -> Result<Option<Node>, sqlx::Error>;

    /// Attach `id` under `parent` at `position`.
    ///
    /// # Errors
    /// A SQL store reports a unique violation if the slot was taken concurrently.
    async fn set_parent(
        &mut self,
        id: UserId,
        parent: UserId,
        position: Position,
    ) -> Result<(), sqlx::Error>;

    /// Create a new root node.
    async fn create(&mut self, node: &NewNode) -> Result<UserId, sqlx::Error>;
}

/// Append-only purchase and income records.
#[async_trait]
pub trait LedgerStore: Send {
    /// Append every entry, in the order given, in one call.
    ///
    /// Each entry lands in the audit log; entries tied to a purchase also land in
    /// the purchase-scoped income stream.
    async fn append_batch(&mut self, entries: &[LedgerEntry]) -> Result<(), sqlx::Error>;

    /// Create a purchase row with zero BV.
    async fn create_purchase(
        &mut self,
        user: UserId,
        service: ServiceId,
    ) -> Result<PurchaseId, sqlx::Error>;

    async fn set_purchase_bv(
        &mut self,
        purchase: PurchaseId,
        bv: Decimal,
    ) -> Result<(), sqlx::Error>;
}

/// Service lookup owned by the catalog subsystem.
#[async_trait]
pub trait ServiceCatalog: Send {
    async fn get_bv(&mut self, service: ServiceId) -> Result<Option<ServiceBv>, sqlx::Error>;
}

/// Source of the currently active distribution rule.
#[async_trait]
pub trait RuleStore: Send {
    /// The active rule, or `None` if no rule was ever activated.
    async fn active_rule(&mut self) -> Result<Option<DistributionRule>, sqlx::Error>;
}
