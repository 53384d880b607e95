//! Domain types for the referral graph and BV ledger.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper
//! - Identifiers and primitives: UserId, ServiceId, PurchaseId, RuleId, ReferralCode, Position
//! - Graph nodes, placements and tree views
//! - Distribution rules with their payout schedule
//! - Purchases and ledger entries

pub mod decimal;
pub mod ledger;
pub mod node;
pub mod primitives;
pub mod rule;
pub mod service;

pub use decimal::Decimal;
pub use ledger::{Distribution, LedgerEntry, Purchase, PurchaseReceipt};
pub use node::{Assignment, ChildLink, NewNode, Node, Placement, TreeNode};
pub use primitives::{
    Position, PositionParseError, PurchaseId, ReferralCode, RuleId, ServiceId, TimeMs, UserId,
};
pub use rule::{DistributionRule, PayoutSchedule, RuleVariant};
pub use service::{ServiceBv, ServiceStatus};
