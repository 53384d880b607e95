pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod store;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Decimal, DistributionRule, Node, Position, PurchaseId, ReferralCode, RuleId, RuleVariant,
    ServiceId, TimeMs, TreeNode, UserId,
};
pub use error::{AppError, CoreError};
