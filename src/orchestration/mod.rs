//! Use cases that wrap the engines in the repository's unit of work.

pub mod membership;
pub mod purchase;

pub use membership::{register, Joined, Membership, Registration};
pub use purchase::{record_purchase, PurchaseOrchestrator};
