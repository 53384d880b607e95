//! SQLite persistence for the referral graph, the catalog and the income ledger.
//!
//! - `migrations`: pragmas, schema and the append-only triggers
//! - `repo`: the `Repository` handle, its unit of work and the store trait impls

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::Repository;
