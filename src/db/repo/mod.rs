//! Repository layer for database operations.
//!
//! `Repository` owns the pool and the unit-of-work boundary. The store traits the
//! engines run against are implemented directly on `SqliteConnection`, split
//! across submodules by concern:
//! - `graph.rs` - users and their placement in the tree
//! - `ledger.rs` - purchases and the income ledger
//! - `catalog.rs` - services and distribution rules

mod catalog;
mod graph;
mod ledger;

use crate::config::{StoreConfig, TransactionMode};
use crate::domain::Decimal;
use crate::error::CoreError;
use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{info, warn};

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
    transactional: bool,
    timeout: Duration,
}

impl Repository {
    /// Open the store over an initialized pool.
    ///
    /// Transaction support is probed once here and fixed for the lifetime of the
    /// repository. With `TransactionMode::Required` a failed probe is an error;
    /// with `Auto` the store falls back to sequential, non-atomic units of work.
    pub async fn open(pool: SqlitePool, config: &StoreConfig) -> Result<Self, CoreError> {
        let transactional = match config.transaction_mode {
            TransactionMode::Disabled => false,
            TransactionMode::Auto | TransactionMode::Required => match probe(&pool).await {
                Ok(()) => true,
                Err(e) if config.transaction_mode == TransactionMode::Required => {
                    return Err(CoreError::Transaction(format!(
                        "store does not support transactions: {}",
                        e
                    )));
                }
                Err(e) => {
                    warn!(error = %e, "Transaction probe failed");
                    false
                }
            },
        };

        if transactional {
            info!(
                timeout_ms = config.transaction_timeout.as_millis() as u64,
                "Store opened with transactions"
            );
        } else {
            warn!("Store opened WITHOUT transactions; purchases and placements are not atomic");
        }

        Ok(Repository {
            pool,
            transactional,
            timeout: config.transaction_timeout,
        })
    }

    /// Whether units of work run inside a transaction.
    pub fn is_transactional(&self) -> bool {
        self.transactional
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Store closed");
    }

    /// Run `work` as one unit of work.
    ///
    /// In transactional mode `work` runs inside a transaction that commits on
    /// `Ok` and rolls back on `Err` or timeout. Otherwise it runs on a single
    /// pooled connection and any writes made before a failure remain.
    ///
    /// # Errors
    /// `CoreError::Transaction` if the work exceeds the configured timeout,
    /// otherwise whatever `work` or the commit returns.
    pub async fn unit_of_work<T, F>(&self, work: F) -> Result<T, CoreError>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, CoreError>> + Send,
    {
        match tokio::time::timeout(self.timeout, self.run(work)).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::Transaction(format!(
                "unit of work exceeded {} ms",
                self.timeout.as_millis()
            ))),
        }
    }

    async fn run<T, F>(&self, work: F) -> Result<T, CoreError>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, CoreError>> + Send,
    {
        if self.transactional {
            // Dropping an uncommitted transaction rolls it back.
            let mut tx = self.pool.begin().await?;
            let value = work(&mut *tx).await?;
            tx.commit().await?;
            Ok(value)
        } else {
            let mut conn = self.pool.acquire().await?;
            work(&mut *conn).await
        }
    }
}

async fn probe(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let tx = pool.begin().await?;
    tx.rollback().await
}

/// Read a canonical decimal column, treating garbage as a decode failure.
fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str_canonical(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::domain::{NewNode, ReferralCode, UserId};
    use crate::store::GraphStore;
    use tempfile::TempDir;

    async fn setup(config: StoreConfig) -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(db_path.to_str().unwrap()).await.unwrap();
        let repo = Repository::open(pool, &config).await.unwrap();
        (repo, temp_dir)
    }

    fn new_node(n: u32) -> NewNode {
        NewNode {
            name: format!("user{}", n),
            email: format!("user{}@example.com", n),
            referral_code: ReferralCode::new(format!("CODE{}", n)),
        }
    }

    #[tokio::test]
    async fn test_sqlite_is_transactional() {
        let (repo, _temp) = setup(StoreConfig::default()).await;
        assert!(repo.is_transactional());
    }

    #[tokio::test]
    async fn test_disabled_mode_skips_transactions() {
        let config = StoreConfig {
            transaction_mode: TransactionMode::Disabled,
            ..StoreConfig::default()
        };
        let (repo, _temp) = setup(config).await;
        assert!(!repo.is_transactional());
    }

    #[tokio::test]
    async fn test_unit_of_work_commits_on_ok() {
        let (repo, _temp) = setup(StoreConfig::default()).await;

        let id = repo
            .unit_of_work(|conn| {
                Box::pin(async move {
                    let id = conn.create(&new_node(1)).await?;
                    Ok::<_, CoreError>(id)
                })
            })
            .await
            .unwrap();

        assert!(repo.get_user(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unit_of_work_rolls_back_on_err() {
        let (repo, _temp) = setup(StoreConfig::default()).await;

        let err = repo
            .unit_of_work(|conn| {
                Box::pin(async move {
                    conn.create(&new_node(1)).await?;
                    Err::<(), _>(CoreError::Validation("abort".to_string()))
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Validation(_)));
        assert!(repo.get_user(UserId::new(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_degraded_unit_of_work_keeps_partial_writes() {
        let config = StoreConfig {
            transaction_mode: TransactionMode::Disabled,
            ..StoreConfig::default()
        };
        let (repo, _temp) = setup(config).await;

        let _ = repo
            .unit_of_work(|conn| {
                Box::pin(async move {
                    conn.create(&new_node(1)).await?;
                    Err::<(), _>(CoreError::Validation("abort".to_string()))
                })
            })
            .await;

        assert!(repo.get_user(UserId::new(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unit_of_work_timeout() {
        let config = StoreConfig {
            transaction_timeout: Duration::from_millis(20),
            ..StoreConfig::default()
        };
        let (repo, _temp) = setup(config).await;

        let err = repo
            .unit_of_work(|conn| {
                Box::pin(async move {
                    conn.create(&new_node(1)).await?;
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok::<_, CoreError>(())
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Transaction(_)));
        assert!(repo.get_user(UserId::new(1)).await.unwrap().is_none());
    }
}
