//! Purchase and income ledger operations.

use crate::domain::{Decimal, LedgerEntry, Purchase, PurchaseId, ServiceId, TimeMs, UserId};
use crate::store::LedgerStore;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};

use super::{decimal_column, Repository};

/// Rows per INSERT statement; keeps bind parameters well below SQLite's limit.
const BATCH_CHUNK: usize = 100;

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, sqlx::Error> {
    let level: i64 = row.try_get("level")?;
    Ok(LedgerEntry {
        from_user: UserId::new(row.try_get("from_user")?),
        to_user: UserId::new(row.try_get("to_user")?),
        level: u32::try_from(level).map_err(|e| sqlx::Error::ColumnDecode {
            index: "level".to_string(),
            source: Box::new(e),
        })?,
        bv: decimal_column(row, "bv")?,
        amount: decimal_column(row, "amount")?,
        purchase_id: row
            .try_get::<Option<i64>, _>("purchase_id")?
            .map(PurchaseId::new),
    })
}

#[async_trait]
impl LedgerStore for SqliteConnection {
    async fn append_batch(&mut self, entries: &[LedgerEntry]) -> Result<(), sqlx::Error> {
        let created_at = chrono::Utc::now().timestamp_millis();

        for chunk in entries.chunks(BATCH_CHUNK) {
            let mut audit: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO bv_logs (from_user, to_user, level, bv, amount, purchase_id, created_at) ",
            );
            audit.push_values(chunk, |mut b, entry| {
                b.push_bind(entry.from_user.as_i64())
                    .push_bind(entry.to_user.as_i64())
                    .push_bind(i64::from(entry.level))
                    .push_bind(entry.bv.to_canonical_string())
                    .push_bind(entry.amount.to_canonical_string())
                    .push_bind(entry.purchase_id.map(|p| p.as_i64()))
                    .push_bind(created_at);
            });
            audit.build().execute(&mut *self).await?;

            let scoped: Vec<(PurchaseId, &LedgerEntry)> = chunk
                .iter()
                .filter_map(|e| e.purchase_id.map(|p| (p, e)))
                .collect();
            if scoped.is_empty() {
                continue;
            }

            let mut incomes: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO purchase_incomes (purchase_id, from_user, to_user, level, bv, amount, created_at) ",
            );
            incomes.push_values(scoped, |mut b, (purchase, entry)| {
                b.push_bind(purchase.as_i64())
                    .push_bind(entry.from_user.as_i64())
                    .push_bind(entry.to_user.as_i64())
                    .push_bind(i64::from(entry.level))
                    .push_bind(entry.bv.to_canonical_string())
                    .push_bind(entry.amount.to_canonical_string())
                    .push_bind(created_at);
            });
            incomes.build().execute(&mut *self).await?;
        }

        Ok(())
    }

    async fn create_purchase(
        &mut self,
        user: UserId,
        service: ServiceId,
    ) -> Result<PurchaseId, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO purchases (user_id, service_id, bv, created_at) VALUES (?, ?, '0', ?)",
        )
        .bind(user.as_i64())
        .bind(service.as_i64())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&mut *self)
        .await?;

        Ok(PurchaseId::new(result.last_insert_rowid()))
    }

    async fn set_purchase_bv(
        &mut self,
        purchase: PurchaseId,
        bv: Decimal,
    ) -> Result<(), sqlx::Error> {
        let result = sqlx::query("UPDATE purchases SET bv = ? WHERE id = ?")
            .bind(bv.to_canonical_string())
            .bind(purchase.as_i64())
            .execute(&mut *self)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }
}

impl Repository {
    pub async fn get_purchase(&self, id: PurchaseId) -> Result<Option<Purchase>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, user_id, service_id, bv, created_at FROM purchases WHERE id = ?",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Purchase {
                id: PurchaseId::new(row.try_get("id")?),
                user_id: UserId::new(row.try_get("user_id")?),
                service_id: ServiceId::new(row.try_get("service_id")?),
                bv: decimal_column(&row, "bv")?,
                created_at: TimeMs::new(row.try_get("created_at")?),
            })
        })
        .transpose()
    }

    /// Income rows a purchase produced, in level order.
    pub async fn purchase_incomes(
        &self,
        purchase: PurchaseId,
    ) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT from_user, to_user, level, bv, amount, purchase_id
            FROM purchase_incomes
            WHERE purchase_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(purchase.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Every audit row crediting `user`, oldest first.
    pub async fn income_for_user(&self, user: UserId) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT from_user, to_user, level, bv, amount, purchase_id
            FROM bv_logs
            WHERE to_user = ?
            ORDER BY id ASC
            "#,
        )
        .bind(user.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    pub async fn count_ledger_rows(&self) -> Result<(i64, i64), sqlx::Error> {
        let row = sqlx::query(
            "SELECT (SELECT COUNT(*) FROM bv_logs) AS logs, (SELECT COUNT(*) FROM purchase_incomes) AS incomes",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok((row.try_get("logs")?, row.try_get("incomes")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::db::init_db;
    use tempfile::TempDir;

    async fn setup() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(db_path.to_str().unwrap()).await.unwrap();
        sqlx::query(
            "INSERT INTO users (id, name, email, referral_code, created_at) VALUES \
             (1, 'a', 'a@example.com', 'A', 0), (2, 'b', 'b@example.com', 'B', 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO services (id, name, bv, created_at) VALUES (1, 'svc', '100', 0)")
            .execute(&pool)
            .await
            .unwrap();
        let repo = Repository::open(pool, &StoreConfig::default()).await.unwrap();
        (repo, temp_dir)
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn entry(level: u32, amount: &str, purchase: Option<PurchaseId>) -> LedgerEntry {
        LedgerEntry {
            from_user: UserId::new(2),
            to_user: UserId::new(1),
            level,
            bv: dec("100"),
            amount: dec(amount),
            purchase_id: purchase,
        }
    }

    #[tokio::test]
    async fn test_purchase_lifecycle() {
        let (repo, _temp) = setup().await;
        let mut conn = repo.pool().acquire().await.unwrap();

        let id = conn
            .create_purchase(UserId::new(2), ServiceId::new(1))
            .await
            .unwrap();
        assert!(repo.get_purchase(id).await.unwrap().unwrap().bv.is_zero());

        conn.set_purchase_bv(id, dec("100")).await.unwrap();
        let purchase = repo.get_purchase(id).await.unwrap().unwrap();
        assert_eq!(purchase.bv, dec("100"));
        assert_eq!(purchase.user_id, UserId::new(2));

        let err = conn
            .set_purchase_bv(PurchaseId::new(999), dec("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, sqlx::Error::RowNotFound));
    }

    #[tokio::test]
    async fn test_append_batch_writes_both_streams_in_order() {
        let (repo, _temp) = setup().await;
        let mut conn = repo.pool().acquire().await.unwrap();
        let purchase = conn
            .create_purchase(UserId::new(2), ServiceId::new(1))
            .await
            .unwrap();

        // Spans several chunks.
        let entries: Vec<LedgerEntry> = (1..=250)
            .map(|level| entry(level, "1", Some(purchase)))
            .collect();
        conn.append_batch(&entries).await.unwrap();

        let incomes = repo.purchase_incomes(purchase).await.unwrap();
        assert_eq!(incomes, entries);
        assert_eq!(repo.count_ledger_rows().await.unwrap(), (250, 250));
    }

    #[tokio::test]
    async fn test_audit_only_entries_skip_purchase_stream() {
        let (repo, _temp) = setup().await;
        let mut conn = repo.pool().acquire().await.unwrap();

        conn.append_batch(&[entry(1, "5", None), entry(2, "2.5", None)])
            .await
            .unwrap();

        let income = repo.income_for_user(UserId::new(1)).await.unwrap();
        assert_eq!(income.len(), 2);
        assert_eq!(income[1].amount, dec("2.5"));
        assert_eq!(repo.count_ledger_rows().await.unwrap(), (2, 0));
    }
}
