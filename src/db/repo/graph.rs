//! User and placement operations.

use crate::domain::{ChildLink, NewNode, Node, Position, ReferralCode, UserId};
use crate::store::GraphStore;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use super::Repository;

const NODE_COLUMNS: &str = "id, parent_id, position, referral_code, name, email";

fn position_column(row: &SqliteRow) -> Result<Option<Position>, sqlx::Error> {
    let raw: Option<String> = row.try_get("position")?;
    raw.map(|s| {
        s.parse::<Position>().map_err(|e| sqlx::Error::ColumnDecode {
            index: "position".to_string(),
            source: Box::new(e),
        })
    })
    .transpose()
}

fn node_from_row(row: &SqliteRow) -> Result<Node, sqlx::Error> {
    Ok(Node {
        id: UserId::new(row.try_get("id")?),
        parent_id: row.try_get::<Option<i64>, _>("parent_id")?.map(UserId::new),
        position: position_column(row)?,
        referral_code: ReferralCode::new(row.try_get("referral_code")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
    })
}

#[async_trait]
impl GraphStore for SqliteConnection {
    async fn get(&mut self, id: UserId) -> Result<Option<Node>, sqlx::Error> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", NODE_COLUMNS))
            .bind(id.as_i64())
            .fetch_optional(&mut *self)
            .await?;
        row.as_ref().map(node_from_row).transpose()
    }

    async fn find_children(&mut self, parent: UserId) -> Result<Vec<ChildLink>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, position
            FROM users
            WHERE parent_id = ?
            ORDER BY
                CASE position WHEN 'left' THEN 0 WHEN 'right' THEN 1 ELSE 2 END,
                id ASC
            "#,
        )
        .bind(parent.as_i64())
        .fetch_all(&mut *self)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ChildLink {
                    id: UserId::new(row.try_get("id")?),
                    position: position_column(row)?,
                })
            })
            .collect()
    }

    async fn find_by_referral_code(
        &mut self,
        code: &ReferralCode,
    ) -> Result<Option<Node>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE referral_code = ?",
            NODE_COLUMNS
        ))
        .bind(code.as_str())
        .fetch_optional(&mut *self)
        .await?;
        row.as_ref().map(node_from_row).transpose()
    }

    async fn find_by_email(&mut self, email: &str) -> Result<Option<Node>, sqlx::Error> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", NODE_COLUMNS))
            .bind(email)
            .fetch_optional(&mut *self)
            .await?;
        row.as_ref().map(node_from_row).transpose()
    }

    async fn set_parent(
        &mut self,
        id: UserId,
        parent: UserId,
        position: Position,
    ) -> Result<(), sqlx::Error> {
        // Only a still-unplaced row is updated; the slot index rejects a taken slot.
        let result = sqlx::query(
            "UPDATE users SET parent_id = ?, position = ? WHERE id = ? AND parent_id IS NULL",
        )
        .bind(parent.as_i64())
        .bind(position.as_str())
        .bind(id.as_i64())
        .execute(&mut *self)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    async fn create(&mut self, node: &NewNode) -> Result<UserId, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (name, email, referral_code, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&node.name)
        .bind(&node.email)
        .bind(node.referral_code.as_str())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&mut *self)
        .await?;

        Ok(UserId::new(result.last_insert_rowid()))
    }
}

impl Repository {
    /// Fetch a user outside any unit of work.
    pub async fn get_user(&self, id: UserId) -> Result<Option<Node>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        conn.get(id).await
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<Node>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        conn.find_by_email(email).await
    }
}
