//! Password reset records.
//!
//! A reset link is only honoured while its record exists, is unexpired and has
//! not been used. Redeeming marks it used in the same transaction that writes
//! the new password digest.

use sqlx::sqlite::SqlitePool;

/// A stored reset record. Timestamps are Unix seconds.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResetRecord {
    pub id: i64,
    pub jti: String,
    pub user_id: i64,
    pub created_at: i64,
    pub expires_at: i64,
    pub used_at: Option<i64>,
}

/// Store for password reset records.
pub struct ResetTokenStore {
    pool: SqlitePool,
}

impl ResetTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a newly issued reset token.
    pub async fn create(
        &self,
        jti: &str,
        user_id: i64,
        created_at: u64,
        expires_at: u64,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO reset_tokens (jti, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(jti)
        .bind(user_id)
        .bind(created_at as i64)
        .bind(expires_at as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a reset record by its token ID.
    pub async fn get_by_jti(&self, jti: &str) -> Result<Option<ResetRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, jti, user_id, created_at, expires_at, used_at FROM reset_tokens WHERE jti = ?",
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await
    }

    /// Drop all unused records for a user so only the newest link works.
    pub async fn invalidate_for_user(&self, user_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM reset_tokens WHERE user_id = ? AND used_at IS NULL")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Mark the record used and store the new password digest, atomically.
    ///
    /// Returns `false` when the record is missing, expired, already used, or
    /// belongs to another user. In that case nothing is written.
    pub async fn redeem(
        &self,
        jti: &str,
        user_id: i64,
        password_hash: &str,
        now: u64,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let consumed = sqlx::query(
            "UPDATE reset_tokens SET used_at = ?
             WHERE jti = ? AND user_id = ? AND used_at IS NULL AND expires_at > ?",
        )
        .bind(now as i64)
        .bind(jti)
        .bind(user_id)
        .bind(now as i64)
        .execute(&mut *tx)
        .await?;

        if consumed.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        let updated = sqlx::query(
            "UPDATE users SET password_hash = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Delete expired records.
    pub async fn delete_expired(&self, now: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM reset_tokens WHERE expires_at <= ?")
            .bind(now as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{Database, NewUser};

    async fn setup() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .users()
            .create(&NewUser {
                name: "Alice",
                email: "alice@example.com",
                password_hash: "old-hash",
                company_name: None,
                address: None,
                phone: None,
                registration_number: None,
            })
            .await
            .unwrap();
        (db, id)
    }

    #[tokio::test]
    async fn test_redeem_once() {
        let (db, user_id) = setup().await;
        db.reset_tokens()
            .create("jti-1", user_id, 1000, 2000)
            .await
            .unwrap();

        assert!(
            db.reset_tokens()
                .redeem("jti-1", user_id, "new-hash", 1500)
                .await
                .unwrap()
        );
        let user = db.users().get_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.password_hash, "new-hash");

        // Second use is refused and does not overwrite the digest.
        assert!(
            !db.reset_tokens()
                .redeem("jti-1", user_id, "third-hash", 1600)
                .await
                .unwrap()
        );
        let user = db.users().get_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.password_hash, "new-hash");

        let record = db.reset_tokens().get_by_jti("jti-1").await.unwrap().unwrap();
        assert_eq!(record.used_at, Some(1500));
    }

    #[tokio::test]
    async fn test_redeem_expired_refused() {
        let (db, user_id) = setup().await;
        db.reset_tokens()
            .create("jti-1", user_id, 1000, 2000)
            .await
            .unwrap();

        assert!(
            !db.reset_tokens()
                .redeem("jti-1", user_id, "new-hash", 2000)
                .await
                .unwrap()
        );
        let user = db.users().get_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.password_hash, "old-hash");
    }

    #[tokio::test]
    async fn test_redeem_wrong_user_refused() {
        let (db, user_id) = setup().await;
        db.reset_tokens()
            .create("jti-1", user_id, 1000, 2000)
            .await
            .unwrap();

        assert!(
            !db.reset_tokens()
                .redeem("jti-1", user_id + 1, "new-hash", 1500)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_invalidate_and_delete_expired() {
        let (db, user_id) = setup().await;
        let store = db.reset_tokens();
        store.create("old", user_id, 100, 200).await.unwrap();
        store.create("current", user_id, 1000, 5000).await.unwrap();

        assert_eq!(store.delete_expired(1000).await.unwrap(), 1);
        assert!(store.get_by_jti("old").await.unwrap().is_none());

        assert_eq!(store.invalidate_for_user(user_id).await.unwrap(), 1);
        assert!(store.get_by_jti("current").await.unwrap().is_none());
    }
}
