use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use tracing::debug;

use crate::users::model::{NewUser, User};

/// Which uniqueness rule a write broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Phone,
    Other,
}

impl UniqueField {
    fn from_constraint(constraint: Option<&str>) -> Self {
        match constraint {
            Some(name) if name.contains("email") => UniqueField::Email,
            Some(name) if name.contains("phone") => UniqueField::Phone,
            _ => UniqueField::Other,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated ({0:?})")]
    UniqueViolation(UniqueField),
    #[error("user row {0} no longer exists")]
    RowMissing(i64),
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation(UniqueField::from_constraint(
                    db_err.constraint(),
                ));
            }
        }
        StoreError::Database(err)
    }
}

/// Opens transactional units against the users table.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UserTx>, StoreError>;
}

/// One transaction. Dropping it without `commit` discards every write.
#[async_trait]
pub trait UserTx: Send {
    async fn find_all_enabled(&mut self) -> Result<Vec<User>, StoreError>;
    async fn find_by_phone(&mut self, phone: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_email_excluding(
        &mut self,
        email: &str,
        excluded_id: i64,
    ) -> Result<Option<User>, StoreError>;
    async fn insert(&mut self, user: &NewUser) -> Result<User, StoreError>;
    async fn save(&mut self, user: &User) -> Result<(), StoreError>;
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn begin(&self) -> Result<Box<dyn UserTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUserTx { tx }))
    }
}

struct PgUserTx {
    tx: Transaction<'static, Postgres>,
}

const USER_COLUMNS: &str = "id, name, email, phone, enabled, created_at, updated_at";

#[async_trait]
impl UserTx for PgUserTx {
    async fn find_all_enabled(&mut self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE enabled = TRUE ORDER BY id"
        ))
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows)
    }

    async fn find_by_phone(&mut self, phone: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE phone = $1"
        ))
        .bind(phone)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn find_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn find_by_email_excluding(
        &mut self,
        email: &str,
        excluded_id: i64,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND id <> $2"
        ))
        .bind(email)
        .bind(excluded_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn insert(&mut self, user: &NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, phone, enabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.name())
        .bind(user.email())
        .bind(user.phone())
        .bind(user.enabled())
        .bind(user.created_at())
        .bind(user.updated_at())
        .fetch_one(&mut *self.tx)
        .await?;
        debug!(user_id = row.id(), "user row inserted");
        Ok(row)
    }

    async fn save(&mut self, user: &User) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
               SET name = $1, email = $2, phone = $3, enabled = $4, updated_at = $5
             WHERE id = $6
            "#,
        )
        .bind(user.name())
        .bind(user.email())
        .bind(user.phone())
        .bind(user.enabled())
        .bind(user.updated_at())
        .bind(user.id())
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RowMissing(user.id()));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_names_map_to_fields() {
        assert_eq!(
            UniqueField::from_constraint(Some("users_email_key")),
            UniqueField::Email
        );
        assert_eq!(
            UniqueField::from_constraint(Some("users_phone_key")),
            UniqueField::Phone
        );
        assert_eq!(UniqueField::from_constraint(None), UniqueField::Other);
    }

    #[test]
    fn non_database_errors_stay_generic() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Database(_)));
    }
}
