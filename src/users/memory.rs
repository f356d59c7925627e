use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::users::model::{NewUser, User};
use crate::users::repo::{StoreError, UniqueField, UserStore, UserTx};

#[derive(Debug, Clone, Default)]
struct Table {
    rows: Vec<User>,
    last_id: i64,
}

impl Table {
    /// Mirrors the `users_email_key` / `users_phone_key` constraints.
    fn check_unique(
        &self,
        id: Option<i64>,
        email: &str,
        phone: Option<&str>,
    ) -> Result<(), StoreError> {
        for row in self.rows.iter().filter(|row| Some(row.id()) != id) {
            if row.email() == email {
                return Err(StoreError::UniqueViolation(UniqueField::Email));
            }
            if phone.is_some() && row.phone() == phone {
                return Err(StoreError::UniqueViolation(UniqueField::Phone));
            }
        }
        Ok(())
    }
}

/// Users table kept in process memory.
///
/// A unit holds the table lock for its whole lifetime and works on a copy,
/// so transactions are serialized and an uncommitted unit leaves no trace.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    table: Arc<Mutex<Table>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn begin(&self) -> Result<Box<dyn UserTx>, StoreError> {
        let guard = self.table.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUserTx { guard, working }))
    }
}

struct MemoryUserTx {
    guard: OwnedMutexGuard<Table>,
    working: Table,
}

#[async_trait]
impl UserTx for MemoryUserTx {
    async fn find_all_enabled(&mut self) -> Result<Vec<User>, StoreError> {
        Ok(self
            .working
            .rows
            .iter()
            .filter(|row| row.enabled())
            .cloned()
            .collect())
    }

    async fn find_by_phone(&mut self, phone: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .working
            .rows
            .iter()
            .find(|row| row.phone() == Some(phone))
            .cloned())
    }

    async fn find_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .working
            .rows
            .iter()
            .find(|row| row.email() == email)
            .cloned())
    }

    async fn find_by_email_excluding(
        &mut self,
        email: &str,
        excluded_id: i64,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .working
            .rows
            .iter()
            .find(|row| row.email() == email && row.id() != excluded_id)
            .cloned())
    }

    async fn insert(&mut self, user: &NewUser) -> Result<User, StoreError> {
        self.working
            .check_unique(None, user.email(), user.phone())?;
        self.working.last_id += 1;
        let row = user.clone().into_user(self.working.last_id);
        self.working.rows.push(row.clone());
        Ok(row)
    }

    async fn save(&mut self, user: &User) -> Result<(), StoreError> {
        self.working
            .check_unique(Some(user.id()), user.email(), user.phone())?;
        let slot = self
            .working
            .rows
            .iter_mut()
            .find(|row| row.id() == user.id())
            .ok_or(StoreError::RowMissing(user.id()))?;
        *slot = user.clone();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUserTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::model::UserChanges;

    fn new_user(name: &str, email: &str, phone: &str) -> NewUser {
        NewUser::new(name, email, Some(phone)).unwrap()
    }

    #[tokio::test]
    async fn committed_rows_are_visible_to_later_units() {
        let store = MemoryUserStore::new();
        let mut tx = store.begin().await.unwrap();
        let user = tx
            .insert(&new_user("Ana Lima", "ana@example.com", "11999999999"))
            .await
            .unwrap();
        assert_eq!(user.id(), 1);
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let found = tx.find_by_phone("11999999999").await.unwrap();
        assert_eq!(found.map(|u| u.id()), Some(1));
    }

    #[tokio::test]
    async fn dropped_unit_discards_writes() {
        let store = MemoryUserStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert(&new_user("Ana Lima", "ana@example.com", "11999999999"))
                .await
                .unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_all_enabled().await.unwrap().is_empty());
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn insert_enforces_unique_email_and_phone() {
        let store = MemoryUserStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert(&new_user("Ana Lima", "ana@example.com", "11999999999"))
            .await
            .unwrap();

        let err = tx
            .insert(&new_user("Ana Souza", "ana@example.com", "11888888888"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(UniqueField::Email)));

        let err = tx
            .insert(&new_user("Ana Souza", "souza@example.com", "11999999999"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(UniqueField::Phone)));
    }

    #[tokio::test]
    async fn missing_phones_never_collide() {
        let store = MemoryUserStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert(&NewUser::new("Ana Lima", "ana@example.com", None).unwrap())
            .await
            .unwrap();
        tx.insert(&NewUser::new("Bia Lima", "bia@example.com", None).unwrap())
            .await
            .unwrap();
        assert_eq!(tx.find_all_enabled().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn save_checks_other_rows_only() {
        let store = MemoryUserStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut ana = tx
            .insert(&new_user("Ana Lima", "ana@example.com", "11999999999"))
            .await
            .unwrap();
        tx.insert(&new_user("Bia Lima", "bia@example.com", "11888888888"))
            .await
            .unwrap();

        ana.apply_partial_update(UserChanges::new().with_name("Ana Maria").unwrap());
        tx.save(&ana).await.unwrap();

        ana.apply_partial_update(UserChanges::new().with_email("bia@example.com").unwrap());
        let err = tx.save(&ana).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(UniqueField::Email)));
    }

    #[tokio::test]
    async fn lookups_span_disabled_rows() {
        let store = MemoryUserStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut ana = tx
            .insert(&new_user("Ana Lima", "ana@example.com", "11999999999"))
            .await
            .unwrap();
        ana.disable();
        tx.save(&ana).await.unwrap();

        assert!(tx.find_all_enabled().await.unwrap().is_empty());
        assert!(tx.find_by_phone("11999999999").await.unwrap().is_some());
        assert!(tx.find_by_email("ana@example.com").await.unwrap().is_some());
        assert!(tx
            .find_by_email_excluding("ana@example.com", ana.id())
            .await
            .unwrap()
            .is_none());
    }
}
