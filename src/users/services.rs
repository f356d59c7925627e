use tracing::{info, warn};

use crate::error::ApiError;
use crate::users::model::{NewUser, User, UserChanges};
use crate::users::repo::{UserStore, UserTx};

/// Finishes a unit: commit on success, roll back on any error.
async fn finish<T>(
    tx: Box<dyn UserTx>,
    outcome: Result<T, ApiError>,
    context: &'static str,
) -> Result<T, ApiError> {
    match outcome {
        Ok(value) => {
            tx.commit().await.map_err(ApiError::store(context))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rb) = tx.rollback().await {
                warn!(error = %rb, "rollback failed");
            }
            Err(err)
        }
    }
}

async fn begin(store: &dyn UserStore, context: &'static str) -> Result<Box<dyn UserTx>, ApiError> {
    store.begin().await.map_err(ApiError::store(context))
}

async fn require_by_phone(
    tx: &mut dyn UserTx,
    phone: &str,
    context: &'static str,
) -> Result<User, ApiError> {
    tx.find_by_phone(phone)
        .await
        .map_err(ApiError::store(context))?
        .ok_or_else(|| ApiError::user_not_found(phone))
}

pub async fn list_enabled(store: &dyn UserStore) -> Result<Vec<User>, ApiError> {
    const CONTEXT: &str = "Failed to fetch users";
    let mut tx = begin(store, CONTEXT).await?;
    let outcome = tx
        .find_all_enabled()
        .await
        .map_err(ApiError::store(CONTEXT));
    finish(tx, outcome, CONTEXT).await
}

/// Looks a user up regardless of its enabled state.
pub async fn get_by_phone(store: &dyn UserStore, phone: &str) -> Result<User, ApiError> {
    const CONTEXT: &str = "Failed to fetch user";
    let mut tx = begin(store, CONTEXT).await?;
    let outcome = require_by_phone(tx.as_mut(), phone, CONTEXT).await;
    finish(tx, outcome, CONTEXT).await
}

pub async fn create(store: &dyn UserStore, new_user: NewUser) -> Result<User, ApiError> {
    const CONTEXT: &str = "Failed to create user";
    let mut tx = begin(store, CONTEXT).await?;
    let outcome = insert_unique(tx.as_mut(), &new_user, CONTEXT).await;
    let user = finish(tx, outcome, CONTEXT).await?;
    info!(user_id = user.id(), email = %user.email(), "user created");
    Ok(user)
}

async fn insert_unique(
    tx: &mut dyn UserTx,
    new_user: &NewUser,
    context: &'static str,
) -> Result<User, ApiError> {
    if tx
        .find_by_email(new_user.email())
        .await
        .map_err(ApiError::store(context))?
        .is_some()
    {
        return Err(ApiError::Conflict("Email already in use".into()));
    }
    tx.insert(new_user).await.map_err(ApiError::store(context))
}

/// Partial update. `changes` is only evaluated once the user is known to
/// exist, so an unknown phone is reported before a bad body.
pub async fn update_by_phone<F>(
    store: &dyn UserStore,
    phone: &str,
    changes: F,
) -> Result<User, ApiError>
where
    F: FnOnce() -> Result<UserChanges, ApiError> + Send,
{
    const CONTEXT: &str = "Failed to update user";
    let mut tx = begin(store, CONTEXT).await?;
    let outcome = apply_update(tx.as_mut(), phone, changes).await;
    let user = finish(tx, outcome, CONTEXT).await?;
    info!(user_id = user.id(), "user updated");
    Ok(user)
}

async fn apply_update<F>(tx: &mut dyn UserTx, phone: &str, changes: F) -> Result<User, ApiError>
where
    F: FnOnce() -> Result<UserChanges, ApiError> + Send,
{
    const CONTEXT: &str = "Failed to update user";
    let mut user = require_by_phone(tx, phone, CONTEXT).await?;
    let changes = changes()?;
    if let Some(email) = changes.email() {
        let taken = tx
            .find_by_email_excluding(email, user.id())
            .await
            .map_err(ApiError::store(CONTEXT))?;
        if taken.is_some() {
            return Err(ApiError::Conflict("Email already registered".into()));
        }
    }
    user.apply_partial_update(changes);
    tx.save(&user).await.map_err(ApiError::store(CONTEXT))?;
    Ok(user)
}

/// Soft delete. Disabling an already disabled user just stamps it again.
pub async fn disable_by_phone(store: &dyn UserStore, phone: &str) -> Result<User, ApiError> {
    const CONTEXT: &str = "Failed to remove user";
    let mut tx = begin(store, CONTEXT).await?;
    let outcome = set_enabled(tx.as_mut(), phone, false, CONTEXT).await;
    let user = finish(tx, outcome, CONTEXT).await?;
    info!(user_id = user.id(), "user disabled");
    Ok(user)
}

pub async fn restore_by_phone(store: &dyn UserStore, phone: &str) -> Result<User, ApiError> {
    const CONTEXT: &str = "Failed to restore user";
    let mut tx = begin(store, CONTEXT).await?;
    let outcome = set_enabled(tx.as_mut(), phone, true, CONTEXT).await;
    let user = finish(tx, outcome, CONTEXT).await?;
    info!(user_id = user.id(), "user restored");
    Ok(user)
}

async fn set_enabled(
    tx: &mut dyn UserTx,
    phone: &str,
    enabled: bool,
    context: &'static str,
) -> Result<User, ApiError> {
    let mut user = require_by_phone(tx, phone, context).await?;
    if enabled {
        if user.enabled() {
            return Err(ApiError::State("User is already active".into()));
        }
        user.enable();
    } else {
        user.disable();
    }
    tx.save(&user).await.map_err(ApiError::store(context))?;
    Ok(user)
}
