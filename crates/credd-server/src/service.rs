//! Registration and authentication on top of a [`CredentialStore`].
//!
//! Usernames and passwords are used exactly as received. Nothing is trimmed or
//! case-folded, so `"Alice"` and `"alice "` are distinct users.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::CredentialError;
use crate::password;
use crate::store::{CredentialStore, NewUser, StoreError, UserId};

/// Extra wait past an insert's deadline for a store that was already committing.
const COMMIT_GRACE: Duration = Duration::from_millis(500);

/// Stateless credential logic. Cheap to clone and share across tasks.
#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    store_timeout: Duration,
}

impl CredentialService {
    pub fn new(store: Arc<dyn CredentialStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    /// Run a store call for at most `limit`.
    async fn bounded<T>(
        op: &'static str,
        limit: Duration,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, CredentialError> {
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result.map_err(CredentialError::from),
            Err(_) => Err(CredentialError::StoreUnavailable(anyhow::anyhow!(
                "store {op} timed out after {limit:?}"
            ))),
        }
    }

    /// Create a user and return the store-assigned id.
    ///
    /// The lookup up front rejects the common duplicate cheaply, before paying for
    /// a hash. The store's own uniqueness constraint settles concurrent
    /// registrations that both pass it.
    pub async fn register(
        &self,
        username: &str,
        plain_password: &[u8],
    ) -> Result<UserId, CredentialError> {
        if username.is_empty() {
            return Err(CredentialError::InvalidInput("Username must not be empty"));
        }
        if Self::bounded(
            "lookup",
            self.store_timeout,
            self.store.find_by_username(username),
        )
        .await?
        .is_some()
        {
            return Err(CredentialError::DuplicateUser);
        }

        let plain = Zeroizing::new(plain_password.to_vec());
        let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&plain))
            .await
            .map_err(|e| CredentialError::Internal(e.into()))?
            .map_err(CredentialError::Internal)?;

        let user = NewUser {
            username: username.to_owned(),
            password_hash,
            created_at: Self::now(),
        };
        // Dropping a timed-out insert does not stop a store that is still
        // working on it, so the store itself refuses to commit past the deadline.
        // Waiting a little beyond it keeps a commit that makes the deadline from
        // being reported as a failure.
        let deadline = Instant::now() + self.store_timeout;
        let id = Self::bounded(
            "insert",
            self.store_timeout + COMMIT_GRACE,
            self.store.insert(user, deadline),
        )
        .await?;
        debug!(username = %username, user_id = %id, "registered user");
        Ok(id)
    }

    /// `Ok(false)` for an unknown username or a wrong password. `Err` only for
    /// infrastructure failures. Both `false` cases pay for one argon2 verify.
    pub async fn authenticate(
        &self,
        username: &str,
        plain_password: &[u8],
    ) -> Result<bool, CredentialError> {
        let record = Self::bounded(
            "lookup",
            self.store_timeout,
            self.store.find_by_username(username),
        )
        .await?;

        let plain = Zeroizing::new(plain_password.to_vec());
        let Some(record) = record else {
            tokio::task::spawn_blocking(move || password::verify_dummy(&plain))
                .await
                .map_err(|e| CredentialError::Internal(e.into()))?
                .map_err(CredentialError::Internal)?;
            return Ok(false);
        };
        let stored = record.password_hash;
        let verdict =
            tokio::task::spawn_blocking(move || password::verify_password(&plain, &stored))
                .await
                .map_err(|e| CredentialError::Internal(e.into()))?;

        match verdict {
            Ok(matches) => Ok(matches),
            Err(e) => {
                warn!(
                    username = %username,
                    user_id = %record.id,
                    error = %format!("{e:#}"),
                    "stored password hash is unreadable; treating as mismatch"
                );
                Ok(false)
            }
        }
    }
}
