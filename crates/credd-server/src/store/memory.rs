use std::time::Instant;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::model::{generate_user_id, NewUser, UserId, UserRecord};
use super::{CredentialStore, StoreError};

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<String, UserRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.get(username).map(|r| r.value().clone()))
    }

    async fn insert(&self, user: NewUser, deadline: Instant) -> Result<UserId, StoreError> {
        if Instant::now() >= deadline {
            return Err(StoreError::unavailable(anyhow::anyhow!("insert deadline passed")));
        }
        // The entry holds the shard lock, so check and insert are one step.
        match self.users.entry(user.username.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict),
            Entry::Vacant(slot) => {
                let id = generate_user_id();
                slot.insert(user.into_record(id.clone()));
                Ok(id)
            }
        }
    }
}
