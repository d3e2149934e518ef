use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use super::model::{generate_user_id, NewUser, UserId, UserRecord};
use super::{CredentialStore, StoreError};

const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Thread-safe handle to the redb user table.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("create store directory")?;
        }
        let db = Database::create(path).context("open redb database")?;

        // Ensure the table exists so read transactions never see a missing table.
        let write_txn = db.begin_write()?;
        write_txn.open_table(USERS)?;
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    fn find_blocking(&self, username: &str) -> Result<Option<UserRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        let record = match table.get(username)? {
            Some(guard) => Some(decode(guard.value())?),
            None => None,
        };
        Ok(record)
    }

    /// Returns `None` when the username is already taken.
    /// The existence check and the insert share one write transaction, and redb
    /// admits a single writer at a time. `begin_write` can wait on another
    /// writer for longer than the caller is willing to, so nothing is committed
    /// once `deadline` has passed.
    fn insert_blocking(&self, user: NewUser, deadline: Instant) -> Result<Option<UserId>> {
        let write_txn = self.db.begin_write()?;
        if Instant::now() >= deadline {
            write_txn.abort()?;
            anyhow::bail!("insert deadline passed while waiting for the write lock");
        }
        let id = {
            let mut table = write_txn.open_table(USERS)?;
            if table.get(user.username.as_str())?.is_some() {
                None
            } else {
                let id = generate_user_id();
                let record = user.into_record(id.clone());
                let bytes = encode(&record)?;
                table.insert(record.username.as_str(), bytes.as_slice())?;
                Some(id)
            }
        };
        match id {
            Some(_) if Instant::now() >= deadline => {
                write_txn.abort()?;
                anyhow::bail!("insert deadline passed before commit");
            }
            Some(id) => {
                write_txn.commit()?;
                debug!(user_id = %id, "stored user record");
                Ok(Some(id))
            }
            None => {
                write_txn.abort()?;
                Ok(None)
            }
        }
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        let mut n = 0;
        for item in table.iter()? {
            item?;
            n += 1;
        }
        Ok(n)
    }
}

#[async_trait]
impl CredentialStore for RedbStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let store = self.clone();
        let username = username.to_owned();
        tokio::task::spawn_blocking(move || store.find_blocking(&username))
            .await
            .map_err(StoreError::unavailable)?
            .map_err(StoreError::Unavailable)
    }

    async fn insert(&self, user: NewUser, deadline: Instant) -> Result<UserId, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.insert_blocking(user, deadline))
            .await
            .map_err(StoreError::unavailable)?
            .map_err(StoreError::Unavailable)?
            .ok_or(StoreError::Conflict)
    }
}

fn encode(record: &UserRecord) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(record, bincode::config::standard())
        .context("bincode encode user record")
}

fn decode(bytes: &[u8]) -> Result<UserRecord> {
    let (record, _): (UserRecord, _) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .context("bincode decode user record")?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::CredentialError;
    use crate::service::CredentialService;
    use tempfile::tempdir;

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    fn make_store() -> (RedbStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = RedbStore::open(&path).unwrap();
        (store, dir)
    }

    fn new_user(username: &str, hash: &[u8]) -> NewUser {
        NewUser {
            username: username.to_owned(),
            password_hash: hash.to_vec(),
            created_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn insert_then_find() {
        let (s, _dir) = make_store();
        let id = s.insert(new_user("alice", b"$argon2id$fake"), soon()).await.unwrap();
        let found = s.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.username, "alice");
        assert_eq!(found.password_hash, b"$argon2id$fake");
        assert_eq!(found.created_at, 1_700_000_000);
    }

    #[tokio::test]
    async fn missing_user_is_none() {
        let (s, _dir) = make_store();
        assert!(s.find_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts_and_keeps_first() {
        let (s, _dir) = make_store();
        let first = s.insert(new_user("alice", b"one"), soon()).await.unwrap();
        let err = s.insert(new_user("alice", b"two"), soon()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
        assert_eq!(s.count().unwrap(), 1);
        let found = s.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.id, first);
        assert_eq!(found.password_hash, b"one");
    }

    #[tokio::test]
    async fn lookup_is_exact_match() {
        let (s, _dir) = make_store();
        s.insert(new_user("Alice", b"h"), soon()).await.unwrap();
        assert!(s.find_by_username("alice").await.unwrap().is_none());
        assert!(s.find_by_username(" Alice").await.unwrap().is_none());
        assert!(s.find_by_username("Alice ").await.unwrap().is_none());
        // Distinct keys, so these are separate users.
        s.insert(new_user("alice", b"h"), soon()).await.unwrap();
        assert_eq!(s.count().unwrap(), 2);
    }

    #[tokio::test]
    async fn concurrent_inserts_yield_one_record() {
        let (s, _dir) = make_store();
        let mut handles = Vec::new();
        for i in 0..8u8 {
            let s = s.clone();
            handles.push(tokio::spawn(async move {
                s.insert(new_user("racer", &[i]), soon()).await
            }));
        }
        let mut ok = 0;
        let mut conflicts = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(StoreError::Conflict) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(s.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("users.db");
        let id = {
            let s = RedbStore::open(&path).unwrap();
            s.insert(new_user("bob", b"h"), soon()).await.unwrap()
        };
        let s = RedbStore::open(&path).unwrap();
        assert_eq!(s.find_by_username("bob").await.unwrap().unwrap().id, id);
    }

    #[tokio::test]
    async fn insert_waiting_on_write_lock_past_deadline_commits_nothing() {
        let (s, _dir) = make_store();
        let held = s.db.begin_write().unwrap();
        let pending = {
            let s = s.clone();
            tokio::spawn(async move {
                s.insert(
                    new_user("alice", b"h"),
                    Instant::now() + Duration::from_millis(100),
                )
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(400)).await;
        held.abort().unwrap();

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(s.count().unwrap(), 0);
        assert!(s.find_by_username("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn timed_out_registration_leaves_no_record() {
        let (s, _dir) = make_store();
        let svc = CredentialService::new(Arc::new(s.clone()), Duration::from_millis(200));

        let held = s.db.begin_write().unwrap();
        let outcome = svc.register("alice", b"s3cret").await;
        assert!(matches!(outcome, Err(CredentialError::StoreUnavailable(_))));
        held.abort().unwrap();
        // Let the abandoned insert take the lock and give up.
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(s.count().unwrap(), 0);
        assert!(!svc.authenticate("alice", b"s3cret").await.unwrap());

        let svc = CredentialService::new(Arc::new(s.clone()), Duration::from_secs(5));
        svc.register("alice", b"n3w").await.unwrap();
        assert!(svc.authenticate("alice", b"n3w").await.unwrap());
        assert!(!svc.authenticate("alice", b"s3cret").await.unwrap());
        assert_eq!(s.count().unwrap(), 1);
    }
}
