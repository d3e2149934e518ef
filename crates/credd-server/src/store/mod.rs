pub mod db;
pub mod memory;
pub mod model;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

pub use db::RedbStore;
pub use memory::MemoryStore;
pub use model::{generate_user_id, NewUser, UserId, UserRecord};

/// Failure modes a credential store may report.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The username key is already taken. Raised atomically by the store itself.
    #[error("username already exists")]
    Conflict,
    /// The backend could not be reached, failed, or timed out.
    #[error("store unavailable: {0:#}")]
    Unavailable(#[source] anyhow::Error),
}

impl StoreError {
    pub fn unavailable(err: impl Into<anyhow::Error>) -> Self {
        Self::Unavailable(err.into())
    }
}

/// Durable mapping from username to [`UserRecord`].
///
/// Implementations must make `insert` atomic with respect to the username
/// uniqueness constraint: two concurrent inserts for one username yield exactly
/// one record and one [`StoreError::Conflict`].
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Exact-match lookup. No case-folding, no trimming.
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Store a new record and return its store-assigned id.
    ///
    /// Once `deadline` has passed the record must not be committed: the caller
    /// has already reported the insert as failed.
    async fn insert(&self, user: NewUser, deadline: Instant) -> Result<UserId, StoreError>;
}

/// Parsed `CREDD_STORE_URL`.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreUrl {
    /// `memory://`: process-local, lost on restart.
    Memory,
    /// `redb://<path>` or a bare filesystem path.
    Redb(PathBuf),
}

impl FromStr for StoreUrl {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            anyhow::bail!("store URL is empty");
        }
        match s.split_once("://") {
            Some(("memory", _)) => Ok(Self::Memory),
            Some(("redb", path)) if !path.is_empty() => Ok(Self::Redb(PathBuf::from(path))),
            Some(("redb", _)) => anyhow::bail!("redb store URL is missing a path"),
            Some((scheme, _)) => {
                anyhow::bail!("unsupported store scheme '{scheme}' in {}", redact_url(s))
            }
            None if s == "memory:" => Ok(Self::Memory),
            None => Ok(Self::Redb(PathBuf::from(s))),
        }
    }
}

/// Replace any `user:password@` section of a URL with `***@` so it can be logged.
pub fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_owned();
    };
    // An empty authority (`redb:///path`) carries no userinfo.
    if rest.starts_with('/') {
        return url.to_owned();
    }
    // An unescaped password may contain `/`, `?` or `#`, so everything up to the
    // last `@` is treated as userinfo.
    match rest.rfind('@') {
        Some(at) => format!("{scheme}://***{}", &rest[at..]),
        None => url.to_owned(),
    }
}

/// Open the store named by `url`.
pub fn open_store(url: &StoreUrl) -> anyhow::Result<Arc<dyn CredentialStore>> {
    match url {
        StoreUrl::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreUrl::Redb(path) => Ok(Arc::new(RedbStore::open(path)?)),
    }
}
