use serde::{Deserialize, Serialize};

/// Store-assigned user identifier: 24 lowercase hex characters.
pub type UserId = String;

/// Stored as bincode-encoded bytes, keyed by `username`.
/// `password_hash` is a PHC-format Argon2id string; the plaintext never reaches the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    /// Exact bytes the client sent. No trimming or case-folding.
    pub username: String,
    pub password_hash: Vec<u8>,
    /// Unix timestamp (seconds) when the record was created.
    pub created_at: i64,
}

/// A record about to be inserted. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: Vec<u8>,
    pub created_at: i64,
}

impl NewUser {
    pub(crate) fn into_record(self, id: UserId) -> UserRecord {
        UserRecord {
            id,
            username: self.username,
            password_hash: self.password_hash,
            created_at: self.created_at,
        }
    }
}

/// Generate a 12-byte random identifier rendered as hex.
pub fn generate_user_id() -> UserId {
    use rand::Rng;
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}
