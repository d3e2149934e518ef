//! Argon2id password hashing.
//!
//! Hashes are PHC-format strings (`$argon2id$v=19$m=19456,t=2,p=1$<salt>$<hash>`)
//! stored as raw bytes. The salt and cost parameters travel inside the string, so
//! verification keeps working for old records if the work factor below is raised.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

/// Memory cost in KiB (19 MiB).
pub const M_COST: u32 = 19_456;
/// Iterations.
pub const T_COST: u32 = 2;
/// Lanes.
pub const P_COST: u32 = 1;

/// Well-formed hash at the current work factor that no password matches.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

fn argon2() -> Result<Argon2<'static>> {
    let params =
        Params::new(M_COST, T_COST, P_COST, None).map_err(|e| anyhow::anyhow!("argon2 params: {e}"))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash `plain` with a fresh random salt. Blocking and deliberately slow.
pub fn hash_password(plain: &[u8]) -> Result<Vec<u8>> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2()?
        .hash_password(plain, &salt)
        .map_err(|e| anyhow::anyhow!("argon2 hash: {e}"))?;
    Ok(hash.to_string().into_bytes())
}

/// Check `plain` against a stored PHC hash.
///
/// `Ok(false)` on mismatch. `Err` only when `stored` is not a parseable hash.
/// The comparison runs inside the argon2 verifier, which is constant-time.
pub fn verify_password(plain: &[u8], stored: &[u8]) -> Result<bool> {
    let phc = std::str::from_utf8(stored).context("stored hash is not UTF-8")?;
    let parsed = PasswordHash::new(phc).map_err(|e| anyhow::anyhow!("invalid stored hash: {e}"))?;
    Ok(argon2()?.verify_password(plain, &parsed).is_ok())
}

/// Run one full verify for a username with no record, so that login takes as
/// long for unknown users as it does for a wrong password.
pub fn verify_dummy(plain: &[u8]) -> Result<()> {
    verify_password(plain, DUMMY_HASH.as_bytes()).map(|_| ())
}
