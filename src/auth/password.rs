use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::AuthConfig;

/// Argon2id hasher with cost parameters taken from config.
///
/// `verify` swallows malformed hashes and returns false; login must treat a
/// corrupt stored hash exactly like a wrong password.
#[derive(Clone)]
pub struct Hasher {
    params: Params,
    dummy_hash: String,
}

impl Hasher {
    pub fn new(m_cost_kib: u32, t_cost: u32, p_cost: u32) -> anyhow::Result<Self> {
        let params = Params::new(m_cost_kib, t_cost, p_cost, None)
            .map_err(|e| anyhow::anyhow!("argon2 params: {e}"))?;
        let mut hasher = Self {
            params,
            dummy_hash: String::new(),
        };
        // hashed once at startup, then verified against on the unknown-email
        // login path so both failure paths pay the same argon2 cost
        hasher.dummy_hash = hasher.hash("jobtrack-timing-pad")?;
        Ok(hasher)
    }

    pub fn from_config(cfg: &AuthConfig) -> anyhow::Result<Self> {
        Self::new(cfg.argon2_m_cost_kib, cfg.argon2_t_cost, cfg.argon2_p_cost)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    pub fn verify(&self, plain: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            error!("stored password hash is malformed");
            return false;
        };
        self.argon2()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    }

    /// Burn one verification against a fixed hash. Used on the unknown-email
    /// login path so it is not measurably faster than a wrong password.
    pub fn verify_dummy(&self, plain: &str) {
        let _ = self.verify(plain, &self.dummy_hash);
    }
}

#[cfg(test)]
pub(crate) fn test_hasher() -> Hasher {
    // minimal cost so the suite stays fast
    Hasher::new(1024, 1, 1).expect("test hasher params")
}
