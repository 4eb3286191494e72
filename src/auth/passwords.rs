use argon2::{
    Algorithm, Argon2, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::RngCore;

use crate::auth::{AuthError, AuthResult};

const SALT_LEN: usize = 16;

#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
    // Verified against when no real hash exists, so a miss costs as much as a hit.
    dummy_hash: String,
}

impl PasswordService {
    pub fn new() -> AuthResult<Self> {
        let mut builder = ParamsBuilder::new();
        builder.m_cost(19 * 1024); // 19 MiB
        builder.t_cost(2);
        builder.p_cost(1);
        let params = builder.build().map_err(AuthError::from)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut filler = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut filler);
        let dummy_hash = hash_with(&argon2, &filler)?;

        Ok(Self { argon2, dummy_hash })
    }

    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        hash_with(&self.argon2, password.as_bytes())
    }

    /// Returns true only when `password` matches `encoded`. A hash that does
    /// not parse is a mismatch, not an error.
    pub fn verify_password(&self, password: &str, encoded: &str) -> bool {
        let parsed = match PasswordHash::new(encoded) {
            Ok(parsed) => parsed,
            Err(err) => {
                log::warn!("stored password hash is malformed: {}", err);
                return false;
            }
        };
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => true,
            Err(argon2::password_hash::Error::Password) => false,
            Err(err) => {
                log::warn!("password verification failed: {}", err);
                false
            }
        }
    }

    /// Burns one verification's worth of work without a real account.
    pub fn verify_against_dummy(&self, password: &str) {
        let _ = self.verify_password(password, &self.dummy_hash);
    }
}

fn hash_with(argon2: &Argon2<'static>, password: &[u8]) -> AuthResult<String> {
    let mut salt_bytes = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(AuthError::from)?;
    let hash = argon2
        .hash_password(password, &salt)
        .map_err(AuthError::from)?
        .to_string();
    Ok(hash)
}
