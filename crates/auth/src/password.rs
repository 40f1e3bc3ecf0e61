//! Password hashing collaborator.

use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password is required")]
    Empty,

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plain: &str) -> Result<String, PasswordError>;

    /// `false` for a wrong password *and* for an unreadable digest.
    fn verify(&self, plain: &str, digest: &str) -> bool;
}

/// bcrypt with a configurable cost.
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, plain: &str) -> Result<String, PasswordError> {
        if plain.trim().is_empty() {
            return Err(PasswordError::Empty);
        }
        bcrypt::hash(plain, self.cost).map_err(|e| PasswordError::Hashing(e.to_string()))
    }

    fn verify(&self, plain: &str, digest: &str) -> bool {
        match bcrypt::verify(plain, digest) {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!(error = %e, "unreadable password digest");
                false
            }
        }
    }
}

const PASSWORD_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnpqrstuvwxyz23456789";

/// Random password for accounts created on someone's behalf (no ambiguous glyphs).
pub fn generate_password(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| PASSWORD_ALPHABET[rng.random_range(0..PASSWORD_ALPHABET.len())] as char)
        .collect()
}
