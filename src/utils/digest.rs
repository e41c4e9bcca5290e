use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
};
use argon2::Argon2;

use crate::error::Result;
use crate::fs::{PasswordHasher, BUCKET_COUNT};

/// pick the directory bucket of a file name from its [blake3] hash
pub fn bucket_of(name: &str) -> usize {
    let hash = blake3::hash(name.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    (u64::from_le_bytes(prefix) % BUCKET_COUNT as u64) as usize
}

/// [argon2] password digests, stored as PHC strings with a random salt
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2PasswordHasher;

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = Argon2::default().hash_password(password.as_bytes(), &salt)?;
        Ok(digest.to_string())
    }

    fn verify(&self, password: &str, digest: &str) -> bool {
        PasswordHash::new(digest).map_or(false, |digest| {
            Argon2::default()
                .verify_password(password.as_bytes(), &digest)
                .is_ok()
        })
    }
}
