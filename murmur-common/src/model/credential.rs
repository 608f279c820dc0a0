//! Salted password storage.
//!
//! The plaintext password only ever exists as a transient [`Password`]; what
//! gets persisted is a per-user random salt and the argon2 hash derived from
//! the plaintext keyed by that salt.

use argon2::{Argon2, Params};
use serde::{Deserialize, Deserializer, de::Error};
use std::fmt::{Debug, Formatter};
use thiserror::Error;

pub const PASSWORD_MIN_LEN: usize = 6;
pub const SALT_LEN: usize = 16;
pub const PASSWORD_HASH_LEN: usize = Params::DEFAULT_OUTPUT_LEN;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum InvalidPasswordError {
    #[error("Password is required")]
    Missing,
    #[error("Password must be at least {PASSWORD_MIN_LEN} characters.")]
    TooShort,
}

/// A plaintext password accepted from a client, validated but never stored.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Result<Self, InvalidPasswordError> {
        if password.is_empty() {
            Err(InvalidPasswordError::Missing)
        } else if password.chars().count() < PASSWORD_MIN_LEN {
            Err(InvalidPasswordError::TooShort)
        } else {
            Ok(Self(password))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Password {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        // The error is reported by message so the plaintext is never echoed.
        Password::new(inner).map_err(Error::custom)
    }
}

impl Debug for Password {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Password").field(&"[redacted]").finish()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing password failed: {0}")]
pub struct PasswordHashError(argon2::Error);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
pub enum InvalidCredentialPartsError {
    #[default]
    #[error("The stored salt had an invalid length")]
    SaltLength,
    #[error("The stored password hash had an invalid length")]
    HashLength,
}

/// What actually gets written to the users table in place of a password.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct StoredCredential {
    salt: [u8; SALT_LEN],
    hash: Box<[u8; PASSWORD_HASH_LEN]>,
}

impl StoredCredential {
    pub fn derive(password: &Password) -> Result<Self, PasswordHashError> {
        let salt: [u8; SALT_LEN] = rand::random();
        let hash = hash_with_salt(password.get(), &salt)?;

        Ok(Self { salt, hash })
    }

    pub fn from_parts(salt: &[u8], hash: &[u8]) -> Result<Self, InvalidCredentialPartsError> {
        let salt = salt
            .try_into()
            .map_err(|_| InvalidCredentialPartsError::SaltLength)?;
        let hash = Box::new(
            hash.try_into()
                .map_err(|_| InvalidCredentialPartsError::HashLength)?,
        );

        Ok(Self { salt, hash })
    }

    /// Recomputes the hash of `plaintext` with the stored salt and compares
    /// it against the stored hash in constant time.
    pub fn verify(&self, plaintext: &str) -> Result<bool, PasswordHashError> {
        let candidate = hash_with_salt(plaintext, &self.salt)?;
        Ok(constant_time_eq(&*candidate, &*self.hash))
    }

    #[must_use]
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    #[must_use]
    pub fn hash(&self) -> &[u8] {
        &*self.hash
    }
}

impl Debug for StoredCredential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredential")
            .field("salt", &"[redacted]")
            .field("hash", &"[redacted]")
            .finish()
    }
}

fn hash_with_salt(
    plaintext: &str,
    salt: &[u8; SALT_LEN],
) -> Result<Box<[u8; PASSWORD_HASH_LEN]>, PasswordHashError> {
    let argon2 = Argon2::default();

    let mut hash = Box::new([0; PASSWORD_HASH_LEN]);
    argon2
        .hash_password_into(plaintext.as_bytes(), salt, &mut *hash)
        .map_err(PasswordHashError)?;

    Ok(hash)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use crate::model::credential::{
        InvalidCredentialPartsError, InvalidPasswordError, PASSWORD_HASH_LEN, Password,
        SALT_LEN, StoredCredential,
    };

    #[test]
    fn password_length_rules() {
        assert_eq!(
            Password::new(String::new()),
            Err(InvalidPasswordError::Missing)
        );
        assert_eq!(
            Password::new("short".to_owned()),
            Err(InvalidPasswordError::TooShort)
        );
        assert!(Password::new("secret1".to_owned()).is_ok());
        // Length is counted in chars, not bytes.
        assert!(Password::new("éééééé".to_owned()).is_ok());
    }

    #[test]
    fn derive_stores_no_plaintext() {
        let password = Password::new("secret1".to_owned()).unwrap();
        let credential = StoredCredential::derive(&password).unwrap();

        let plaintext = password.get().as_bytes();
        assert!(!credential.salt().windows(plaintext.len()).any(|w| w == plaintext));
        assert!(!credential.hash().windows(plaintext.len()).any(|w| w == plaintext));
    }

    #[test]
    fn verify_accepts_only_the_original_password() {
        let password = Password::new("secret1".to_owned()).unwrap();
        let credential = StoredCredential::derive(&password).unwrap();

        assert!(credential.verify("secret1").unwrap());
        assert!(!credential.verify("secret2").unwrap());
        assert!(!credential.verify("Secret1").unwrap());
        assert!(!credential.verify("").unwrap());
    }

    #[test]
    fn derivations_use_distinct_salts() {
        let password = Password::new("secret1".to_owned()).unwrap();
        let first = StoredCredential::derive(&password).unwrap();
        let second = StoredCredential::derive(&password).unwrap();

        assert_ne!(first.salt(), second.salt());
        assert_ne!(first.hash(), second.hash());
    }

    #[test]
    fn from_parts_round_trips() {
        let password = Password::new("secret1".to_owned()).unwrap();
        let credential = StoredCredential::derive(&password).unwrap();

        let restored =
            StoredCredential::from_parts(credential.salt(), credential.hash()).unwrap();
        assert!(restored.verify("secret1").unwrap());

        assert_eq!(
            StoredCredential::from_parts(&[0; SALT_LEN - 1], credential.hash()),
            Err(InvalidCredentialPartsError::SaltLength)
        );
        assert_eq!(
            StoredCredential::from_parts(credential.salt(), &[0; PASSWORD_HASH_LEN + 1]),
            Err(InvalidCredentialPartsError::HashLength)
        );
    }

    #[test]
    fn debug_output_is_redacted() {
        let password = Password::new("secret1".to_owned()).unwrap();
        let credential = StoredCredential::derive(&password).unwrap();

        assert!(!format!("{password:?}").contains("secret1"));
        assert!(format!("{credential:?}").contains("[redacted]"));
    }
}
