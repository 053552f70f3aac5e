//! Password hashing with Argon2id and bcrypt

use crate::{AuthError, AuthResult};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Argon2, Params, Version,
};
use larix_core::Config;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One-way password hashing
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> AuthResult<String>;

    /// Check a plain password against a stored hash. Malformed hashes do not match.
    fn verify(&self, password: &str, hash: &str) -> bool;

    /// Whether the hash was produced with different settings than the current ones
    fn needs_rehash(&self, hash: &str) -> bool;

    fn name(&self) -> &'static str;
}

/// Argon2id hasher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Hasher {
    pub memory_cost: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::new(65536, 2, 1)
    }
}

impl Argon2Hasher {
    pub fn new(memory_cost: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            memory_cost,
            time_cost,
            parallelism,
        }
    }

    fn argon2(&self) -> AuthResult<Argon2<'static>> {
        let params = Params::new(self.memory_cost, self.time_cost, self.parallelism, None)
            .map_err(|e| AuthError::crypto_error(format!("Invalid Argon2 parameters: {}", e)))?;
        Ok(Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> AuthResult<String> {
        let salt = SaltString::generate(&mut thread_rng());
        let hash = self.argon2()?.hash_password(password.as_bytes(), &salt)?;
        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(_) => return false,
        };
        // the hash carries its own parameters
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    fn needs_rehash(&self, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(_) => return true,
        };
        if parsed.algorithm.as_str() != "argon2id" {
            return true;
        }
        match Params::try_from(&parsed) {
            Ok(params) => {
                params.m_cost() != self.memory_cost
                    || params.t_cost() != self.time_cost
                    || params.p_cost() != self.parallelism
            }
            Err(_) => true,
        }
    }

    fn name(&self) -> &'static str {
        "argon2"
    }
}

/// bcrypt hasher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BcryptHasher {
    pub cost: u32,
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(12)
    }
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    fn cost_of(hash: &str) -> Option<u32> {
        let mut parts = hash.split('$');
        parts.next()?;
        let version = parts.next()?;
        if !version.starts_with('2') {
            return None;
        }
        parts.next()?.parse().ok()
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, password: &str) -> AuthResult<String> {
        Ok(bcrypt::hash(password, self.cost)?)
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        bcrypt::verify(password, hash).unwrap_or(false)
    }

    fn needs_rehash(&self, hash: &str) -> bool {
        Self::cost_of(hash) != Some(self.cost)
    }

    fn name(&self) -> &'static str {
        "bcrypt"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Argon2,
    Bcrypt,
}

impl Algorithm {
    /// Algorithm that produced a stored hash
    pub fn detect(hash: &str) -> Option<Self> {
        if hash.starts_with("$argon2") {
            Some(Algorithm::Argon2)
        } else if BcryptHasher::cost_of(hash).is_some() {
            Some(Algorithm::Bcrypt)
        } else {
            None
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Argon2 => write!(f, "argon2"),
            Algorithm::Bcrypt => write!(f, "bcrypt"),
        }
    }
}

impl FromStr for Algorithm {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "argon2" | "argon2id" | "argon" => Ok(Algorithm::Argon2),
            "bcrypt" => Ok(Algorithm::Bcrypt),
            other => Err(AuthError::config_error(format!(
                "Unsupported hashing driver '{}'",
                other
            ))),
        }
    }
}

/// Hashes with the configured algorithm and verifies hashes from either one
#[derive(Debug, Clone, Default)]
pub struct HashManager {
    algorithm: Algorithm,
    argon2: Argon2Hasher,
    bcrypt: BcryptHasher,
}

impl HashManager {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            ..Self::default()
        }
    }

    /// Read `hashing.driver`, `hashing.argon.{memory,time,threads}` and
    /// `hashing.bcrypt.rounds`
    pub fn from_config(config: &Config) -> AuthResult<Self> {
        let algorithm = match config.get_string("hashing.driver") {
            Some(driver) => driver.parse()?,
            None => Algorithm::default(),
        };

        let defaults = Argon2Hasher::default();
        let read = |key: &str, default: u32| -> AuthResult<u32> {
            match config.get_i64(key) {
                Some(value) => u32::try_from(value)
                    .map_err(|_| AuthError::config_error(format!("'{}' is out of range", key))),
                None => Ok(default),
            }
        };
        let argon2 = Argon2Hasher::new(
            read("hashing.argon.memory", defaults.memory_cost)?,
            read("hashing.argon.time", defaults.time_cost)?,
            read("hashing.argon.threads", defaults.parallelism)?,
        );
        let bcrypt = BcryptHasher::new(read("hashing.bcrypt.rounds", BcryptHasher::default().cost)?);

        Ok(Self {
            algorithm,
            argon2,
            bcrypt,
        })
    }

    pub fn with_argon2(mut self, hasher: Argon2Hasher) -> Self {
        self.argon2 = hasher;
        self
    }

    pub fn with_bcrypt(mut self, hasher: BcryptHasher) -> Self {
        self.bcrypt = hasher;
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn hasher(&self, algorithm: Algorithm) -> &dyn PasswordHasher {
        match algorithm {
            Algorithm::Argon2 => &self.argon2,
            Algorithm::Bcrypt => &self.bcrypt,
        }
    }
}

impl PasswordHasher for HashManager {
    fn hash(&self, password: &str) -> AuthResult<String> {
        self.hasher(self.algorithm).hash(password)
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        match Algorithm::detect(hash) {
            Some(algorithm) => self.hasher(algorithm).verify(password, hash),
            None => false,
        }
    }

    fn needs_rehash(&self, hash: &str) -> bool {
        match Algorithm::detect(hash) {
            Some(algorithm) if algorithm == self.algorithm => {
                self.hasher(algorithm).needs_rehash(hash)
            }
            _ => true,
        }
    }

    fn name(&self) -> &'static str {
        self.hasher(self.algorithm).name()
    }
}
