use std::fmt;
use std::sync::Mutex;

use crate::error::{Error, Result};

/// One API key from the pool, tagged with its position for logging.
#[derive(Clone)]
pub struct Credential {
    index: usize,
    total: usize,
    secret: String,
}

impl Credential {
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Human label like `Key 2/3 (...x9Qa)`; never exposes more than four characters.
    pub fn fingerprint(&self) -> String {
        let tail: String = self
            .secret
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("Key {}/{} (...{})", self.index + 1, self.total, tail)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

/// Ordered API keys consumed left to right. The index only moves forward.
pub struct CredentialPool {
    secrets: Vec<String>,
    index: Mutex<usize>,
}

impl CredentialPool {
    pub fn new<I, S>(secrets: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let secrets: Vec<String> = secrets
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if secrets.is_empty() {
            return Err(Error::NoCredentials);
        }
        Ok(Self {
            secrets,
            index: Mutex::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    pub fn position(&self) -> usize {
        *self.index.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current(&self) -> Result<Credential> {
        let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        self.credential_at(*index)
    }

    /// Moves to the next key. Once past the last key the pool stays exhausted.
    pub fn advance(&self) -> Result<Credential> {
        let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        if *index < self.secrets.len() {
            *index += 1;
        }
        self.credential_at(*index)
    }

    fn credential_at(&self, index: usize) -> Result<Credential> {
        let secret = self.secrets.get(index).ok_or(Error::PoolExhausted {
            total: self.secrets.len(),
        })?;
        Ok(Credential {
            index,
            total: self.secrets.len(),
            secret: secret.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_blank_secrets() {
        assert!(matches!(
            CredentialPool::new(Vec::<String>::new()),
            Err(Error::NoCredentials)
        ));
        assert!(matches!(
            CredentialPool::new([" ", ""]),
            Err(Error::NoCredentials)
        ));
    }

    #[test]
    fn advance_walks_keys_in_order_then_exhausts() {
        let pool = CredentialPool::new(["alpha", " beta ", "", "gamma"]).unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.current().unwrap().secret(), "alpha");
        assert_eq!(pool.advance().unwrap().secret(), "beta");
        assert_eq!(pool.current().unwrap().secret(), "beta");
        assert_eq!(pool.advance().unwrap().secret(), "gamma");

        assert!(matches!(
            pool.advance(),
            Err(Error::PoolExhausted { total: 3 })
        ));
        assert!(matches!(pool.current(), Err(Error::PoolExhausted { .. })));
        // Exhaustion is permanent and the index never runs past the length.
        assert!(pool.advance().is_err());
        assert_eq!(pool.position(), 3);
    }

    #[test]
    fn fingerprint_hides_all_but_last_four_characters() {
        let pool = CredentialPool::new(["AIzaSyVerySecretKey9Qa"]).unwrap();
        let key = pool.current().unwrap();
        assert_eq!(key.fingerprint(), "Key 1/1 (...y9Qa)");
        assert!(!format!("{key:?}").contains("Secret"));
    }
}
