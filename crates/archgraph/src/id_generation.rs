//! Hash-based identifier generation.
//!
//! Nodes created without an explicit id, snapshots and simulations all get
//! short collision-resistant identifiers of the form `{prefix}-{hash}`, where
//! the hash is the base36 encoding of a SHA-256 digest over the seed content,
//! the current time and a nonce.
//!
//! # Example
//!
//! ```
//! use archgraph::id_generation::{IdGenerator, IdGeneratorConfig};
//!
//! let mut generator = IdGenerator::new(IdGeneratorConfig {
//!     prefix: "mod".to_string(),
//!     collection_size: 12,
//! });
//!
//! let id = generator.generate(&["UserService", "service"]).unwrap();
//! assert!(archgraph::id_generation::validate_id(&id, "mod"));
//! ```

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

const BASE36_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const MAX_NONCE: u32 = 100;
const MAX_LENGTH: usize = 8;

/// Errors that can occur during ID generation
#[derive(Debug, Error)]
pub enum IdGenerationError {
    /// Unable to generate a unique ID after exhausting all nonces and length increases
    #[error("Unable to generate unique ID after {attempts} attempts")]
    CollisionExhausted {
        /// Number of nonces tried
        attempts: u32,
    },

    /// Invalid length parameter
    #[error("Length must be greater than 0")]
    InvalidLength,
}

/// Configuration for ID generation
#[derive(Debug, Clone)]
pub struct IdGeneratorConfig {
    /// Prefix for all IDs (e.g., "mod", "snap")
    pub prefix: String,

    /// Number of entities already in the collection (affects adaptive length)
    pub collection_size: usize,
}

/// Hash-based ID generator with collision detection
#[derive(Debug)]
pub struct IdGenerator {
    config: IdGeneratorConfig,
    existing_ids: HashSet<String>,
}

impl IdGenerator {
    /// Create a new ID generator with the given configuration
    #[must_use]
    pub fn new(config: IdGeneratorConfig) -> Self {
        Self {
            config,
            existing_ids: HashSet::new(),
        }
    }

    /// Create a generator that avoids every id in `existing`
    pub fn with_existing<I, S>(prefix: &str, existing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let existing_ids: HashSet<String> = existing.into_iter().map(Into::into).collect();
        Self {
            config: IdGeneratorConfig {
                prefix: prefix.to_string(),
                collection_size: existing_ids.len(),
            },
            existing_ids,
        }
    }

    /// Register an existing ID to prevent collisions
    pub fn register_id(&mut self, id: impl Into<String>) {
        self.existing_ids.insert(id.into());
    }

    /// Generate a new unique ID from the given seed parts
    ///
    /// # Errors
    ///
    /// Returns an error if every nonce collides at every allowed length.
    pub fn generate(&mut self, seed: &[&str]) -> Result<String, IdGenerationError> {
        let content = seed.join("|");
        let mut id_length = self.adaptive_length();

        while id_length <= MAX_LENGTH {
            for nonce in 0..MAX_NONCE {
                let id = self.generate_hash_id(&content, nonce, id_length)?;
                if self.existing_ids.insert(id.clone()) {
                    if nonce > 0 {
                        debug!(nonce, id_length, "Generated unique ID after collision retries");
                    }
                    return Ok(id);
                }
            }

            warn!(
                id_length,
                max_nonce = MAX_NONCE,
                "All nonces exhausted, increasing ID length"
            );
            id_length += 1;
        }

        Err(IdGenerationError::CollisionExhausted {
            attempts: MAX_NONCE,
        })
    }

    fn generate_hash_id(
        &self,
        content: &str,
        nonce: u32,
        length: usize,
    ) -> Result<String, IdGenerationError> {
        let timestamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(format!("{content}|{timestamp}|{nonce}").as_bytes());
        let hash_bytes = hasher.finalize();

        let hash_str = encode_base36(&hash_bytes[..8], length)?;
        Ok(format!("{}-{}", self.config.prefix, hash_str))
    }

    /// Determine ID length based on collection size
    ///
    /// - 0-500 entities: 4 chars
    /// - 501-1,500: 5 chars
    /// - 1,500+: 6 chars
    fn adaptive_length(&self) -> usize {
        match self.config.collection_size {
            0..=500 => 4,
            501..=1500 => 5,
            _ => 6,
        }
    }
}

/// Encode up to eight bytes as a fixed-length base36 string.
fn encode_base36(bytes: &[u8], length: usize) -> Result<String, IdGenerationError> {
    if length == 0 {
        return Err(IdGenerationError::InvalidLength);
    }

    let mut n: u64 = 0;
    for &byte in bytes {
        n = n.wrapping_shl(8).wrapping_add(u64::from(byte));
    }

    let mut result = Vec::with_capacity(length);
    while result.len() < length {
        result.push(BASE36_CHARS[(n % 36) as usize] as char);
        n /= 36;
    }
    result.reverse();

    Ok(result.into_iter().collect())
}

/// Check that `id` has the `{prefix}-{hash}` shape this module produces.
#[must_use]
pub fn validate_id(id: &str, prefix: &str) -> bool {
    let Some(hash) = id
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
    else {
        return false;
    };

    (4..=MAX_LENGTH).contains(&hash.len())
        && hash
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_base36_encoding_has_requested_length() {
        let result = encode_base36(&[0x12, 0x34, 0x56, 0x78], 5).unwrap();
        assert_eq!(result.len(), 5);
        assert!(result.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_base36_rejects_zero_length() {
        assert!(matches!(
            encode_base36(&[1], 0),
            Err(IdGenerationError::InvalidLength)
        ));
    }

    #[rstest]
    #[case::small(10, 4)]
    #[case::boundary(500, 4)]
    #[case::medium(1000, 5)]
    #[case::large(5000, 6)]
    fn test_adaptive_length(#[case] size: usize, #[case] expected: usize) {
        let generator = IdGenerator::new(IdGeneratorConfig {
            prefix: "mod".to_string(),
            collection_size: size,
        });
        assert_eq!(generator.adaptive_length(), expected);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let mut generator = IdGenerator::with_existing("mod", Vec::<String>::new());
        let ids: HashSet<String> = (0..200)
            .map(|_| generator.generate(&["same", "seed"]).unwrap())
            .collect();
        assert_eq!(ids.len(), 200);
        assert!(ids.iter().all(|id| validate_id(id, "mod")));
    }

    #[rstest]
    #[case::valid("snap-a3f8", true)]
    #[case::wrong_prefix("mod-a3f8", false)]
    #[case::too_short("snap-a3", false)]
    #[case::uppercase("snap-A3F8", false)]
    #[case::no_hyphen("snapa3f8", false)]
    fn test_validate_id(#[case] id: &str, #[case] expected: bool) {
        assert_eq!(validate_id(id, "snap"), expected);
    }
}
