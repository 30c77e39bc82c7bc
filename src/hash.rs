// src/hash.rs

//! Content fingerprinting for snapshots and manifest digests
//!
//! Two algorithm variants co-exist:
//! - **SHA-256**: the current manifest digest algorithm
//! - **SHA-1**: kept for legacy manifest digests only
//!
//! Both are deterministic functions of content alone; nothing in this
//! module looks at filesystem metadata.

use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    /// SHA-256 (256-bit), the current digest algorithm
    #[default]
    Sha256,

    /// SHA-1 (160-bit), legacy digest algorithm
    ///
    /// Only produced so existing feeds carrying legacy digests keep
    /// verifying; never the sole digest on a new feed.
    Sha1,
}

impl HashAlgorithm {
    /// Hash output length in bytes
    #[inline]
    pub const fn output_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha1 => 20,
        }
    }

    /// Hash output length as a hex string
    #[inline]
    pub const fn hex_len(&self) -> usize {
        self.output_len() * 2
    }

    /// Algorithm name as used in prefixed digest strings
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha1 => "sha1",
        }
    }

    /// Whether this algorithm is only kept for legacy digests
    #[inline]
    pub const fn is_legacy(&self) -> bool {
        matches!(self, Self::Sha1)
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha1" | "sha-1" => Ok(Self::Sha1),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Hash value validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Unknown hash algorithm name
    UnknownAlgorithm(String),
    /// Hash string has wrong length for algorithm
    InvalidLength { expected: usize, got: usize },
    /// Hash string contains invalid hex characters
    InvalidHex(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAlgorithm(name) => write!(f, "unknown hash algorithm: {}", name),
            Self::InvalidLength { expected, got } => {
                write!(f, "invalid hash length: expected {}, got {}", expected, got)
            }
            Self::InvalidHex(s) => write!(f, "invalid hex in hash: {}", s),
        }
    }
}

impl std::error::Error for HashError {}

impl From<HashError> for crate::error::Error {
    fn from(err: HashError) -> Self {
        crate::error::Error::Parse(err.to_string())
    }
}

/// A hash value with its algorithm
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash {
    /// The algorithm used
    pub algorithm: HashAlgorithm,
    /// The hash value as a lowercase hex string
    pub value: String,
}

impl Hash {
    /// Create a new validated hash value
    pub fn new(algorithm: HashAlgorithm, value: impl Into<String>) -> Result<Self, HashError> {
        let value = value.into();
        let expected_len = algorithm.hex_len();

        if value.len() != expected_len {
            return Err(HashError::InvalidLength {
                expected: expected_len,
                got: value.len(),
            });
        }

        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex(value));
        }

        Ok(Self {
            algorithm,
            value: value.to_lowercase(),
        })
    }

    fn new_unchecked(algorithm: HashAlgorithm, value: String) -> Self {
        Self { algorithm, value }
    }

    /// The hash value as a hex string
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Format as a prefixed string (e.g. "sha256:abc123...")
    pub fn to_prefixed_string(&self) -> String {
        format!("{}:{}", self.algorithm.name(), self.value)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Incremental hasher over a selectable algorithm
pub struct Hasher {
    algorithm: HashAlgorithm,
    state: HasherState,
}

enum HasherState {
    Sha256(Sha256),
    Sha1(Sha1),
}

impl Hasher {
    /// Create a new hasher with the specified algorithm
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            HashAlgorithm::Sha1 => HasherState::Sha1(Sha1::new()),
        };
        Self { algorithm, state }
    }

    /// Update the hasher with more data
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha256(hasher) => hasher.update(data),
            HasherState::Sha1(hasher) => hasher.update(data),
        }
    }

    /// Finalize and return the hash
    pub fn finalize(self) -> Hash {
        let value = match self.state {
            HasherState::Sha256(hasher) => hex::encode(hasher.finalize()),
            HasherState::Sha1(hasher) => hex::encode(hasher.finalize()),
        };
        Hash::new_unchecked(self.algorithm, value)
    }

    /// The algorithm being used
    #[inline]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

/// Compute hash of a byte slice
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Hash {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Compute hash of data from a reader
///
/// Streams in 8 KB chunks, never buffering the whole input.
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<Hash> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        let hash = hash_bytes(HashAlgorithm::Sha256, b"Hello, World!");

        assert_eq!(hash.algorithm, HashAlgorithm::Sha256);
        assert_eq!(
            hash.value,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[test]
    fn test_sha1_known_value() {
        let hash = hash_bytes(HashAlgorithm::Sha1, b"Hello, World!");

        assert_eq!(hash.algorithm, HashAlgorithm::Sha1);
        assert_eq!(hash.value, "0a0a9f2a6772942557ab5355d76af442f8f65e01");
        assert_eq!(hash.value.len(), 40);
    }

    #[test]
    fn test_hasher_incremental() {
        let full_hash = hash_bytes(HashAlgorithm::Sha256, b"Hello, World!");

        let mut hasher = Hasher::new(HashAlgorithm::Sha256);
        hasher.update(b"Hello, ");
        hasher.update(b"World!");
        let incremental_hash = hasher.finalize();

        assert_eq!(full_hash, incremental_hash);
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!(
            "sha256".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Sha256
        );
        assert_eq!(
            "SHA-1".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Sha1
        );
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_hash_validation() {
        let hash = Hash::new(
            HashAlgorithm::Sha256,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f",
        );
        assert!(hash.is_ok());

        let hash = Hash::new(HashAlgorithm::Sha256, "abc123");
        assert!(matches!(hash, Err(HashError::InvalidLength { .. })));

        let hash = Hash::new(
            HashAlgorithm::Sha256,
            "gggg6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f",
        );
        assert!(matches!(hash, Err(HashError::InvalidHex(_))));
    }

    #[test]
    fn test_hash_reader_matches_bytes() {
        let data = b"Hello, World!";
        let mut cursor = std::io::Cursor::new(data);

        let hash = hash_reader(HashAlgorithm::Sha256, &mut cursor).unwrap();
        let expected = hash_bytes(HashAlgorithm::Sha256, data);

        assert_eq!(hash, expected);
    }

    #[test]
    fn test_prefixed_display() {
        let hash = hash_bytes(HashAlgorithm::Sha1, b"test");
        assert!(hash.to_prefixed_string().starts_with("sha1:"));
        assert_eq!(format!("{}", hash), hash.value);
    }

    #[test]
    fn test_legacy_flag() {
        assert!(HashAlgorithm::Sha1.is_legacy());
        assert!(!HashAlgorithm::Sha256.is_legacy());
        assert_eq!(HashAlgorithm::default(), HashAlgorithm::Sha256);
    }
}
