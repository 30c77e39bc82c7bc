// src/feed/signing.rs

//! Feed signing
//!
//! The `Signer` trait is the seam the feed builder delegates to; the
//! signature is an opaque blob from the core's point of view. The
//! shipped `Ed25519Signer` keeps key material in TOML key files with
//! base64-encoded keys, private keys at mode 0600.

use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Detached signature over a serialized feed document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSignature {
    pub algorithm: String,
    /// Signature bytes, base64
    pub signature: String,
    /// Public key bytes, base64
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Signing seam
pub trait Signer {
    /// Sign a serialized feed document
    fn sign(&self, document: &[u8]) -> Result<FeedSignature>;
}

/// Ed25519 signing key pair
#[derive(Debug)]
pub struct Ed25519Signer {
    signing_key: SigningKey,
    key_id: Option<String>,
}

impl Ed25519Signer {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            signing_key,
            key_id: None,
        }
    }

    /// Set a human-readable key identifier
    pub fn with_key_id(mut self, id: &str) -> Self {
        self.key_id = Some(id.to_string());
        self
    }

    /// The public key
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// The public key as base64
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.verifying_key().as_bytes())
    }

    /// The key ID
    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// Save the key pair to files (private and public)
    pub fn save_to_files(&self, private_path: &Path, public_path: &Path) -> Result<()> {
        let private_data = KeyFile {
            algorithm: "ed25519".to_string(),
            key: BASE64.encode(self.signing_key.to_bytes()),
            key_id: self.key_id.clone(),
        };
        let private_toml = toml::to_string_pretty(&private_data)
            .map_err(|e| Error::SigningBackend(e.to_string()))?;
        fs::write(private_path, private_toml).map_err(|e| Error::from_io(private_path, e))?;

        // Private key must not be world-readable
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(private_path)
                .map_err(|e| Error::from_io(private_path, e))?
                .permissions();
            perms.set_mode(0o600);
            fs::set_permissions(private_path, perms)
                .map_err(|e| Error::from_io(private_path, e))?;
        }

        let public_data = KeyFile {
            algorithm: "ed25519".to_string(),
            key: self.public_key_base64(),
            key_id: self.key_id.clone(),
        };
        let public_toml = toml::to_string_pretty(&public_data)
            .map_err(|e| Error::SigningBackend(e.to_string()))?;
        fs::write(public_path, public_toml).map_err(|e| Error::from_io(public_path, e))?;

        Ok(())
    }

    /// Load a key pair from a private key file
    ///
    /// A missing file is `KeyNotFound`; a malformed one is
    /// `SigningBackend`.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::KeyNotFound(path.display().to_string()));
            }
            Err(e) => return Err(Error::from_io(path, e)),
        };

        let key_file: KeyFile = toml::from_str(&content)
            .map_err(|e| Error::SigningBackend(format!("{}: {}", path.display(), e)))?;

        if key_file.algorithm != "ed25519" {
            return Err(Error::SigningBackend(format!(
                "unsupported key algorithm: {}",
                key_file.algorithm
            )));
        }

        let key_bytes = BASE64
            .decode(&key_file.key)
            .map_err(|e| Error::SigningBackend(format!("invalid base64 in key file: {}", e)))?;

        let key_array: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| Error::SigningBackend("invalid key length".to_string()))?;

        Ok(Self {
            signing_key: SigningKey::from_bytes(&key_array),
            key_id: key_file.key_id,
        })
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, document: &[u8]) -> Result<FeedSignature> {
        let signature = self.signing_key.sign(document);
        let timestamp = chrono::Utc::now().to_rfc3339();

        Ok(FeedSignature {
            algorithm: "ed25519".to_string(),
            signature: BASE64.encode(signature.to_bytes()),
            public_key: self.public_key_base64(),
            key_id: self.key_id.clone(),
            timestamp: Some(timestamp),
        })
    }
}

/// Key file format
#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    algorithm: String,
    key: String,
    #[serde(default)]
    key_id: Option<String>,
}
