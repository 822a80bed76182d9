//! Field-level encryption for sensitive report fields
//!
//! Each sensitive field is hybrid-encrypted on its own (EC01 format):
//! - ephemeral secp256k1 key + ECDH with the recipient public key
//! - HKDF-SHA256 derives a one-off ChaCha20-Poly1305 key
//! - the blob is base64 encoded for JSON transport
//!
//! Only the recipient public key is held client-side. Plaintext length is not
//! bounded by the curve, only by `MAX_FIELD_PLAINTEXT`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use libsecp256k1::{PublicKey, SecretKey};
use rand::RngCore;
use sha2::Sha256;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

use crate::error::CryptoError;
use crate::types::{FieldValue, FileMeta, FormSnapshot};

/// Magic bytes for ECDH + ChaCha20 format
const ECDH_MAGIC: &[u8; 4] = b"EC01";

/// HKDF info string binding derived keys to this format
const HKDF_INFO: &[u8] = b"witness-intake:v1:ecdh";

const HEADER_SIZE: usize = 4; // EC01
const PUBKEY_SIZE: usize = 33; // compressed pubkey
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16; // Poly1305 tag
const MIN_BLOB_SIZE: usize = HEADER_SIZE + PUBKEY_SIZE + NONCE_SIZE + TAG_SIZE;

/// Largest plaintext accepted for a single field
pub const MAX_FIELD_PLAINTEXT: usize = 200 * 1024; // 200 KB

/// Key under which the attachment listing is sealed
pub const ATTACHMENT_LISTING_FIELD: &str = "files";

/// Fields that never leave the client in plaintext
pub const SENSITIVE_FIELDS: &[&str] = &[
    "submitterName",
    "submitterEmail",
    "submitterPhone",
    "incidentDescription",
    "peopleInvolved",
    ATTACHMENT_LISTING_FIELD,
    "violationOtherDescription",
    "agencyUnknownDescription",
    "outcomeOtherDescription",
];

pub fn is_sensitive(field: &str) -> bool {
    SENSITIVE_FIELDS.contains(&field)
}

/// Where the recipient key comes from at startup
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Hex-encoded compressed secp256k1 public key
    PublicKeyHex(String),
    /// Fresh key pair; the secret half is handed back once and not retained
    Generate,
}

/// Parse a hex-encoded private key
pub fn parse_private_key(hex_str: &str) -> Result<SecretKey, CryptoError> {
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| CryptoError::InvalidKey(format!("invalid hex: {}", e)))?;
    SecretKey::parse_slice(&bytes)
        .map_err(|e| CryptoError::InvalidKey(format!("invalid private key: {:?}", e)))
}

/// Parse a hex-encoded compressed public key
pub fn parse_public_key(hex_str: &str) -> Result<PublicKey, CryptoError> {
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| CryptoError::InvalidKey(format!("invalid hex: {}", e)))?;
    PublicKey::parse_slice(&bytes, None)
        .map_err(|e| CryptoError::InvalidKey(format!("invalid public key: {:?}", e)))
}

/// Generate a recipient key pair
pub fn generate_key_pair() -> (SecretKey, PublicKey) {
    let secret = SecretKey::random(&mut rand::thread_rng());
    let public = PublicKey::from_secret_key(&secret);
    (secret, public)
}

/// Sealed output of one submission: plaintext and encrypted halves
#[derive(Debug, Default)]
pub struct SealedFields {
    pub plaintext: BTreeMap<String, FieldValue>,
    pub encrypted: BTreeMap<String, String>,
}

/// Recipient public key plus the fixed sensitive-field policy
#[derive(Debug, Clone)]
pub struct FieldCrypto {
    public_key: Option<PublicKey>,
    key_id: String,
}

impl FieldCrypto {
    /// Initialize from a key source.
    ///
    /// Returns the generated secret when the source is `Generate`.
    pub fn initialize(
        source: &KeySource,
        key_id: &str,
    ) -> Result<(Self, Option<SecretKey>), CryptoError> {
        match source {
            KeySource::PublicKeyHex(hex_str) => {
                let public_key = parse_public_key(hex_str)?;
                info!("Encryption initialized with key {}", key_id);
                Ok((Self::with_public_key(public_key, key_id), None))
            }
            KeySource::Generate => {
                let (secret, public_key) = generate_key_pair();
                info!("Encryption initialized with generated key {}", key_id);
                Ok((Self::with_public_key(public_key, key_id), Some(secret)))
            }
        }
    }

    pub fn with_public_key(public_key: PublicKey, key_id: &str) -> Self {
        Self {
            public_key: Some(public_key),
            key_id: key_id.to_string(),
        }
    }

    /// Crypto with no key loaded; every encryption fails
    pub fn unavailable(key_id: &str) -> Self {
        Self {
            public_key: None,
            key_id: key_id.to_string(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.public_key.is_some()
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn public_key_hex(&self) -> Option<String> {
        self.public_key
            .as_ref()
            .map(|key| hex::encode(key.serialize_compressed()))
    }

    /// Encrypt one field value into a base64 EC01 blob
    pub fn encrypt_field(&self, plaintext: &str) -> Result<String, CryptoError> {
        let public_key = self
            .public_key
            .as_ref()
            .ok_or(CryptoError::EncryptionUnavailable)?;

        if plaintext.len() > MAX_FIELD_PLAINTEXT {
            return Err(CryptoError::EncryptionFailure(format!(
                "plaintext too large: {} bytes (max: {} bytes)",
                plaintext.len(),
                MAX_FIELD_PLAINTEXT
            )));
        }

        let blob = encrypt_ecdh(public_key, plaintext.as_bytes())?;
        Ok(BASE64.encode(blob))
    }

    /// Split collected fields into plaintext and encrypted maps.
    ///
    /// Sensitive fields with empty values are dropped from both maps. A
    /// `files` entry in the snapshot is always ignored: `files` carries the
    /// sealed attachment listing when there are attachments and is absent
    /// otherwise. Any failure aborts the whole split.
    pub fn seal_fields(
        &self,
        fields: &FormSnapshot,
        attachments: &[FileMeta],
    ) -> Result<SealedFields, CryptoError> {
        if !self.is_ready() {
            return Err(CryptoError::EncryptionUnavailable);
        }

        let mut sealed = SealedFields::default();

        for (name, value) in fields.iter() {
            if name == ATTACHMENT_LISTING_FIELD {
                continue;
            }
            if !is_sensitive(name) {
                sealed.plaintext.insert(name.clone(), value.clone());
                continue;
            }
            if value.is_empty() {
                debug!("Skipping empty sensitive field {}", name);
                continue;
            }

            let plaintext = value
                .to_plaintext()
                .map_err(|e| CryptoError::EncryptionFailure(e.to_string()))?;
            let blob = self.encrypt_field(&plaintext).map_err(|e| {
                error!("Encryption error on {}: {}", name, e);
                e
            })?;
            sealed.encrypted.insert(name.clone(), blob);
        }

        if !attachments.is_empty() {
            let listing = serde_json::to_string(attachments)
                .map_err(|e| CryptoError::EncryptionFailure(e.to_string()))?;
            let blob = self.encrypt_field(&listing)?;
            sealed
                .encrypted
                .insert(ATTACHMENT_LISTING_FIELD.to_string(), blob);
        }

        debug!(
            "Sealed {} encrypted and {} plaintext fields",
            sealed.encrypted.len(),
            sealed.plaintext.len()
        );
        Ok(sealed)
    }
}

/// Decrypt a base64 EC01 blob back to the field text (recipient side)
pub fn decrypt_field(secret: &SecretKey, blob_b64: &str) -> Result<String, CryptoError> {
    let encrypted = BASE64
        .decode(blob_b64)
        .map_err(|e| CryptoError::DecryptionFailure(format!("invalid base64: {}", e)))?;
    let plaintext = decrypt_blob(secret, &encrypted)?;
    String::from_utf8(plaintext)
        .map_err(|e| CryptoError::DecryptionFailure(format!("invalid UTF-8: {}", e)))
}

/// Decrypt every blob of an `encryptedFields` map
pub fn open_fields(
    secret: &SecretKey,
    encrypted: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, CryptoError> {
    encrypted
        .iter()
        .map(|(name, blob)| Ok((name.clone(), decrypt_field(secret, blob)?)))
        .collect()
}

/// Decrypt raw EC01 bytes
pub fn decrypt_blob(secret: &SecretKey, encrypted: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if encrypted.len() <= HEADER_SIZE || &encrypted[0..HEADER_SIZE] != ECDH_MAGIC {
        return Err(CryptoError::DecryptionFailure(
            "Invalid encryption format: expected EC01 magic bytes".into(),
        ));
    }
    decrypt_ecdh(secret, encrypted)
}

/// Encrypt data using ECDH + ChaCha20-Poly1305 (EC01 format)
///
/// Format: EC01 (4) || ephemeral_pubkey (33) || nonce (12) || ciphertext+tag
fn encrypt_ecdh(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut rng = rand::thread_rng();
    let ephemeral_secret = SecretKey::random(&mut rng);
    let ephemeral_pubkey = PublicKey::from_secret_key(&ephemeral_secret);

    // ECDH: shared_point = recipient_pubkey * ephemeral_privkey
    let mut shared_point = recipient.clone();
    shared_point
        .tweak_mul_assign(&ephemeral_secret)
        .map_err(|e| CryptoError::EncryptionFailure(format!("ECDH failed: {:?}", e)))?;
    let key = derive_key(&shared_point).map_err(CryptoError::EncryptionFailure)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce_bytes);

    let cipher = ChaCha20Poly1305::new_from_slice(&key)
        .map_err(|e| CryptoError::EncryptionFailure(format!("Failed to create cipher: {:?}", e)))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| CryptoError::EncryptionFailure(format!("ChaCha20-Poly1305: {:?}", e)))?;

    let mut blob = Vec::with_capacity(MIN_BLOB_SIZE + plaintext.len());
    blob.extend_from_slice(ECDH_MAGIC);
    blob.extend_from_slice(&ephemeral_pubkey.serialize_compressed());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

fn decrypt_ecdh(secret: &SecretKey, encrypted: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if encrypted.len() < MIN_BLOB_SIZE {
        return Err(CryptoError::DecryptionFailure(format!(
            "EC01 data too short: {} bytes, need at least {}",
            encrypted.len(),
            MIN_BLOB_SIZE
        )));
    }

    // Parse ephemeral public key
    let ephemeral_pubkey_bytes = &encrypted[HEADER_SIZE..HEADER_SIZE + PUBKEY_SIZE];
    let mut shared_point = PublicKey::parse_slice(ephemeral_pubkey_bytes, None)
        .map_err(|e| CryptoError::DecryptionFailure(format!("Invalid ephemeral pubkey: {:?}", e)))?;

    // ECDH: shared_point = ephemeral_pubkey * recipient_privkey
    shared_point
        .tweak_mul_assign(secret)
        .map_err(|e| CryptoError::DecryptionFailure(format!("ECDH failed: {:?}", e)))?;
    let key = derive_key(&shared_point).map_err(CryptoError::DecryptionFailure)?;

    let nonce_start = HEADER_SIZE + PUBKEY_SIZE;
    let nonce_bytes = &encrypted[nonce_start..nonce_start + NONCE_SIZE];
    let ciphertext = &encrypted[nonce_start + NONCE_SIZE..];

    let cipher = ChaCha20Poly1305::new_from_slice(&key)
        .map_err(|e| CryptoError::DecryptionFailure(format!("Failed to create cipher: {:?}", e)))?;
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| {
            CryptoError::DecryptionFailure(format!("ChaCha20-Poly1305 decryption failed: {:?}", e))
        })
}

/// HKDF-SHA256 over the x-coordinate of the shared point
fn derive_key(shared_point: &PublicKey) -> Result<[u8; 32], String> {
    // Skip prefix byte from compressed encoding
    let shared_compressed = shared_point.serialize_compressed();
    let shared_x = &shared_compressed[1..];

    let hk = Hkdf::<Sha256>::new(None, shared_x);
    let mut key = [0u8; 32];
    hk.expand(HKDF_INFO, &mut key)
        .map_err(|_| "HKDF expand failed".to_string())?;
    Ok(key)
}
