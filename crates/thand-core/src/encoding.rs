//! Encoding wrapper and encryption envelope (spec §4.2, §6, §8 invariants 1-2)
//!
//! `Encode`/`Decode` wrap a tagged envelope (`{type, data}`) in JSON, then
//! optionally AES-256-GCM encrypt the envelope bytes (random 12-byte nonce
//! per message, itself JSON-wrapped as `{nonce, ciphertext}` with std
//! base64), then base64-URL the whole thing for transport. This mirrors the
//! envelope shape the teacher's session/task codecs use, generalized to the
//! two kinds this broker persists.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::{STANDARD as B64_STD, URL_SAFE_NO_PAD as B64_URL};
use base64::Engine;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::ThandError;

/// The two kinds of value this broker ever encodes (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    WorkflowTask,
    LocalSession,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: EnvelopeKind,
    data: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct EncryptedWire {
    nonce: String,
    ciphertext: String,
}

/// 256-bit AES-GCM key. Construct from exactly 32 bytes (e.g. derived from a
/// passphrase with a KDF upstream of this crate - key derivation is out of
/// scope here, this crate only consumes a ready key).
#[derive(Clone)]
pub struct EncryptionKey(Key<Aes256Gcm>);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(*Key::<Aes256Gcm>::from_slice(&bytes))
    }
}

/// Serializes `value` under `kind`, optionally encrypts, then base64-URLs
/// the result for transport (e.g. as an OAuth2 `state` parameter).
pub fn encode<T: Serialize>(
    value: &T,
    kind: EnvelopeKind,
    key: Option<&EncryptionKey>,
) -> Result<String, ThandError> {
    let data = serde_json::to_value(value)
        .map_err(|e| ThandError::validation(format!("failed to serialize envelope: {e}")))?;
    let envelope = Envelope { kind, data };
    let plain = serde_json::to_vec(&envelope)
        .map_err(|e| ThandError::validation(format!("failed to serialize envelope: {e}")))?;

    let bytes = match key {
        Some(key) => encrypt(&plain, key)?,
        None => plain,
    };

    Ok(B64_URL.encode(bytes))
}

/// Decodes a string produced by [`encode`]. `expected` must match the
/// envelope's embedded kind or decoding fails - this is what prevents a
/// session blob from being consumed as a workflow task (spec §4.2).
pub fn decode<T: DeserializeOwned>(
    input: &str,
    expected: EnvelopeKind,
    key: Option<&EncryptionKey>,
) -> Result<T, ThandError> {
    let raw = B64_URL
        .decode(input)
        .map_err(|e| ThandError::validation(format!("invalid base64 envelope: {e}")))?;

    let plain = match key {
        Some(key) => decrypt(&raw, key)?,
        None => raw,
    };

    let envelope: Envelope = parse_envelope(&plain)?;

    if envelope.kind != expected {
        return Err(ThandError::validation(format!(
            "envelope kind mismatch: expected {expected:?}, got {:?}",
            envelope.kind
        )));
    }

    serde_json::from_value(envelope.data)
        .map_err(|e| ThandError::validation(format!("failed to deserialize envelope data: {e}")))
}

/// Accepts JSON directly, or YAML round-tripped through JSON (spec §4.2:
/// "YAML is accepted on decode by round-tripping through JSON").
fn parse_envelope(bytes: &[u8]) -> Result<Envelope, ThandError> {
    if let Ok(env) = serde_json::from_slice::<Envelope>(bytes) {
        return Ok(env);
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ThandError::validation(format!("envelope is not valid UTF-8: {e}")))?;
    let yaml_value: serde_yaml::Value = serde_yaml::from_str(text)
        .map_err(|e| ThandError::validation(format!("envelope is neither JSON nor YAML: {e}")))?;
    let json_value: Value = serde_json::to_value(yaml_value)
        .map_err(|e| ThandError::validation(format!("failed to convert YAML envelope: {e}")))?;
    serde_json::from_value(json_value)
        .map_err(|e| ThandError::validation(format!("malformed envelope: {e}")))
}

fn encrypt(plain: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, ThandError> {
    if plain.is_empty() {
        return Err(ThandError::validation("refusing to encrypt empty plaintext"));
    }
    let cipher = Aes256Gcm::new(&key.0);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plain)
        .map_err(|e| ThandError::validation(format!("encryption failed: {e}")))?;

    let wire = EncryptedWire {
        nonce: B64_STD.encode(nonce),
        ciphertext: B64_STD.encode(ciphertext),
    };
    serde_json::to_vec(&wire)
        .map_err(|e| ThandError::validation(format!("failed to serialize encrypted wire: {e}")))
}

fn decrypt(bytes: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, ThandError> {
    let wire: EncryptedWire = serde_json::from_slice(bytes)
        .map_err(|e| ThandError::validation(format!("not a recognized encrypted envelope: {e}")))?;

    let nonce_bytes = B64_STD
        .decode(&wire.nonce)
        .map_err(|e| ThandError::validation(format!("invalid nonce encoding: {e}")))?;
    if nonce_bytes.len() != 12 {
        return Err(ThandError::validation("nonce must be 12 bytes"));
    }
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = B64_STD
        .decode(&wire.ciphertext)
        .map_err(|e| ThandError::validation(format!("invalid ciphertext encoding: {e}")))?;

    let cipher = Aes256Gcm::new(&key.0);
    cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|_| ThandError::validation("decryption failed: wrong key or corrupted envelope"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Dummy {
        name: String,
        count: u32,
    }

    fn key() -> EncryptionKey {
        EncryptionKey::from_bytes([7u8; 32])
    }

    #[test]
    fn round_trips_unencrypted() {
        let v = Dummy { name: "alice".into(), count: 3 };
        let encoded = encode(&v, EnvelopeKind::WorkflowTask, None).unwrap();
        let decoded: Dummy = decode(&encoded, EnvelopeKind::WorkflowTask, None).unwrap();
        assert_eq!(v, decoded);
    }

    #[test]
    fn round_trips_encrypted() {
        let v = Dummy { name: "bob".into(), count: 9 };
        let k = key();
        let encoded = encode(&v, EnvelopeKind::LocalSession, Some(&k)).unwrap();
        let decoded: Dummy = decode(&encoded, EnvelopeKind::LocalSession, Some(&k)).unwrap();
        assert_eq!(v, decoded);
    }

    #[test]
    fn mismatched_kind_fails() {
        let v = Dummy { name: "carol".into(), count: 1 };
        let encoded = encode(&v, EnvelopeKind::WorkflowTask, None).unwrap();
        let result: Result<Dummy, _> = decode(&encoded, EnvelopeKind::LocalSession, None);
        assert!(result.is_err());
    }

    #[test]
    fn two_encryptions_differ() {
        let v = Dummy { name: "dee".into(), count: 2 };
        let k = key();
        let a = encode(&v, EnvelopeKind::WorkflowTask, Some(&k)).unwrap();
        let b = encode(&v, EnvelopeKind::WorkflowTask, Some(&k)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_decrypt() {
        let v = Dummy { name: "eve".into(), count: 4 };
        let encoded = encode(&v, EnvelopeKind::WorkflowTask, Some(&key())).unwrap();
        let other = EncryptionKey::from_bytes([9u8; 32]);
        let result: Result<Dummy, _> = decode(&encoded, EnvelopeKind::WorkflowTask, Some(&other));
        assert!(result.is_err());
    }
}
