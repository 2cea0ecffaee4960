// Cryptographic utilities: cookie sealing, state tokens, HS256 signing

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

/// Nonce size for AES-256-GCM (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Sealing key size for AES-256 (256 bits)
pub const SEALING_KEY_SIZE: usize = 32;

/// Generate a state token for CSRF protection of the authorization flow
///
/// 24 bytes (192 bits) of entropy, base64url-encoded to 32 characters.
/// Uses the same secure random source as the AES-GCM sealing.
#[must_use]
pub fn generate_state_token() -> String {
    random_urlsafe(24)
}

/// Generate an OIDC nonce bound to a single authorization request
#[must_use]
pub fn generate_flow_nonce() -> String {
    random_urlsafe(24)
}

/// Generate `length` bytes of secure random data, base64url-encoded
#[must_use]
pub fn random_urlsafe(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    rand::rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Seal any serializable value with AES-256-GCM
///
/// The value is serialized to JSON, encrypted with a random nonce, and the
/// nonce + ciphertext are base64url-encoded. The GCM tag makes the result
/// tamper-evident: any flipped byte fails `open`.
///
/// # Errors
///
/// Returns an error if serialization fails, the key length is wrong, or
/// encryption fails
pub fn seal<T: Serialize>(value: &T, key: &[u8]) -> Result<String> {
    if key.len() != SEALING_KEY_SIZE {
        return Err(anyhow!(
            "Invalid key length: expected {} bytes, got {}",
            SEALING_KEY_SIZE,
            key.len()
        ));
    }

    let json = serde_json::to_string(value).context("Failed to serialize value")?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let ciphertext = cipher
        .encrypt(nonce, json.as_bytes())
        .map_err(|e| anyhow!("AES encryption failed: {e}"))?;

    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&combined))
}

/// Open a value previously produced by [`seal`]
///
/// # Errors
///
/// Returns an error if the key length is wrong, base64 decoding fails, the
/// payload was tampered with, or deserialization fails
pub fn open<T: DeserializeOwned>(sealed: &str, key: &[u8]) -> Result<T> {
    if key.len() != SEALING_KEY_SIZE {
        return Err(anyhow!(
            "Invalid key length: expected {} bytes, got {}",
            SEALING_KEY_SIZE,
            key.len()
        ));
    }

    let combined = general_purpose::URL_SAFE_NO_PAD
        .decode(sealed)
        .context("Failed to decode base64 data")?;

    if combined.len() < NONCE_SIZE {
        return Err(anyhow!("Invalid data length"));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| anyhow!("AES decryption failed: {e}"))?;

    serde_json::from_slice(&plaintext).context("Failed to deserialize sealed value")
}

/// Derive a 32-byte sealing key from arbitrary key material
///
/// Hashes the input with SHA-256 so short or long operator-supplied secrets
/// both map onto a full-entropy AES-256 key.
#[must_use]
pub fn derive_sealing_key(input_key: &[u8]) -> [u8; SEALING_KEY_SIZE] {
    let digest = Sha256::digest(input_key);
    let mut key = [0u8; SEALING_KEY_SIZE];
    key.copy_from_slice(&digest);
    key
}

/// Constant-time equality for state tokens and other secret-adjacent strings
///
/// Length mismatch returns early; the lengths of these tokens are public.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Create an HS256-signed JWT from header and payload JSON values
///
/// # Errors
///
/// Returns an error if serialization or HMAC computation fails
pub fn create_jwt_hs256(
    header: &serde_json::Value,
    payload: &serde_json::Value,
    secret: &[u8],
) -> Result<String> {
    let header_json = serde_json::to_string(header).context("Failed to serialize JWT header")?;
    let payload_json = serde_json::to_string(payload).context("Failed to serialize JWT payload")?;

    let header_b64 = general_purpose::URL_SAFE_NO_PAD.encode(header_json.as_bytes());
    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload_json.as_bytes());

    let message = format!("{header_b64}.{payload_b64}");
    let signature = sign_hmac_sha256(message.as_bytes(), secret)?;
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(&signature);

    Ok(format!("{message}.{signature_b64}"))
}

/// Verify an HS256 JWT signature and return the decoded payload claims
///
/// Only the signature and structure are checked here; registered claims
/// (exp, iss, aud) are the caller's responsibility.
///
/// # Errors
///
/// Returns an error if the token structure is invalid or the signature
/// does not verify
pub fn verify_jwt_hs256(token: &str, secret: &[u8]) -> Result<serde_json::Value> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(anyhow!("Invalid JWT format"));
    }

    let message = format!("{}.{}", parts[0], parts[1]);
    let signature = general_purpose::URL_SAFE_NO_PAD
        .decode(parts[2])
        .context("Invalid signature encoding")?;

    use hmac::{Hmac, Mac};
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret).context("Invalid HMAC key length")?;
    mac.update(message.as_bytes());
    // verify_slice is a constant-time comparison
    mac.verify_slice(&signature)
        .map_err(|_| anyhow!("JWT signature verification failed"))?;

    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1])
        .context("Invalid payload encoding")?;
    serde_json::from_slice(&payload_bytes).context("Invalid payload JSON")
}

/// Sign a message using HMAC-SHA256
///
/// # Errors
///
/// Returns an error if HMAC computation fails
fn sign_hmac_sha256(message: &[u8], secret: &[u8]) -> Result<Vec<u8>> {
    use hmac::{Hmac, Mac};

    type HmacSha256 = Hmac<Sha256>;

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret).context("Invalid HMAC key length")?;
    mac.update(message);

    Ok(mac.finalize().into_bytes().to_vec())
}
