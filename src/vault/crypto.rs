use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};

// ---------------------------------------------------------------------------
// Master key
// ---------------------------------------------------------------------------

/// Parse a hex-encoded 32-byte master key (64 hex chars).
pub fn parse_master_key(hex_str: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| anyhow::anyhow!("invalid SARABI_MASTER_KEY hex: {e}"))?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|v: Vec<u8>| anyhow::anyhow!("SARABI_MASTER_KEY must be 32 bytes, got {}", v.len()))?;
    Ok(key)
}

/// Derive a deterministic dev-mode key (NOT for production).
pub fn dev_master_key() -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"sarabi-dev-master-key-not-for-production");
    let result = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&result);
    key
}

/// Load the key from a hex file under the data directory, generating it on
/// first use. The file should be backed up off-host: without it encrypted
/// variables are unrecoverable.
pub async fn load_or_generate(data_dir: &std::path::Path) -> anyhow::Result<[u8; 32]> {
    let path = data_dir.join("sarabi.aes");
    if let Ok(content) = tokio::fs::read_to_string(&path).await {
        return parse_master_key(&content);
    }

    let mut key = [0u8; 32];
    rand::fill(&mut key);

    tokio::fs::create_dir_all(data_dir).await?;
    tokio::fs::write(&path, hex::encode(key)).await?;
    tracing::info!(path = %path.display(), "generated new master key");
    Ok(key)
}

// ---------------------------------------------------------------------------
// Encrypt / Decrypt
// ---------------------------------------------------------------------------

/// Encrypt a variable value with AES-256-GCM. Output is
/// `hex(nonce (12) || ciphertext || tag)`, suitable for a TEXT column.
pub fn encrypt(plaintext: &str, master_key: &[u8; 32]) -> anyhow::Result<String> {
    let cipher = Aes256Gcm::new_from_slice(master_key)
        .map_err(|e| anyhow::anyhow!("failed to create cipher: {e}"))?;

    let mut nonce_bytes = [0u8; 12];
    rand::fill(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| anyhow::anyhow!("encryption failed: {e}"))?;

    let mut payload = Vec::with_capacity(12 + ciphertext.len());
    payload.extend_from_slice(&nonce_bytes);
    payload.extend_from_slice(&ciphertext);
    Ok(hex::encode(payload))
}

/// Decrypt a value produced by [`encrypt`].
pub fn decrypt(encoded: &str, master_key: &[u8; 32]) -> anyhow::Result<String> {
    let encrypted = hex::decode(encoded)?;
    if encrypted.len() < 12 {
        anyhow::bail!("encrypted data too short (need at least 12 bytes for nonce)");
    }

    let cipher = Aes256Gcm::new_from_slice(master_key)
        .map_err(|e| anyhow::anyhow!("failed to create cipher: {e}"))?;

    let nonce = Nonce::from_slice(&encrypted[..12]);
    let plaintext = cipher
        .decrypt(nonce, &encrypted[12..])
        .map_err(|e| anyhow::anyhow!("decryption failed (wrong key or corrupted data): {e}"))?;

    String::from_utf8(plaintext).map_err(|e| anyhow::anyhow!("value is not valid UTF-8: {e}"))
}
