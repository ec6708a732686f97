use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, OsRng},
};
use rand::RngCore;

use crate::error::AppError;
use crate::models::Secret;

const NONCE_LEN: usize = 12;

/// TOTPシークレットの保存用暗号化
///
/// # Security
/// - AES-256-GCM、96ビットのランダムnonceを暗号文の先頭に付与
/// - 鍵・平文はログに出力しない
#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; 32],
}

impl SecretCipher {
    /// Base64エンコードされた32バイト鍵から作成
    pub fn new(key_base64: &str) -> Result<Self, AppError> {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        let key_bytes = STANDARD.decode(key_base64).map_err(|e| {
            tracing::error!(error = ?e, "暗号化キーのBase64デコードエラー");
            AppError::Internal(anyhow::anyhow!("invalid encryption key format"))
        })?;

        let key: [u8; 32] = key_bytes.as_slice().try_into().map_err(|_| {
            tracing::error!(expected = 32, actual = key_bytes.len(), "暗号化キーの長さが不正");
            AppError::Internal(anyhow::anyhow!("encryption key must be 32 bytes"))
        })?;

        Ok(Self { key })
    }

    fn cipher(&self) -> anyhow::Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| anyhow::anyhow!("cipher initialization error: {e}"))
    }

    /// nonce (12バイト) + 暗号文 を返す
    pub fn encrypt(&self, secret: &Secret) -> anyhow::Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher()?
            .encrypt(nonce, secret.expose_bytes())
            .map_err(|e| anyhow::anyhow!("encryption error: {e}"))?;

        let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    pub fn decrypt(&self, encrypted: &[u8]) -> anyhow::Result<Secret> {
        if encrypted.len() < NONCE_LEN {
            anyhow::bail!("encrypted data too short: {} bytes", encrypted.len());
        }

        let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| anyhow::anyhow!("decryption error: {e}"))?;

        Ok(Secret::from_bytes(plaintext))
    }
}
