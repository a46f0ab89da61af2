//! 口令加密
//! PBKDF2-SHA256 派生 AES-256-GCM 密钥，每次加密使用新的盐与随机数，
//! 输出 `{ ciphertext, iv, salt }`（均为 base64）

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{ShieldError, ShieldResult};

/// 默认迭代次数
pub const PBKDF2_ITERATIONS: u32 = 100_000;
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// 加密结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub ciphertext: String,
    pub iv: String,
    pub salt: String,
}

/// 口令加密器
#[derive(Debug, Clone, Copy)]
pub struct ChatEncryption {
    iterations: u32,
}

impl Default for ChatEncryption {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatEncryption {
    pub fn new() -> Self {
        Self {
            iterations: PBKDF2_ITERATIONS,
        }
    }

    /// 自定义迭代次数（至少为 1）
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    fn derive_key(&self, passphrase: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, self.iterations, &mut *key);
        key
    }

    pub fn encrypt_message(&self, plaintext: &str, passphrase: &str) -> ShieldResult<EncryptedPayload> {
        let mut salt = [0u8; SALT_LEN];
        getrandom::fill(&mut salt).map_err(|e| ShieldError::RandomFailure(e.to_string()))?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        getrandom::fill(&mut nonce_bytes).map_err(|e| ShieldError::RandomFailure(e.to_string()))?;

        let key = self.derive_key(passphrase, &salt);
        let cipher = Aes256Gcm::new(key.as_ref().into());
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| ShieldError::Encryption(e.to_string()))?;

        Ok(EncryptedPayload {
            ciphertext: BASE64.encode(ciphertext),
            iv: BASE64.encode(nonce_bytes),
            salt: BASE64.encode(salt),
        })
    }

    /// 解密；口令错误或密文被篡改统一返回 `Decryption`
    pub fn decrypt_message(&self, payload: &EncryptedPayload, passphrase: &str) -> ShieldResult<String> {
        let salt = BASE64.decode(&payload.salt)?;
        let nonce_bytes = BASE64.decode(&payload.iv)?;
        let ciphertext = BASE64.decode(&payload.ciphertext)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(ShieldError::InvalidInput(format!(
                "随机数长度应为 {}，实际为 {}",
                NONCE_LEN,
                nonce_bytes.len()
            )));
        }

        let key = self.derive_key(passphrase, &salt);
        let cipher = Aes256Gcm::new(key.as_ref().into());
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| ShieldError::Decryption)?;
        String::from_utf8(plaintext).map_err(|_| ShieldError::Decryption)
    }

    /// 加密任意可序列化的历史记录（JSON）
    pub fn encrypt_history<T: Serialize + ?Sized>(&self, history: &T, passphrase: &str) -> ShieldResult<EncryptedPayload> {
        let json = Zeroizing::new(serde_json::to_string(history)?);
        self.encrypt_message(&json, passphrase)
    }

    pub fn decrypt_history<T: DeserializeOwned>(&self, payload: &EncryptedPayload, passphrase: &str) -> ShieldResult<T> {
        let json = Zeroizing::new(self.decrypt_message(payload, passphrase)?);
        Ok(serde_json::from_str(&json)?)
    }
}
