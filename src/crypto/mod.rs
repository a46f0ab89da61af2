//! 加密模块
pub mod encryption;

pub use self::encryption::{ChatEncryption, EncryptedPayload, NONCE_LEN, PBKDF2_ITERATIONS, SALT_LEN};
