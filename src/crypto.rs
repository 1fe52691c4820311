// =====================================================================================
// AES-256-GCM 凭据加密
// =====================================================================================

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroize;

/// 派生密钥时拼接在密钥种子之后的固定盐值
const KEY_SALT: &[u8] = b"notebook-settings-salt-v1";
const NONCE_LEN: usize = 12;
const CURRENT_VERSION: u8 = 2;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("AES-GCM 加密失败")]
    Encrypt,
    #[error("AES-GCM 解密失败（密钥不匹配或数据损坏）")]
    Decrypt,
    #[error("Base64 解码失败: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("nonce 长度无效，预期12字节，实际{0}")]
    NonceLength(usize),
    #[error("不支持的加密格式版本: {0:?}")]
    UnsupportedVersion(Option<u8>),
    #[error("解密结果不是合法的 UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("密钥无效")]
    InvalidKey,
}

/// 落库的密文记录，字段均为 Base64
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub ciphertext: String,
    pub nonce: String,
    #[serde(default)]
    pub version: Option<u8>,
}

impl EncryptedData {
    pub fn to_json(&self) -> String {
        // 只含字符串和整数字段，序列化不会失败
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(value: &str) -> Option<Self> {
        serde_json::from_str(value).ok()
    }
}

pub struct CryptoService {
    key: [u8; 32],
    ephemeral: bool,
}

impl Drop for CryptoService {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for CryptoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoService")
            .field("fingerprint", &self.fingerprint())
            .field("ephemeral", &self.ephemeral)
            .finish()
    }
}

impl CryptoService {
    /// 由配置的密钥种子派生主密钥；未配置时生成仅本进程有效的随机密钥
    pub fn from_secret(secret: Option<&str>) -> Self {
        match secret.map(str::trim).filter(|s| !s.is_empty()) {
            Some(secret) => {
                let service = Self {
                    key: derive_key(secret),
                    ephemeral: false,
                };
                tracing::info!("🔐 [Crypto] 主密钥已派生，指纹: {}...", service.fingerprint());
                service
            }
            None => {
                let mut key = [0u8; 32];
                OsRng.fill_bytes(&mut key);
                tracing::warn!(
                    "🔐 [Crypto] 未配置 ENCRYPTION_KEY，使用随机临时密钥；重启后已保存的密钥将无法解密"
                );
                Self {
                    key,
                    ephemeral: true,
                }
            }
        }
    }

    /// 密钥是否为进程内随机生成
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    fn fingerprint(&self) -> String {
        let fp = Sha256::digest(self.key);
        format!("{:02x}{:02x}{:02x}{:02x}", fp[0], fp[1], fp[2], fp[3])
    }

    fn cipher(&self) -> Result<Aes256Gcm, CryptoError> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|_| CryptoError::InvalidKey)
    }

    fn generate_nonce() -> [u8; NONCE_LEN] {
        let mut bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut bytes);
        bytes
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedData, CryptoError> {
        let nonce_bytes = Self::generate_nonce();
        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        Ok(EncryptedData {
            ciphertext: general_purpose::STANDARD.encode(ciphertext),
            nonce: general_purpose::STANDARD.encode(nonce_bytes),
            version: Some(CURRENT_VERSION),
        })
    }

    pub fn decrypt(&self, data: &EncryptedData) -> Result<String, CryptoError> {
        // 早期记录没有 version 字段，格式与 v2 相同
        if !matches!(data.version, None | Some(CURRENT_VERSION)) {
            return Err(CryptoError::UnsupportedVersion(data.version));
        }
        let nonce_bytes = general_purpose::STANDARD.decode(&data.nonce)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CryptoError::NonceLength(nonce_bytes.len()));
        }
        let ciphertext = general_purpose::STANDARD.decode(&data.ciphertext)?;
        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| CryptoError::Decrypt)?;
        Ok(String::from_utf8(plaintext)?)
    }

    /// 加密-解密自检
    pub fn verify_key_integrity(&self) -> Result<bool, CryptoError> {
        let probe = "integrity-check";
        let encrypted = self.encrypt(probe)?;
        Ok(self.decrypt(&encrypted)? == probe)
    }
}

fn derive_key(secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(KEY_SALT);
    let digest = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    key
}
