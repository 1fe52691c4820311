//! 配置项与 Kimi API 密钥的加密存储

use std::sync::Arc;

use crate::crypto::{CryptoService, EncryptedData};
use crate::database::Database;
use crate::models::{AppError, Setting};

pub const API_KEY_SETTING: &str = "kimi_api_key";
const MASKED_VALUE: &str = "******";

pub struct SettingsService {
    db: Arc<Database>,
    crypto: Arc<CryptoService>,
    fallback_api_keys: Vec<String>,
}

impl SettingsService {
    pub fn new(db: Arc<Database>, crypto: Arc<CryptoService>, fallback_api_keys: Vec<String>) -> Self {
        Self {
            db,
            crypto,
            fallback_api_keys,
        }
    }

    // ---------- API 密钥 ----------

    pub async fn set_api_key(&self, api_key: &str) -> Result<(), AppError> {
        self.set_setting(API_KEY_SETTING, api_key, true).await?;
        tracing::info!("🔐 Kimi API密钥已加密保存");
        Ok(())
    }

    pub async fn get_api_key(&self) -> Result<Option<String>, AppError> {
        let Some(row) = self.load(API_KEY_SETTING).await? else {
            return Ok(None);
        };
        let key = if row.encrypted {
            match self.decrypt_value(&row.value) {
                Some(key) => key,
                None => return self.recover_api_key().await,
            }
        } else {
            row.value
        };
        // 空值等同于未配置
        Ok(Some(key).filter(|k| !k.trim().is_empty()))
    }

    /// 已保存的密钥无法解密时，改用配置中的兜底凭据并重新加密落库
    async fn recover_api_key(&self) -> Result<Option<String>, AppError> {
        let Some(fallback) = self.fallback_api_keys.first().cloned() else {
            tracing::error!("❌ 已保存的API密钥无法解密，且未配置 KIMI_API_KEY / MOONSHOT_API_KEY");
            return Ok(None);
        };
        tracing::warn!("⚠️ 已保存的API密钥无法解密，改用环境变量中的密钥并覆盖数据库记录");
        self.set_setting(API_KEY_SETTING, &fallback, true).await?;
        Ok(Some(fallback))
    }

    pub async fn remove_api_key(&self) -> Result<bool, AppError> {
        let removed = self.delete_setting(API_KEY_SETTING).await?;
        if removed {
            tracing::info!("🗑️ Kimi API密钥已删除");
        }
        Ok(removed)
    }

    pub async fn has_api_key(&self) -> Result<bool, AppError> {
        Ok(self.get_api_key().await?.is_some())
    }

    // ---------- 通用配置项 ----------

    pub async fn set_setting(
        &self,
        key: &str,
        value: &str,
        encrypted: bool,
    ) -> Result<Setting, AppError> {
        let stored = if encrypted {
            self.crypto
                .encrypt(value)
                .map_err(|e| AppError::database("加密配置项失败", e))?
                .to_json()
        } else {
            value.to_string()
        };
        let key_owned = key.to_string();
        let saved = self
            .db
            .clone()
            .call(move |db| db.upsert_setting(&key_owned, &stored, encrypted))
            .await
            .map_err(|e| AppError::database("保存设置失败", e))?;
        // 返回明文副本
        Ok(Setting {
            value: value.to_string(),
            ..saved
        })
    }

    /// 读取配置项（已解密）；无法解密的加密项视为不存在
    pub async fn get_setting(&self, key: &str) -> Result<Option<Setting>, AppError> {
        let Some(row) = self.load(key).await? else {
            return Ok(None);
        };
        if !row.encrypted {
            return Ok(Some(row));
        }
        match self.decrypt_value(&row.value) {
            Some(value) => Ok(Some(Setting { value, ..row })),
            None => {
                tracing::warn!("⚠️ 配置项解密失败: {}", key);
                Ok(None)
            }
        }
    }

    pub async fn delete_setting(&self, key: &str) -> Result<bool, AppError> {
        let key = key.to_string();
        self.db
            .clone()
            .call(move |db| db.delete_setting(&key))
            .await
            .map_err(|e| AppError::database("删除设置失败", e))
    }

    /// 列出全部配置项，加密值以掩码代替
    pub async fn list_settings(&self) -> Result<Vec<Setting>, AppError> {
        let rows = self
            .db
            .clone()
            .call(|db| db.list_settings())
            .await
            .map_err(|e| AppError::database("获取设置失败", e))?;
        Ok(rows
            .into_iter()
            .map(|row| {
                if row.encrypted {
                    Setting {
                        value: MASKED_VALUE.to_string(),
                        ..row
                    }
                } else {
                    row
                }
            })
            .collect())
    }

    async fn load(&self, key: &str) -> Result<Option<Setting>, AppError> {
        let key = key.to_string();
        self.db
            .clone()
            .call(move |db| db.get_setting(&key))
            .await
            .map_err(|e| AppError::database("获取设置失败", e))
    }

    fn decrypt_value(&self, stored: &str) -> Option<String> {
        let data = EncryptedData::from_json(stored)?;
        match self.crypto.decrypt(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!("解密失败: {}", e);
                None
            }
        }
    }
}
