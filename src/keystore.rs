//! 钱包存储
//!
//! 单个 JSON 文件保存一把签名密钥：
//! `{label, pubkey, secret (base58, 64 字节), created (RFC 3339)}`。
//! generate / import 都直接覆盖文件，不做合并或版本管理。

use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use solana_sdk::{signature::Keypair, signer::Signer};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{AgentError, Result};

/// ed25519 secret + public key
pub const SECRET_KEY_LEN: usize = 64;

const DEFAULT_STORE_DIR: &str = ".sol-wallet-agent";
const DEFAULT_STORE_FILE: &str = "wallet.json";

#[derive(Debug, Serialize, Deserialize)]
struct WalletFile {
    label: String,
    pubkey: String,
    secret: String,
    created: DateTime<Utc>,
}

/// 默认钱包路径 `$HOME/.sol-wallet-agent/wallet.json`
pub fn default_store_path() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(DEFAULT_STORE_DIR).join(DEFAULT_STORE_FILE)
}

/// 解码 base58 secret，长度必须是 64 字节
pub fn decode_secret(secret_encoded: &str) -> Result<Keypair> {
    let bytes = bs58::decode(secret_encoded.trim())
        .into_vec()
        .map_err(|e| AgentError::Decode(format!("invalid base58 secret: {}", e)))?;

    if bytes.len() != SECRET_KEY_LEN {
        return Err(AgentError::Decode(format!(
            "secret must be {} bytes, got {}",
            SECRET_KEY_LEN,
            bytes.len()
        )));
    }

    Keypair::try_from(bytes.as_slice())
        .map_err(|e| AgentError::Decode(format!("invalid keypair bytes: {}", e)))
}

/// 钱包存储
///
/// 已加载的 keypair 以 `Arc` 共享给所有签名操作，替换时整体换掉，
/// 不会修改正在被签名使用的实例。
pub struct KeyStore {
    path: PathBuf,
    current: RwLock<Option<Arc<Keypair>>>,
}

impl KeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 当前加载的 keypair
    pub fn current(&self) -> Option<Arc<Keypair>> {
        self.current.read().clone()
    }

    /// 当前 keypair，未加载时返回 `Config` 错误
    pub fn require(&self) -> Result<Arc<Keypair>> {
        self.current()
            .ok_or_else(|| AgentError::Config("no keypair loaded".into()))
    }

    /// 生成新钱包并写盘
    pub fn generate(&self, label: &str) -> Result<Arc<Keypair>> {
        let keypair = Keypair::new();
        self.persist(&keypair, label)?;

        let keypair = Arc::new(keypair);
        *self.current.write() = Some(keypair.clone());

        info!("🔑 新钱包已生成: {}", keypair.pubkey());
        Ok(keypair)
    }

    /// 从磁盘加载；文件不存在时返回 `None`
    pub fn load(&self) -> Result<Option<Arc<Keypair>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.path)
            .map_err(|e| AgentError::CorruptStore(format!("{}: {}", self.path.display(), e)))?;
        let file: WalletFile = serde_json::from_str(&raw)
            .map_err(|e| AgentError::CorruptStore(format!("malformed wallet file: {}", e)))?;
        let keypair = decode_secret(&file.secret)
            .map_err(|e| AgentError::CorruptStore(e.to_string()))?;

        if keypair.pubkey().to_string() != file.pubkey {
            warn!("⚠️  钱包文件中的 pubkey 与 secret 不一致，以 secret 为准");
        }

        let keypair = Arc::new(keypair);
        *self.current.write() = Some(keypair.clone());

        info!("✅ 钱包已加载: {} ({})", keypair.pubkey(), file.label);
        Ok(Some(keypair))
    }

    /// 导入外部 secret 并写盘
    ///
    /// 解码失败时之前加载的 keypair 保持不变。
    pub fn import(&self, secret_encoded: &str) -> Result<Arc<Keypair>> {
        let keypair = decode_secret(secret_encoded)?;
        self.persist(&keypair, "imported")?;

        let keypair = Arc::new(keypair);
        *self.current.write() = Some(keypair.clone());

        info!("✅ 钱包已导入: {}", keypair.pubkey());
        Ok(keypair)
    }

    fn persist(&self, keypair: &Keypair, label: &str) -> Result<()> {
        let file = WalletFile {
            label: label.to_string(),
            pubkey: keypair.pubkey().to_string(),
            secret: bs58::encode(keypair.to_bytes()).into_string(),
            created: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| AgentError::Persist(e.to_string()))?;

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .map_err(|e| AgentError::Persist(format!("{}: {}", dir.display(), e)))?;
            }
        }

        fs::write(&self.path, json)
            .map_err(|e| AgentError::Persist(format!("{}: {}", self.path.display(), e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600)) {
                warn!("⚠️  无法设置钱包文件权限: {}", e);
            }
        }

        info!("💾 钱包已保存到 {}", self.path.display());
        Ok(())
    }
}
