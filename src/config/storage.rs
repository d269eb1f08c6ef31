/// OAuth2 凭据持久化存储模块
///
/// 凭据以 JSON 保存在单个文件中（默认 `$HOME/.contacts-token`）
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::google::types::Credential;

/// 凭据存储错误
#[derive(Debug, thiserror::Error)]
pub enum TokenStoreError {
    /// 文件不存在或无法打开
    #[error("凭据文件不可用: {path}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 文件内容无法解析
    #[error("凭据文件格式错误: {path}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// 读写失败
    #[error("凭据文件读写失败: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 序列化失败
    #[error("序列化凭据失败")]
    Encode(#[source] serde_json::Error),
}

/// 凭据存储
///
/// 内部持有已打开的文件句柄，`load` 在互斥锁内完成 seek + 解码，
/// 同一实例的多次读取不会交错。
pub struct TokenStore {
    path: PathBuf,
    handle: Mutex<Option<File>>,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: Mutex::new(None),
        }
    }

    /// 凭据文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取凭据
    ///
    /// 文件缺失返回 `NotFound`，内容损坏返回 `Malformed`，调用方据此回退到交互授权
    pub fn load(&self) -> Result<Credential, TokenStoreError> {
        let mut guard = self.lock();

        let mut file = match guard.take() {
            Some(file) => file,
            None => File::open(&self.path).map_err(|source| TokenStoreError::NotFound {
                path: self.path.clone(),
                source,
            })?,
        };

        // 读取失败时句柄随之丢弃，下次重新打开
        let mut content = String::new();
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_to_string(&mut content))
            .map_err(|source| TokenStoreError::NotFound {
                path: self.path.clone(),
                source,
            })?;
        *guard = Some(file);

        serde_json::from_str(&content).map_err(|source| TokenStoreError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// 保存凭据（创建或截断）
    pub fn save(&self, credential: &Credential) -> Result<(), TokenStoreError> {
        let content = serde_json::to_string(credential).map_err(TokenStoreError::Encode)?;

        let mut guard = self.lock();
        // 丢弃旧句柄，下次 load 时读取新内容
        *guard = None;

        let mut file = open_for_write(&self.path).map_err(|source| TokenStoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        file.write_all(content.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.flush())
            .map_err(|source| TokenStoreError::Io {
                path: self.path.clone(),
                source,
            })?;

        tracing::debug!("凭据已保存到: {}", self.path.display());
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<File>> {
        // 锁只保护文件句柄，中毒后内部状态依然可用
        self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 以仅所有者可读写的权限打开（Unix）
fn open_for_write(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}
