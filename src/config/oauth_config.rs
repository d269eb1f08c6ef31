/// OAuth2 客户端配置读取模块
///
/// 读取 Google Cloud Console 下载的客户端密钥 JSON（`installed` 或 `web` 段）
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Google 默认授权端点
pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google 默认 Token 端点
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// OAuth2 客户端配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientConfig {
    /// Google OAuth2 客户端 ID
    pub client_id: String,

    /// Google OAuth2 客户端密钥
    #[serde(default)]
    pub client_secret: Option<String>,

    /// 授权端点
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,

    /// Token 端点
    #[serde(default = "default_token_uri")]
    pub token_uri: String,

    /// 已登记的重定向地址
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// 客户端密钥文件的外层结构
#[derive(Debug, Deserialize)]
struct SecretsFile {
    installed: Option<ClientConfig>,
    web: Option<ClientConfig>,
}

impl ClientConfig {
    /// 从客户端密钥文件加载
    ///
    /// 文件缺失或无法解析都是致命错误
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("读取客户端密钥文件失败: {}", path.display()))?;

        let config = Self::from_json(&content)
            .with_context(|| format!("解析客户端密钥文件失败: {}", path.display()))?;

        tracing::info!("✅ 加载 OAuth2 客户端配置: {}", path.display());
        Ok(config)
    }

    /// 解析客户端密钥 JSON
    pub fn from_json(content: &str) -> Result<Self> {
        let file: SecretsFile = serde_json::from_str(content)?;

        let config = file
            .installed
            .or(file.web)
            .ok_or_else(|| anyhow::anyhow!("客户端密钥缺少 installed 或 web 段"))?;

        if config.client_id.trim().is_empty() {
            anyhow::bail!("客户端密钥中 client_id 为空");
        }

        Ok(config)
    }
}
