use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod oauth_config;
pub mod storage;

/// 默认 People API 地址
pub const DEFAULT_API_BASE_URL: &str = "https://people.googleapis.com";

/// 默认单页联系人数量
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// People API 允许的最大 pageSize
const MAX_PAGE_SIZE: u32 = 1000;

/// 运行配置
///
/// 加载顺序（后者覆盖前者）：
/// 1. 内置默认值
/// 2. 配置文件（`--config` 或 `<config_dir>/contacts-query/config.toml`）
/// 3. 环境变量
/// 4. 命令行参数（由 main 负责）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// OAuth2 凭据缓存文件
    pub token_file: PathBuf,

    /// Google 客户端密钥 JSON
    pub secrets_file: PathBuf,

    /// People API 基础地址
    pub api_base_url: String,

    /// 单页联系人数量
    pub page_size: u32,

    /// 请求的 API 权限范围
    pub scopes: Vec<String>,

    /// 自定义浏览器命令（为空时按平台选择）
    pub browser: Option<String>,

    /// 是否输出首行状态信息（mutt 会把第一行当作提示信息）
    pub status_line: bool,

    /// 等待 OAuth2 回调的超时时间（秒），为空表示一直等待
    pub callback_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        let home = home_dir();
        Self {
            token_file: home.join(".contacts-token"),
            secrets_file: home.join(".contacts-secrets.json"),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            scopes: vec![
                "profile".to_string(),
                "https://www.googleapis.com/auth/contacts.readonly".to_string(),
            ],
            browser: None,
            status_line: true,
            callback_timeout_secs: None,
        }
    }
}

impl Settings {
    /// 加载配置
    ///
    /// `explicit` 为命令行指定的配置文件，必须存在；
    /// 未指定时读取默认位置，文件不存在则使用默认值。
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut settings = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::load_from_file(&path)?,
                _ => {
                    tracing::debug!("未找到配置文件，使用默认配置");
                    Self::default()
                }
            },
        };

        settings.apply_env(|key| std::env::var(key).ok());
        settings.normalize();

        Ok(settings)
    }

    /// 从 TOML 文件加载
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;

        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;

        tracing::info!("✅ 从配置文件加载: {}", path.display());
        Ok(settings)
    }

    /// 环境变量覆盖
    ///
    /// 通过闭包读取变量，便于测试时注入
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("CONTACTS_QUERY_TOKEN_FILE") {
            tracing::debug!("环境变量覆盖 token_file: {}", path);
            self.token_file = PathBuf::from(path);
        }
        if let Some(path) = lookup("CONTACTS_QUERY_SECRETS_FILE") {
            tracing::debug!("环境变量覆盖 secrets_file: {}", path);
            self.secrets_file = PathBuf::from(path);
        }
        if let Some(browser) = lookup("CONTACTS_QUERY_BROWSER") {
            self.browser = Some(browser);
        }
    }

    /// 展开 `~/`，并把 page_size 限制在 API 允许的范围内
    pub fn normalize(&mut self) {
        self.token_file = expand_home(&self.token_file);
        self.secrets_file = expand_home(&self.secrets_file);
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        self.browser = self.browser.take().filter(|b| !b.trim().is_empty());
    }
}

/// 默认配置文件路径：`<config_dir>/contacts-query/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("contacts-query").join("config.toml"))
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// 展开路径开头的 `~/`
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.token_file.ends_with(".contacts-token"));
        assert!(settings.secrets_file.ends_with(".contacts-secrets.json"));
        assert_eq!(settings.page_size, 500);
        assert!(settings.status_line);
        assert!(settings.callback_timeout_secs.is_none());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "token_file = \"/tmp/tok.json\"\npage_size = 50\nstatus_line = false\n",
        )
        .unwrap();

        let settings = Settings::load_from_file(&path).unwrap();
        assert_eq!(settings.token_file, PathBuf::from("/tmp/tok.json"));
        assert_eq!(settings.page_size, 50);
        assert!(!settings.status_line);
        // 未出现的键保持默认值
        assert_eq!(settings.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(settings.scopes.len(), 2);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Settings::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut settings = Settings {
            token_file: PathBuf::from("/from/file"),
            ..Settings::default()
        };

        let env: HashMap<&str, &str> = [
            ("CONTACTS_QUERY_TOKEN_FILE", "/from/env"),
            ("CONTACTS_QUERY_BROWSER", "firefox"),
        ]
        .into_iter()
        .collect();

        settings.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.token_file, PathBuf::from("/from/env"));
        assert_eq!(settings.browser.as_deref(), Some("firefox"));
    }

    #[test]
    fn test_normalize() {
        let mut settings = Settings {
            token_file: PathBuf::from("~/tok"),
            page_size: 0,
            browser: Some("  ".to_string()),
            ..Settings::default()
        };
        settings.normalize();

        assert!(!settings.token_file.starts_with("~"));
        assert!(settings.token_file.ends_with("tok"));
        assert_eq!(settings.page_size, 1);
        assert!(settings.browser.is_none());

        settings.page_size = 5000;
        settings.normalize();
        assert_eq!(settings.page_size, 1000);
    }
}
