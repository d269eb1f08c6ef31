/// Token 自动刷新管理模块
use anyhow::{Context, Result};
use chrono::Utc;
use oauth2::basic::{BasicTokenResponse, BasicTokenType};
use oauth2::{RefreshToken, TokenResponse};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::{oauth_config::ClientConfig, storage::TokenStore};
use crate::google::oauth::oauth_client;
use crate::google::types::Credential;

/// Token 刷新阈值（提前多少秒刷新）
const REFRESH_THRESHOLD_SECS: i64 = 60;

/// Token 管理器
///
/// 每次 API 调用前重新读取凭据文件，并在 Access Token 过期时用 Refresh Token 刷新
pub struct TokenManager {
    store: Arc<TokenStore>,
    client: ClientConfig,
    credential: Mutex<Credential>,
}

impl TokenManager {
    pub fn new(store: Arc<TokenStore>, client: ClientConfig, credential: Credential) -> Self {
        Self {
            store,
            client,
            credential: Mutex::new(credential),
        }
    }

    /// 获取有效的 Access Token
    ///
    /// # Errors
    /// - Token 刷新失败
    /// - 刷新后的凭据保存失败
    pub async fn access_token(&self) -> Result<String> {
        let mut credential = self.credential.lock().await;

        // 文件可能已被其他进程更新
        match self.store.load() {
            Ok(latest) => *credential = latest,
            Err(e) => tracing::debug!("重新读取凭据失败，使用内存中的凭据: {}", e),
        }

        if credential.is_expiring(chrono::Duration::seconds(REFRESH_THRESHOLD_SECS)) {
            match credential.refresh_token.clone() {
                Some(refresh_token) => {
                    tracing::info!("Access Token 即将过期，自动刷新");

                    let refreshed = self.refresh(&refresh_token).await?;
                    self.store
                        .save(&refreshed)
                        .context("保存刷新后的凭据失败")?;
                    *credential = refreshed;

                    tracing::info!("✅ Access Token 刷新成功");
                }
                None => tracing::warn!("⚠️ Access Token 已过期且没有 Refresh Token，继续使用旧 Token"),
            }
        }

        Ok(credential.access_token.clone())
    }

    /// 使用 Refresh Token 交换新的 Access Token
    async fn refresh(&self, refresh_token: &str) -> Result<Credential> {
        let client = oauth_client(&self.client, None)?;

        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| {
                let error_msg = e.to_string();
                if error_msg.contains("invalid_grant") {
                    tracing::error!(
                        "❌ Refresh Token 已过期或被撤销，请删除凭据文件后重新授权: {}",
                        self.store.path().display()
                    );
                }
                anyhow::anyhow!("Refresh Token 交换失败: {}", error_msg)
            })?;

        Ok(credential_from_response(&response, Some(refresh_token)))
    }
}

/// 把 Token 端点响应转换为凭据
///
/// 刷新响应通常不带 refresh_token，此时沿用 `previous_refresh`
pub(crate) fn credential_from_response(
    response: &BasicTokenResponse,
    previous_refresh: Option<&str>,
) -> Credential {
    let token_type = match response.token_type() {
        BasicTokenType::Bearer => "Bearer".to_string(),
        BasicTokenType::Mac => "MAC".to_string(),
        BasicTokenType::Extension(other) => other.clone(),
    };

    let refresh_token = response
        .refresh_token()
        .map(|t| t.secret().to_string())
        .or_else(|| previous_refresh.map(str::to_string));

    // 超出 chrono 可表示范围的 expires_in 按无过期时间处理
    let expiry = response
        .expires_in()
        .and_then(|d| chrono::Duration::from_std(d).ok())
        .and_then(|d| Utc::now().checked_add_signed(d));

    Credential {
        access_token: response.access_token().secret().to_string(),
        token_type,
        refresh_token,
        expiry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::test_support::{MockServer, token_json};
    use chrono::Duration;

    fn client_config(token_uri: &str) -> ClientConfig {
        ClientConfig {
            client_id: "test-client".to_string(),
            client_secret: Some("test-secret".to_string()),
            auth_uri: "http://127.0.0.1:9/auth".to_string(),
            token_uri: token_uri.to_string(),
            redirect_uris: vec![],
        }
    }

    fn credential(access: &str, refresh: Option<&str>, expires_in: Duration) -> Credential {
        Credential {
            access_token: access.to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: refresh.map(str::to_string),
            expiry: Some(Utc::now() + expires_in),
        }
    }

    #[tokio::test]
    async fn test_token_within_threshold_is_refreshed() {
        let server = MockServer::start(vec![(200, token_json("fresh", None))]);
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TokenStore::new(dir.path().join("token")));
        let expiring = credential("soon", Some("rt"), Duration::seconds(30));
        store.save(&expiring).unwrap();

        let manager = TokenManager::new(
            store,
            client_config(&format!("{}/token", server.base_url)),
            expiring,
        );
        assert_eq!(manager.access_token().await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_huge_expires_in_does_not_panic() {
        let server = MockServer::start(vec![(
            200,
            r#"{"access_token":"x","token_type":"Bearer","expires_in":10000000000000000}"#
                .to_string(),
        )]);
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TokenStore::new(dir.path().join("token")));
        let expired = credential("stale", Some("rt"), -Duration::hours(1));
        store.save(&expired).unwrap();

        let manager = TokenManager::new(
            store.clone(),
            client_config(&format!("{}/token", server.base_url)),
            expired,
        );
        assert_eq!(manager.access_token().await.unwrap(), "x");

        let saved = store.load().unwrap();
        assert_eq!(saved.access_token, "x");
        assert!(saved.expires_at().is_none());
        assert_eq!(saved.refresh_token.as_deref(), Some("rt"));
    }

    #[tokio::test]
    async fn test_valid_token_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TokenStore::new(dir.path().join("token")));
        let valid = credential("valid", Some("rt"), Duration::hours(1));
        store.save(&valid).unwrap();

        // token_uri 指向不可用地址，若发生刷新则会失败
        let manager = TokenManager::new(store, client_config("http://127.0.0.1:9/token"), valid);
        assert_eq!(manager.access_token().await.unwrap(), "valid");
    }

    #[tokio::test]
    async fn test_rereads_store_before_use() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TokenStore::new(dir.path().join("token")));
        store
            .save(&credential("on-disk", None, Duration::hours(1)))
            .unwrap();

        let manager = TokenManager::new(
            store,
            client_config("http://127.0.0.1:9/token"),
            credential("in-memory", None, Duration::hours(1)),
        );
        assert_eq!(manager.access_token().await.unwrap(), "on-disk");
    }

    #[tokio::test]
    async fn test_missing_store_uses_memory() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TokenStore::new(dir.path().join("missing")));

        let manager = TokenManager::new(
            store,
            client_config("http://127.0.0.1:9/token"),
            credential("in-memory", None, Duration::hours(1)),
        );
        assert_eq!(manager.access_token().await.unwrap(), "in-memory");
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_saved() {
        let server = MockServer::start(vec![(200, token_json("fresh", None))]);
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TokenStore::new(dir.path().join("token")));
        let expired = credential("stale", Some("keep-me"), -Duration::hours(1));
        store.save(&expired).unwrap();

        let manager = TokenManager::new(
            store.clone(),
            client_config(&format!("{}/token", server.base_url)),
            expired,
        );
        assert_eq!(manager.access_token().await.unwrap(), "fresh");

        let request = server.next_request();
        assert!(request.body.contains("grant_type=refresh_token"));
        assert!(request.body.contains("refresh_token=keep-me"));

        let saved = store.load().unwrap();
        assert_eq!(saved.access_token, "fresh");
        assert_eq!(saved.refresh_token.as_deref(), Some("keep-me"));
        assert!(!saved.is_expiring(Duration::minutes(30)));
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TokenStore::new(dir.path().join("token")));
        let expired = credential("stale", None, -Duration::hours(1));
        store.save(&expired).unwrap();

        let manager = TokenManager::new(store, client_config("http://127.0.0.1:9/token"), expired);
        assert_eq!(manager.access_token().await.unwrap(), "stale");
    }

    #[tokio::test]
    async fn test_refresh_failure_is_error() {
        let server = MockServer::start(vec![(
            400,
            r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#
                .to_string(),
        )]);
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TokenStore::new(dir.path().join("token")));
        let expired = credential("stale", Some("revoked"), -Duration::hours(1));
        store.save(&expired).unwrap();

        let manager = TokenManager::new(
            store.clone(),
            client_config(&format!("{}/token", server.base_url)),
            expired,
        );
        assert!(manager.access_token().await.is_err());
        // 失败时不覆盖已有凭据
        assert_eq!(store.load().unwrap().access_token, "stale");
    }
}
