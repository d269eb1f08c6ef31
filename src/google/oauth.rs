/// Google OAuth2 授权流程
///
/// 优先使用缓存凭据；缓存缺失或损坏时走浏览器授权码流程（带 PKCE）
use anyhow::{Context, Result};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenUrl,
};
use std::collections::HashMap;
use std::future::Future;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tiny_http::{Header, Response, Server};
use tokio::sync::oneshot;
use url::Url;

use crate::config::oauth_config::ClientConfig;
use crate::config::storage::{TokenStore, TokenStoreError};
use crate::google::token::credential_from_response;
use crate::google::types::Credential;
use crate::utils::browser::BrowserOpener;

/// 固定的 state 参数
const ANTI_FORGERY_STATE: &str = "csrf";

/// 本地回调服务器只监听回环地址
const CALLBACK_HOST: &str = "127.0.0.1";

/// 授权完成页面
const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>授权成功 - contacts-query</title>
</head>
<body>
    <pre>授权完成，可以关闭此页面。</pre>
</body>
</html>"#;

/// 授权失败页面
const ERROR_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>授权失败 - contacts-query</title>
</head>
<body>
    <pre>授权未完成，可以关闭此页面并重新运行 contacts-query。</pre>
</body>
</html>"#;

/// 交互式授权方式
pub trait InteractiveFlow {
    fn authorize(&self, client: &ClientConfig) -> impl Future<Output = Result<Credential>>;
}

/// 授权器：先读缓存，失败再交互授权并保存结果
pub struct Authorizer<F> {
    store: Arc<TokenStore>,
    flow: F,
}

impl<F: InteractiveFlow> Authorizer<F> {
    pub fn new(store: Arc<TokenStore>, flow: F) -> Self {
        Self { store, flow }
    }

    /// 获取凭据
    ///
    /// 缓存凭据不做过期检查，刷新由 `TokenManager` 负责
    ///
    /// # Errors
    /// - 交互授权失败
    /// - 凭据保存失败
    pub async fn authorize(&self, client: &ClientConfig) -> Result<Credential> {
        match self.store.load() {
            Ok(credential) => {
                tracing::info!("✅ 使用缓存的凭据: {}", self.store.path().display());
                return Ok(credential);
            }
            Err(e @ TokenStoreError::Malformed { .. }) => {
                tracing::warn!("⚠️ {}，重新授权", e);
            }
            Err(e) => {
                tracing::info!("{}，开始交互授权", e);
            }
        }

        let credential = self.flow.authorize(client).await?;

        self.store.save(&credential).context("保存凭据失败")?;
        tracing::info!("✅ 凭据已保存: {}", self.store.path().display());

        Ok(credential)
    }
}

/// 浏览器授权码流程
pub struct BrowserFlow {
    opener: Box<dyn BrowserOpener>,
    scopes: Vec<String>,
    callback_timeout: Option<Duration>,
}

impl BrowserFlow {
    pub fn new(opener: Box<dyn BrowserOpener>, scopes: Vec<String>) -> Self {
        Self {
            opener,
            scopes,
            callback_timeout: None,
        }
    }

    /// 设置等待回调的超时时间，`None` 表示一直等待
    pub fn with_callback_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.callback_timeout = timeout;
        self
    }
}

impl InteractiveFlow for BrowserFlow {
    /// 完整流程：
    /// 1. 启动本地回调服务器（临时端口）
    /// 2. 生成授权 URL
    /// 3. 打开浏览器
    /// 4. 等待回调并验证 state
    /// 5. 交换 Token
    async fn authorize(&self, client: &ClientConfig) -> Result<Credential> {
        tracing::info!("🔐 开始 OAuth2 授权流程");

        // 步骤 1：启动本地服务器
        let server = Server::http((CALLBACK_HOST, 0))
            .map_err(|e| anyhow::anyhow!("无法启动本地回调服务器: {}", e))?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .ok_or_else(|| anyhow::anyhow!("本地回调服务器没有 IP 地址"))?;
        let redirect_uri = format!("http://{}:{}", CALLBACK_HOST, port);
        tracing::debug!("本地回调服务器: {}", redirect_uri);

        // 步骤 2：生成授权 URL
        let (auth_url, pkce_verifier) = build_auth_url(client, &redirect_uri, &self.scopes)?;
        tracing::debug!("授权 URL: {}", auth_url);

        let server = Arc::new(server);
        let (code_tx, code_rx) = oneshot::channel();
        let server_handle = {
            let server = server.clone();
            std::thread::spawn(move || serve_callback(&server, code_tx))
        };

        // 步骤 3：打开浏览器
        if let Err(e) = self.opener.open(auth_url.as_str()) {
            server.unblock();
            return Err(anyhow::Error::new(e)
                .context(format!("无法打开浏览器，授权 URL: {}", auth_url)));
        }
        tracing::info!("✅ 浏览器已打开，等待用户授权...");

        // 步骤 4：等待回调
        let received = wait_for_callback(code_rx, self.callback_timeout).await;
        server.unblock();
        server_handle
            .join()
            .map_err(|_| anyhow::anyhow!("回调服务器线程 panic"))?;

        let callback = received?;
        if callback.state.as_deref() != Some(ANTI_FORGERY_STATE) {
            anyhow::bail!("CSRF 验证失败：state 不匹配");
        }
        tracing::info!("✅ 收到授权回调");

        // 步骤 5：交换 Token
        let oauth = oauth_client(client, Some(&redirect_uri))?;
        let token_response = oauth
            .exchange_code(AuthorizationCode::new(callback.code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| anyhow::anyhow!("Token 交换失败: {}", e))?;

        tracing::info!("✅ Token 交换成功");
        Ok(credential_from_response(&token_response, None))
    }
}

/// 根据客户端配置构建 OAuth2 客户端
pub(crate) fn oauth_client(config: &ClientConfig, redirect_uri: Option<&str>) -> Result<BasicClient> {
    let client = BasicClient::new(
        ClientId::new(config.client_id.clone()),
        config.client_secret.clone().map(ClientSecret::new),
        AuthUrl::new(config.auth_uri.clone()).context("auth_uri 无效")?,
        Some(TokenUrl::new(config.token_uri.clone()).context("token_uri 无效")?),
    );

    match redirect_uri {
        Some(uri) => Ok(client.set_redirect_uri(
            RedirectUrl::new(uri.to_string()).context("redirect_uri 无效")?,
        )),
        None => Ok(client),
    }
}

/// 生成授权 URL（offline access + PKCE）
fn build_auth_url(
    config: &ClientConfig,
    redirect_uri: &str,
    scopes: &[String],
) -> Result<(Url, PkceCodeVerifier)> {
    let client = oauth_client(config, Some(redirect_uri))?;
    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (auth_url, _state) = client
        .authorize_url(|| CsrfToken::new(ANTI_FORGERY_STATE.to_string()))
        .add_scopes(scopes.iter().map(|s| Scope::new(s.clone())))
        .add_extra_param("access_type", "offline")
        .set_pkce_challenge(pkce_challenge)
        .url();

    Ok((auth_url, pkce_verifier))
}

/// 回调携带的参数
#[derive(Debug, Clone, PartialEq, Eq)]
struct Callback {
    code: String,
    state: Option<String>,
}

async fn wait_for_callback(
    code_rx: oneshot::Receiver<Result<Callback>>,
    timeout: Option<Duration>,
) -> Result<Callback> {
    let received = match timeout {
        Some(timeout) => tokio::time::timeout(timeout, code_rx)
            .await
            .context("授权超时：用户未在规定时间内完成授权")?,
        None => code_rx.await,
    };

    received.map_err(|_| anyhow::anyhow!("本地回调服务器在收到授权码前关闭"))?
}

/// 处理回调请求
///
/// 带 code 的请求把授权码交给等待方；不带 code 的请求视为关闭信号。
/// 只处理一个请求。
fn serve_callback(server: &Server, code_tx: oneshot::Sender<Result<Callback>>) {
    let Some(request) = server.incoming_requests().next() else {
        tracing::debug!("本地回调服务器已停止");
        return;
    };

    tracing::debug!("收到回调请求: {}", request.url());
    let mut params = query_params(request.url());

    let (page, result) = match params.remove("code") {
        Some(code) => (
            SUCCESS_HTML,
            Ok(Callback {
                code,
                state: params.remove("state"),
            }),
        ),
        None => {
            let reason = match params.remove("error") {
                Some(error) => anyhow::anyhow!("用户拒绝授权: {}", error),
                None => anyhow::anyhow!("回调缺少 code 参数，停止等待"),
            };
            (ERROR_HTML, Err(reason))
        }
    };

    if let Err(e) = request.respond(html_response(page)) {
        tracing::warn!("回复浏览器失败: {}", e);
    }

    code_tx.send(result).ok();
}

/// 解析请求路径中的 query 参数
fn query_params(path: &str) -> HashMap<String, String> {
    Url::parse(&format!("http://{}{}", CALLBACK_HOST, path))
        .map(|url| url.query_pairs().into_owned().collect())
        .unwrap_or_default()
}

fn html_response(body: &str) -> Response<Cursor<Vec<u8>>> {
    let response = Response::from_string(body);
    match Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}
