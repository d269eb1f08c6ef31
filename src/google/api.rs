/// People API 调用模块
///
/// 读取当前用户的联系人（只请求名称和邮箱字段）
use anyhow::{Context, Result};

use crate::google::token::TokenManager;
use crate::google::types::{Contact, ListConnectionsResponse};
use crate::utils::http_client;

/// 请求的字段
const PERSON_FIELDS: &str = "names,emailAddresses";

/// People API 客户端
pub struct PeopleClient {
    tokens: TokenManager,
    base_url: String,
    page_size: u32,
}

impl PeopleClient {
    /// # Arguments
    /// * `base_url` - API 地址，例如 `https://people.googleapis.com`
    /// * `page_size` - 单页数量（只请求第一页）
    pub fn new(tokens: TokenManager, base_url: impl Into<String>, page_size: u32) -> Self {
        Self {
            tokens,
            base_url: base_url.into(),
            page_size,
        }
    }

    /// 获取联系人
    ///
    /// 只请求一页；没有邮箱的联系人也会返回，由调用方过滤
    pub async fn fetch_all(&self) -> Result<Vec<Contact>> {
        let access_token = self
            .tokens
            .access_token()
            .await
            .context("获取 Access Token 失败")?;

        let url = format!(
            "{}/v1/people/me/connections",
            self.base_url.trim_end_matches('/')
        );
        tracing::debug!("正在获取联系人: {}", url);

        let response = http_client::get_client()
            .get(&url)
            .query(&[
                ("pageSize", self.page_size.to_string()),
                ("personFields", PERSON_FIELDS.to_string()),
            ])
            .bearer_auth(&access_token)
            .send()
            .await
            .context("请求联系人列表失败")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status == 401 {
                anyhow::bail!("Access Token 无效或已被撤销，请删除凭据文件后重新授权");
            }

            anyhow::bail!("People API 返回错误 {}: {}", status, error_text);
        }

        let list: ListConnectionsResponse =
            response.json().await.context("解析联系人列表失败")?;

        if list.next_page_token.is_some() {
            tracing::info!(
                "联系人超过一页（共 {:?} 个），只读取前 {} 个",
                list.total_people,
                self.page_size
            );
        }

        tracing::debug!("✅ 获取到 {} 个联系人", list.connections.len());
        Ok(list.connections.into_iter().map(Contact::from).collect())
    }
}
