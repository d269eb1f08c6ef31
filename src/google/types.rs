/// Google 凭据与联系人数据结构
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth2 凭据
///
/// JSON 字段与 Go `golang.org/x/oauth2` 写出的 Token 文件一致
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// 访问令牌
    pub access_token: String,

    /// 令牌类型（通常为 Bearer）
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token_type: String,

    /// 刷新令牌
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// 过期时间（UTC）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
    /// 有效的过期时间
    ///
    /// Go 用零值时间 `0001-01-01T00:00:00Z` 表示永不过期，这里按无过期时间处理
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry.filter(|at| at.timestamp() > 0)
    }

    /// 检查 Token 是否在 `threshold` 内过期
    pub fn is_expiring(&self, threshold: chrono::Duration) -> bool {
        match self.expires_at() {
            Some(at) => at <= Utc::now() + threshold,
            None => false,
        }
    }
}

/// 一个联系人（只保留地址补全需要的字段）
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Contact {
    /// 显示名称
    pub display_name: Option<String>,

    /// 邮箱地址
    pub emails: Vec<String>,
}

/// People API `people.connections.list` 响应
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListConnectionsResponse {
    #[serde(default)]
    pub connections: Vec<Person>,

    pub next_page_token: Option<String>,

    pub total_people: Option<u32>,
}

/// People API Person 资源（按 personFields=names,emailAddresses 裁剪）
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    #[serde(default)]
    pub names: Vec<Name>,

    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Name {
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct EmailAddress {
    #[serde(default)]
    pub value: String,
}

impl From<Person> for Contact {
    fn from(person: Person) -> Self {
        // 只取第一个名字；空白名称视为没有名称
        let display_name = person
            .names
            .into_iter()
            .next()
            .map(|name| name.display_name.trim().to_string())
            .filter(|name| !name.is_empty());

        let emails = person
            .email_addresses
            .into_iter()
            .map(|addr| addr.value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect();

        Self {
            display_name,
            emails,
        }
    }
}
