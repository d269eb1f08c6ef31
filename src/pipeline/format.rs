/// 输出行格式与查询过滤
use crate::google::types::Contact;

/// 把联系人转换为输出行：每个邮箱一行 `email\tname\t`
///
/// 没有名称时使用邮箱 `@` 之前的部分
pub fn format_contact(contact: &Contact) -> Vec<String> {
    contact
        .emails
        .iter()
        .map(|email| {
            let name = contact
                .display_name
                .as_deref()
                .unwrap_or_else(|| local_part(email));
            format!("{}\t{}\t", email, name)
        })
        .collect()
}

fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// 子串查询
#[derive(Debug, Clone)]
pub struct QueryFilter {
    needle: String,
    ignore_case: bool,
}

impl QueryFilter {
    pub fn new(query: &str, ignore_case: bool) -> Self {
        let needle = if ignore_case {
            query.to_lowercase()
        } else {
            query.to_string()
        };
        Self {
            needle,
            ignore_case,
        }
    }

    /// 空查询匹配所有行
    pub fn matches(&self, line: &str) -> bool {
        if self.needle.is_empty() {
            return true;
        }
        if self.ignore_case {
            line.to_lowercase().contains(&self.needle)
        } else {
            line.contains(&self.needle)
        }
    }
}
