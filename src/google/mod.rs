/// Google 模块 - OAuth2 授权与 People API 调用
pub mod api;
pub mod oauth;
pub mod token;
pub mod types;

#[cfg(test)]
mod test_support;

// 重新导出常用类型
pub use api::PeopleClient;
pub use oauth::{Authorizer, BrowserFlow};
pub use token::TokenManager;
