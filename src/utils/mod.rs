/// 系统集成与网络工具
pub mod browser;
pub mod http_client;
