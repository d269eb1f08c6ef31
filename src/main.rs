//! mutt `query_command`：查询 Google 联系人
//!
//! 用法（muttrc）：`set query_command = "contacts-query '%s'"`

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

mod config;
mod google;
mod pipeline;
mod utils;

use crate::config::Settings;
use crate::config::oauth_config::ClientConfig;
use crate::config::storage::TokenStore;
use crate::google::{Authorizer, BrowserFlow, PeopleClient, TokenManager};
use crate::pipeline::{Outcome, PipelineOptions, QueryFilter};

/// 致命错误退出码（与“没有匹配”区分）
const EXIT_FATAL: u8 = 2;

/// 查询 Google 联系人，输出 `email<TAB>name<TAB>` 供邮件客户端补全地址
#[derive(Parser, Debug)]
#[command(name = "contacts-query", version, about)]
struct Cli {
    /// 查询字符串（子串匹配，为空时输出全部）
    #[arg(default_value = "")]
    query: String,

    /// 忽略大小写
    #[arg(short, long)]
    ignore_case: bool,

    /// 不输出首行状态信息
    #[arg(long)]
    no_status: bool,

    /// 配置文件路径
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// 凭据缓存文件
    #[arg(long, value_name = "PATH")]
    token_file: Option<PathBuf>,

    /// Google 客户端密钥 JSON
    #[arg(long, value_name = "PATH")]
    secrets_file: Option<PathBuf>,

    /// 提高日志级别（可重复）
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logger(cli.verbose) {
        eprintln!("初始化日志失败: {:#}", e);
        return ExitCode::from(EXIT_FATAL);
    }

    match run(cli).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            tracing::error!("{}", fatal_message(&e));
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(cli: Cli) -> Result<Outcome> {
    // 1. 配置
    let settings = load_settings(&cli)?;
    let client = ClientConfig::load(&settings.secrets_file)?;

    // 2. 授权
    let store = Arc::new(TokenStore::new(&settings.token_file));
    let flow = BrowserFlow::new(
        utils::browser::system_opener(settings.browser.as_deref()),
        settings.scopes.clone(),
    )
    .with_callback_timeout(settings.callback_timeout_secs.map(Duration::from_secs));

    let credential = Authorizer::new(store.clone(), flow)
        .authorize(&client)
        .await
        .context("OAuth2 授权失败")?;

    // 3. 获取并过滤
    let tokens = TokenManager::new(store, client, credential);
    let people = PeopleClient::new(tokens, settings.api_base_url.clone(), settings.page_size);

    let filter = QueryFilter::new(&cli.query, cli.ignore_case);
    let options = PipelineOptions {
        status_line: settings.status_line,
    };

    let mut stdout = tokio::io::stdout();
    pipeline::run(
        async move { people.fetch_all().await },
        &filter,
        options,
        &mut stdout,
    )
    .await
}

/// 致命错误的日志文本
///
/// 日志的文件与行号总是指向 `main`，出错位置靠完整的 Caused by 链定位
fn fatal_message(e: &anyhow::Error) -> String {
    format!("{:?}", e)
}

/// 配置文件与环境变量之上再叠加命令行参数
fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;

    if let Some(path) = &cli.token_file {
        settings.token_file = path.clone();
    }
    if let Some(path) = &cli.secrets_file {
        settings.secrets_file = path.clone();
    }
    if cli.no_status {
        settings.status_line = false;
    }
    settings.normalize();

    tracing::debug!("运行配置: {:?}", settings);
    Ok(settings)
}

/// 初始化日志系统
///
/// 日志写到 stderr，stdout 只留给查询结果
fn init_logger(verbose: u8) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default_filter = match verbose {
        0 => "contacts_query=warn",
        1 => "contacts_query=info",
        _ => "contacts_query=debug,info",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()?;

    Ok(())
}
