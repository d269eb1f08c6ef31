/// 打开系统浏览器
///
/// 启动时按平台选择实现；未知平台返回明确的 `Unsupported` 错误
use std::process::{Command, Stdio};

/// 浏览器打开错误
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    /// 当前操作系统没有已知的打开方式
    #[error("不支持在 {os} 上打开浏览器")]
    Unsupported { os: String },

    /// 启动外部命令失败
    #[error("无法启动浏览器命令 {program}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// 打开 URL 的能力
pub trait BrowserOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<(), BrowserError>;
}

/// 通过外部命令打开 URL（URL 作为最后一个参数）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOpener {
    program: String,
    args: Vec<String>,
}

impl CommandOpener {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl BrowserOpener for CommandOpener {
    fn open(&self, url: &str) -> Result<(), BrowserError> {
        tracing::debug!("使用 {} 打开浏览器", self.program());

        // 只启动不等待，浏览器进程与本程序生命周期无关
        Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|source| BrowserError::Launch {
                program: self.program.clone(),
                source,
            })
    }
}

/// 未知平台
#[derive(Debug, Clone)]
pub struct UnsupportedOpener {
    os: String,
}

impl BrowserOpener for UnsupportedOpener {
    fn open(&self, _url: &str) -> Result<(), BrowserError> {
        Err(BrowserError::Unsupported {
            os: self.os.clone(),
        })
    }
}

/// 选择浏览器打开方式
///
/// `custom` 为用户配置的浏览器命令，优先使用
pub fn system_opener(custom: Option<&str>) -> Box<dyn BrowserOpener> {
    if let Some(program) = custom {
        return Box::new(CommandOpener::new(program));
    }

    let os = std::env::consts::OS;
    match opener_for_os(os) {
        Some(opener) => Box::new(opener),
        None => Box::new(UnsupportedOpener { os: os.to_string() }),
    }
}

fn opener_for_os(os: &str) -> Option<CommandOpener> {
    match os {
        "linux" | "freebsd" | "openbsd" | "netbsd" | "dragonfly" => {
            Some(CommandOpener::new("xdg-open"))
        }
        "macos" => Some(CommandOpener::new("open")),
        "windows" => Some(CommandOpener::new("rundll32").arg("url.dll,FileProtocolHandler")),
        _ => None,
    }
}
