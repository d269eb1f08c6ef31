/// 获取-格式化-过滤流水线
///
/// 生产者任务获取联系人并逐行发送，消费者任务过滤后立即写出。
/// 两者通过有界通道连接，生产者丢弃发送端即表示结束。
use anyhow::{Context, Result};
use std::future::Future;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::google::types::Contact;

pub mod format;

pub use format::QueryFilter;

/// 通道容量（接近无缓冲管道）
const CHANNEL_CAPACITY: usize = 1;

/// 退出码：有匹配
pub const EXIT_MATCH: u8 = 0;

/// 退出码：没有匹配
pub const EXIT_NO_MATCH: u8 = 1;

/// 通道中的一行
#[derive(Debug)]
enum Line {
    /// 状态信息，不参与过滤
    Status(String),
    /// 联系人输出行
    Entry(String),
}

/// 流水线选项
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// 是否先输出一行状态信息
    pub status_line: bool,
}

/// 流水线结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// 生成的输出行数
    pub produced: usize,

    /// 匹配并输出的行数
    pub matched: usize,
}

impl Outcome {
    pub fn printed(&self) -> bool {
        self.matched > 0
    }

    pub fn exit_code(&self) -> u8 {
        if self.printed() {
            EXIT_MATCH
        } else {
            EXIT_NO_MATCH
        }
    }
}

/// 运行流水线
///
/// # Errors
/// - 获取联系人失败（生产者返回错误）
/// - 写出失败
pub async fn run<F, W>(
    fetch: F,
    filter: &QueryFilter,
    options: PipelineOptions,
    out: &mut W,
) -> Result<Outcome>
where
    F: Future<Output = Result<Vec<Contact>>> + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
    let producer = tokio::spawn(produce(fetch, options, tx));

    let mut outcome = Outcome::default();
    while let Some(line) = rx.recv().await {
        match line {
            Line::Status(text) => write_line(out, &text).await?,
            Line::Entry(text) => {
                outcome.produced += 1;
                if filter.matches(&text) {
                    write_line(out, &text).await?;
                    outcome.matched += 1;
                }
            }
        }
    }

    let fetched = producer.await.context("联系人获取任务异常退出")??;
    tracing::debug!(
        "流水线结束：{} 个联系人，{} 行，匹配 {} 行",
        fetched,
        outcome.produced,
        outcome.matched
    );

    Ok(outcome)
}

/// 生产者：获取联系人并逐行发送
///
/// 返回获取到的联系人数量
async fn produce<F>(fetch: F, options: PipelineOptions, tx: mpsc::Sender<Line>) -> Result<usize>
where
    F: Future<Output = Result<Vec<Contact>>>,
{
    let contacts = fetch.await?;
    tracing::info!("✅ 获取到 {} 个联系人", contacts.len());

    if options.status_line {
        let status = format!("fetched {} contacts\tOK", contacts.len());
        if tx.send(Line::Status(status)).await.is_err() {
            return Ok(contacts.len());
        }
    }

    // 没有邮箱的联系人不能用于地址补全
    for contact in contacts.iter().filter(|c| !c.emails.is_empty()) {
        for line in format::format_contact(contact) {
            if tx.send(Line::Entry(line)).await.is_err() {
                tracing::debug!("输出端已关闭，停止发送");
                return Ok(contacts.len());
            }
        }
    }

    Ok(contacts.len())
}

async fn write_line<W>(out: &mut W, text: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(text.as_bytes())
        .await
        .context("写入标准输出失败")?;
    out.write_all(b"\n").await.context("写入标准输出失败")?;
    out.flush().await.context("写入标准输出失败")?;
    Ok(())
}
