//! 号码记录服务 - 业务能力层
//!
//! 只负责“保存号码”能力，不关心流程

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::PhoneNumber;

/// 号码记录
///
/// 读取到号码后立即调用，后续步骤失败也不影响已保存的号码
#[async_trait]
pub trait NumberReporter: Send + Sync {
    async fn save(&self, number: &PhoneNumber) -> Result<()>;
}

/// 追加写入文本文件的号码记录
///
/// 每行格式：`时间<TAB>号码`
pub struct FileNumberReporter {
    path: String,
    // 多台设备同时写入时串行化
    lock: Mutex<()>,
}

impl FileNumberReporter {
    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl NumberReporter for FileNumberReporter {
    async fn save(&self, number: &PhoneNumber) -> Result<()> {
        debug!("写入号码: {} -> {}", number, self.path);

        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("无法打开号码文件: {}", self.path))?;

        let line = format!(
            "{}\t{}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            number
        );
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}
