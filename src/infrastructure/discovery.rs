//! 设备发现
//!
//! 调用 `adb devices`，只返回状态为 device 的条目。

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::DiscoveryError;
use crate::models::DeviceId;

/// 设备来源
#[async_trait]
pub trait DeviceSource: Send + Sync {
    /// 列出当前可控制的设备；没有设备时返回空列表
    async fn list_devices(&self) -> Result<Vec<DeviceId>, DiscoveryError>;
}

/// 基于 adb 的设备发现
pub struct AdbDiscovery {
    adb_path: PathBuf,
    sdk_root: Option<PathBuf>,
}

impl AdbDiscovery {
    pub fn new(config: &Config) -> Self {
        Self {
            adb_path: PathBuf::from(&config.adb_path),
            sdk_root: config.android_sdk_root.as_ref().map(PathBuf::from),
        }
    }
}

#[async_trait]
impl DeviceSource for AdbDiscovery {
    async fn list_devices(&self) -> Result<Vec<DeviceId>, DiscoveryError> {
        let program = self.adb_path.display().to_string();
        debug!("执行设备查询: {} devices", program);

        let mut cmd = Command::new(&self.adb_path);
        cmd.arg("devices");
        if let Some(root) = &self.sdk_root {
            cmd.env("ANDROID_HOME", root);
        }

        let output = cmd
            .output()
            .await
            .map_err(|source| DiscoveryError::Unavailable {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(DiscoveryError::ToolFailed {
                program,
                status: output.status.to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let devices = parse_device_list(&stdout);
        info!("📱 已连接设备 {} 台: {:?}", devices.len(), devices);
        Ok(devices)
    }
}

/// 解析 `adb devices` 的输出
///
/// 第一行是标题，之后每行是 `<id>\t<status>`，只保留 status 含 "device" 的行。
pub fn parse_device_list(output: &str) -> Vec<DeviceId> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.trim().split('\t');
            let id = parts.next()?.trim();
            let status = parts.next()?.trim();
            (!id.is_empty() && status.contains("device")).then(|| DeviceId::new(id))
        })
        .collect()
}
