//! 设备处理上下文
//!
//! 封装“我正在处理哪台设备”这一信息，主要用于日志前缀

use std::fmt::Display;

use crate::models::DeviceId;

/// 设备处理上下文
#[derive(Debug, Clone)]
pub struct DeviceCtx {
    /// 设备标识
    pub device_id: DeviceId,

    /// 设备序号（仅用于日志显示，从1开始）
    pub device_index: usize,

    /// 控制端口
    pub port: u16,
}

impl DeviceCtx {
    /// 创建新的设备上下文
    pub fn new(device_id: DeviceId, device_index: usize, port: u16) -> Self {
        Self {
            device_id,
            device_index,
            port,
        }
    }
}

impl Display for DeviceCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[设备 #{} {} 端口#{}]",
            self.device_index, self.device_id, self.port
        )
    }
}
