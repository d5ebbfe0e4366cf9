//! 控制端口分配
//!
//! 两种策略：
//! - 探测：从起始端口开始按步长检查本机端口，返回第一个空闲的
//! - 哈希：由设备标识的稳定哈希推出端口，同一台设备每次运行尽量用同一个端口；
//!   哈希端口已被占用时分配失败，不会把同一个端口交给两个调用方
//!
//! 默认 `HashThenProbe`：先试哈希端口，不可用时退回探测。已经分配出去、还没释放的端口
//! 记录在进程内的占用表里，并发分配不会拿到同一个端口；系统层面的检查在每次分配时重新做，
//! 调用方拿到端口后应尽快绑定。

use std::collections::HashSet;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::Config;
use crate::error::PortError;
use crate::models::DeviceId;

/// 哈希端口的槽位数量
pub const HASH_SLOTS: u64 = 1000;

/// 端口分配策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortStrategy {
    Probe,
    Hash,
    HashThenProbe,
}

impl FromStr for PortStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "probe" => Ok(PortStrategy::Probe),
            "hash" => Ok(PortStrategy::Hash),
            "hash_then_probe" => Ok(PortStrategy::HashThenProbe),
            other => Err(format!("未知的端口策略: {}", other)),
        }
    }
}

/// 判断端口是否空闲
pub trait PortProbe: Send + Sync {
    fn is_free(&self, port: u16) -> bool;
}

/// 通过本机 TCP 绑定和连接检查端口
pub struct TcpPortProbe;

impl PortProbe for TcpPortProbe {
    fn is_free(&self, port: u16) -> bool {
        if TcpListener::bind(("127.0.0.1", port)).is_err() {
            return false;
        }
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        TcpStream::connect_timeout(&addr, Duration::from_millis(100)).is_err()
    }
}

/// 端口来源
pub trait PortSource: Send + Sync {
    /// 为设备分配一个端口
    fn allocate(&self, device_id: &DeviceId) -> Result<u16, PortError>;
    /// 会话结束后归还端口
    fn release(&self, port: u16);
}

/// 端口分配器
pub struct PortAllocator {
    base: u16,
    stride: u16,
    search_limit: usize,
    strategy: PortStrategy,
    probe: Arc<dyn PortProbe>,
    claimed: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    pub fn new(
        base: u16,
        stride: u16,
        search_limit: usize,
        strategy: PortStrategy,
        probe: Arc<dyn PortProbe>,
    ) -> Self {
        Self {
            base,
            stride: stride.max(1),
            search_limit,
            strategy,
            probe,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.base_port,
            config.port_stride,
            config.port_search_limit,
            config.port_strategy,
            Arc::new(TcpPortProbe),
        )
    }

    /// 由设备标识推出的端口，与进程、运行次数无关
    pub fn hashed_port(&self, device_id: &DeviceId) -> u16 {
        let digest = Sha256::digest(device_id.as_str().as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        // 起始端口靠近上限时只用放得下的槽位
        let stride = u64::from(self.stride);
        let fitting = (u64::from(u16::MAX) - u64::from(self.base)) / stride + 1;
        let slot = u64::from_be_bytes(head) % HASH_SLOTS.min(fitting);

        let port = u64::from(self.base) + slot * stride;
        u16::try_from(port).unwrap_or(u16::MAX)
    }

    /// 当前占用中的端口数
    pub fn claimed_count(&self) -> usize {
        self.claimed.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// 从起始端口按步长探测
    fn probe_from(&self, claimed: &mut HashSet<u16>) -> Result<u16, PortError> {
        let mut port = self.base;
        for _ in 0..self.search_limit {
            if !claimed.contains(&port) && self.probe.is_free(port) {
                claimed.insert(port);
                return Ok(port);
            }
            port = match port.checked_add(self.stride) {
                Some(next) => next,
                None => break,
            };
        }
        Err(PortError::Exhausted {
            base: self.base,
            attempts: self.search_limit,
        })
    }
}

impl PortSource for PortAllocator {
    fn allocate(&self, device_id: &DeviceId) -> Result<u16, PortError> {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);

        let port = match self.strategy {
            PortStrategy::Probe => self.probe_from(&mut claimed)?,
            PortStrategy::Hash => {
                let port = self.hashed_port(device_id);
                if claimed.contains(&port) || !self.probe.is_free(port) {
                    return Err(PortError::Exhausted {
                        base: port,
                        attempts: 1,
                    });
                }
                claimed.insert(port);
                port
            }
            PortStrategy::HashThenProbe => {
                let preferred = self.hashed_port(device_id);
                if !claimed.contains(&preferred) && self.probe.is_free(preferred) {
                    claimed.insert(preferred);
                    preferred
                } else {
                    debug!("[设备 {}] 哈希端口 {} 不可用，改为探测", device_id, preferred);
                    self.probe_from(&mut claimed)?
                }
            }
        };

        debug!("[设备 {}] 分配端口 {}", device_id, port);
        Ok(port)
    }

    fn release(&self, port: u16) {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&port);
    }
}
