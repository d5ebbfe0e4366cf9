//! 设备与会话状态

use std::fmt;

use serde::{Deserialize, Serialize};

/// 设备标识（adb 序列号），对同一台物理设备保持稳定
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// 会话生命周期
///
/// `Starting → Running → (Succeeded | Failed | Banned | UnderReview) → Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Starting,
    Running,
    Succeeded,
    Failed,
    Banned,
    UnderReview,
    Closed,
}

impl SessionState {
    /// 是否是流程结束后的终态（Closed 之前）
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Succeeded
                | SessionState::Failed
                | SessionState::Banned
                | SessionState::UnderReview
        )
    }

    /// 检查状态迁移是否合法
    pub fn can_advance_to(self, next: SessionState) -> bool {
        match (self, next) {
            (SessionState::Starting, SessionState::Running) => true,
            (SessionState::Starting, SessionState::Failed) => true,
            (SessionState::Running, n) if n.is_terminal() => true,
            (s, SessionState::Closed) => s.is_terminal() || s == SessionState::Running,
            _ => false,
        }
    }
}

/// 一台被编排的设备
#[derive(Debug, Clone)]
pub struct Device {
    pub id: DeviceId,
    /// 分配到的控制端口
    pub port: u16,
    pub state: SessionState,
}

impl Device {
    pub fn new(id: DeviceId, port: u16) -> Self {
        Self {
            id,
            port,
            state: SessionState::Starting,
        }
    }

    /// 推进状态；非法迁移时保持原状态并返回 false
    pub fn advance(&mut self, next: SessionState) -> bool {
        if self.state.can_advance_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }
}
