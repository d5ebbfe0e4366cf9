//! 自动化服务实例
//!
//! 每台设备独占一个服务实例，只有持有 `ServiceHandle` 的会话可以停止它。

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::ServiceError;

/// 一个正在运行的服务实例
#[async_trait]
pub trait ServiceInstance: Send {
    fn port(&self) -> u16;

    /// 服务是否已经可以接受驱动连接；进程已经退出时返回 `ServiceError::Exited`
    async fn is_ready(&mut self) -> Result<bool, ServiceError>;

    /// 停止服务并等待退出
    async fn stop(&mut self) -> Result<(), ServiceError>;

    /// 同步的尽力终止，只在句柄被丢弃而没有调用 `stop` 时使用
    fn kill(&mut self);
}

/// 服务实例的启动方式
#[async_trait]
pub trait ServiceBackend: Send + Sync {
    /// 在端口上启动服务；端口被占用时返回 `ServiceError::PortInUse`
    async fn spawn(&self, port: u16) -> Result<Box<dyn ServiceInstance>, ServiceError>;
}

/// 服务句柄
///
/// `stop` 消耗句柄，所以每个实例最多停止一次；没有调用 `stop` 就被丢弃时会强制终止。
pub struct ServiceHandle {
    port: u16,
    instance: Option<Box<dyn ServiceInstance>>,
}

impl ServiceHandle {
    pub fn new(instance: Box<dyn ServiceInstance>) -> Self {
        Self {
            port: instance.port(),
            instance: Some(instance),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn is_ready(&mut self) -> Result<bool, ServiceError> {
        match self.instance.as_mut() {
            Some(instance) => instance.is_ready().await,
            None => Ok(false),
        }
    }

    pub async fn stop(mut self) -> Result<(), ServiceError> {
        match self.instance.take() {
            Some(mut instance) => {
                info!("🛑 停止端口 {} 上的自动化服务", self.port);
                instance.stop().await
            }
            None => Ok(()),
        }
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        if let Some(mut instance) = self.instance.take() {
            warn!("⚠️ 端口 {} 上的服务未正常停止，强制终止", self.port);
            instance.kill();
        }
    }
}
