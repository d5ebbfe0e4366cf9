//! 会话启动器 - 编排层
//!
//! 为一台设备分配端口、启动自动化服务、连接驱动。任何一步失败都不会返回
//! 半初始化的句柄：已经启动的服务会被停止，端口会被归还。

use std::sync::Arc;
use std::time::Duration;

use tokio::task;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{LaunchError, ServiceError};
use crate::infrastructure::{
    AppTarget, Driver, DriverConnector, PortSource, ServiceBackend, ServiceHandle, TimedDriver,
};
use crate::models::{Device, DeviceId, SessionState};

/// 启动参数
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    /// 就绪检查次数
    pub ready_attempts: u32,
    /// 两次就绪检查之间的间隔
    pub ready_delay: Duration,
    /// 端口被占用时最多尝试的次数
    pub launch_retries: u32,
    /// 单个驱动调用的截止时间
    pub action_timeout: Duration,
    pub target: AppTarget,
}

impl LaunchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ready_attempts: config.service_ready_attempts,
            ready_delay: config.service_ready_delay(),
            launch_retries: config.launch_retries.max(1),
            action_timeout: config.action_timeout(),
            target: AppTarget {
                package: config.app_package.clone(),
                activity: config.app_activity.clone(),
            },
        }
    }
}

/// 一台设备的会话：独占一个服务实例和一个驱动句柄
pub struct Session {
    device: Device,
    driver: Arc<dyn Driver>,
    service: ServiceHandle,
    ports: Arc<dyn PortSource>,
}

impl Session {
    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device.id
    }

    pub fn port(&self) -> u16 {
        self.device.port
    }

    pub fn state(&self) -> SessionState {
        self.device.state
    }

    pub fn driver(&self) -> Arc<dyn Driver> {
        self.driver.clone()
    }

    /// 记录流程结束时的状态
    pub fn finish(&mut self, state: SessionState) {
        if !self.device.advance(state) {
            warn!(
                "[设备 {}] 忽略非法状态迁移 {:?} → {:?}",
                self.device.id, self.device.state, state
            );
        }
    }

    /// 关闭驱动会话、停止服务、归还端口
    pub async fn close(mut self) -> Result<(), ServiceError> {
        if let Err(e) = self.driver.quit().await {
            warn!("[设备 {}] ⚠️ 关闭驱动会话失败: {}", self.device.id, e);
        }
        let result = self.service.stop().await;
        self.ports.release(self.device.port);
        self.device.advance(SessionState::Closed);
        info!("[设备 {}] 会话已关闭", self.device.id);
        result
    }
}

/// 会话启动器
pub struct SessionLauncher {
    ports: Arc<dyn PortSource>,
    backend: Arc<dyn ServiceBackend>,
    connector: Arc<dyn DriverConnector>,
    settings: LaunchSettings,
}

impl SessionLauncher {
    pub fn new(
        ports: Arc<dyn PortSource>,
        backend: Arc<dyn ServiceBackend>,
        connector: Arc<dyn DriverConnector>,
        settings: LaunchSettings,
    ) -> Self {
        Self {
            ports,
            backend,
            connector,
            settings,
        }
    }

    /// 启动服务并轮询就绪状态
    pub async fn start_service(&self, port: u16) -> Result<ServiceHandle, LaunchError> {
        let instance = self
            .backend
            .spawn(port)
            .await
            .map_err(|source| LaunchError::ServiceSpawn { port, source })?;
        let mut service = ServiceHandle::new(instance);

        let attempts = self.settings.ready_attempts;
        for attempt in 1..=attempts {
            match service.is_ready().await {
                Ok(true) => {
                    info!("✅ 自动化服务已在端口 {} 就绪", port);
                    return Ok(service);
                }
                Ok(false) => {
                    debug!("等待端口 {} 上的服务就绪 ({}/{})", port, attempt, attempts);
                    sleep(self.settings.ready_delay).await;
                }
                Err(source) => {
                    warn!("⚠️ {}", source);
                    if let Err(e) = service.stop().await {
                        warn!("⚠️ 停止已退出的服务失败: {}", e);
                    }
                    return Err(LaunchError::ServiceSpawn { port, source });
                }
            }
        }

        if let Err(e) = service.stop().await {
            warn!("⚠️ 停止未就绪的服务失败: {}", e);
        }
        Err(LaunchError::ServiceStartTimeout { port, attempts })
    }

    /// 分配端口；分配器会检查本机端口，放到阻塞线程池里执行
    async fn allocate_port(&self, device_id: &DeviceId) -> Result<u16, LaunchError> {
        let ports = self.ports.clone();
        let device_id = device_id.clone();
        let port = task::spawn_blocking(move || ports.allocate(&device_id)).await??;
        Ok(port)
    }

    /// 连接驱动，返回的句柄每个调用都带截止时间
    pub async fn attach_driver(
        &self,
        device_id: &DeviceId,
        port: u16,
    ) -> Result<Arc<dyn Driver>, LaunchError> {
        let driver = self
            .connector
            .attach(device_id, port, &self.settings.target)
            .await
            .map_err(|source| LaunchError::DriverAttach {
                device_id: device_id.to_string(),
                port,
                source,
            })?;
        Ok(Arc::new(TimedDriver::new(driver, self.settings.action_timeout)))
    }

    /// 分配端口 → 启动服务 → 连接驱动
    pub async fn launch_session(&self, device_id: DeviceId) -> Result<Session, LaunchError> {
        let mut port = self.allocate_port(&device_id).await?;
        let mut attempt = 1;

        let service = loop {
            match self.start_service(port).await {
                Ok(service) => break service,
                Err(err) if err.is_port_retryable() && attempt < self.settings.launch_retries => {
                    warn!(
                        "[设备 {}] 端口 {} 上的服务没有起来，重新分配 ({}/{}): {}",
                        device_id, port, attempt, self.settings.launch_retries, err
                    );
                    // 先拿新端口再归还旧端口，避免又分到同一个
                    match self.allocate_port(&device_id).await {
                        Ok(next) if next != port => {
                            self.ports.release(port);
                            port = next;
                            attempt += 1;
                        }
                        Ok(_) => {
                            // 分配器只能给出同一个端口，重试没有意义
                            self.ports.release(port);
                            return Err(err);
                        }
                        Err(alloc_err) => {
                            self.ports.release(port);
                            return Err(alloc_err);
                        }
                    }
                }
                Err(e) => {
                    self.ports.release(port);
                    return Err(e);
                }
            }
        };

        match self.attach_driver(&device_id, port).await {
            Ok(driver) => {
                let mut device = Device::new(device_id, port);
                device.advance(SessionState::Running);
                Ok(Session {
                    device,
                    driver,
                    service,
                    ports: self.ports.clone(),
                })
            }
            Err(e) => {
                if let Err(stop_err) = service.stop().await {
                    warn!("⚠️ 停止端口 {} 上的服务失败: {}", port, stop_err);
                }
                self.ports.release(port);
                Err(e)
            }
        }
    }
}
