//! 会话监督器 - 编排层
//!
//! ## 职责
//!
//! 1. **设备发现**：列出可用设备，发现失败对整次运行是致命的
//! 2. **会话启动**：每台设备并发启动会话，启动失败的设备记为失败并跳过
//! 3. **并发控制**：Semaphore 限制同时运行的设备数
//! 4. **结果收集**：每台设备只产生一条结果，任务 panic 也会被记录
//! 5. **资源清理**：所有启动成功的服务在最后统一停止，每个只停止一次，
//!    一台设备清理失败不影响其他设备

use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{AdbDiscovery, AppiumBackend, AppiumConnector, DeviceSource, PortAllocator};
use crate::models::{load_ui_map, DeviceId, FailureKind, RegistrationResult, RegistrationStatus};
use crate::orchestrator::device_runner;
use crate::orchestrator::launcher::{LaunchSettings, Session, SessionLauncher};
use crate::services::{FileNumberReporter, NumberReporter};
use crate::utils::logging::{log_devices_found, log_startup, print_final_stats};
use crate::workflow::{DeviceCtx, RegistrationFlow};

/// 一次运行的汇总
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub results: Vec<RegistrationResult>,
    /// 清理阶段停止的服务数量
    pub services_stopped: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn count(&self, status: RegistrationStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn result_for(&self, device_id: &str) -> Option<&RegistrationResult> {
        self.results.iter().find(|r| r.device_id.as_str() == device_id)
    }

    /// 进程退出码：0 没有失败的设备，2 至少一台设备失败
    pub fn exit_code(&self) -> u8 {
        if self.results.iter().any(RegistrationResult::is_failed) {
            2
        } else {
            0
        }
    }

    /// 写入 JSON 结果报告
    pub fn write_json(&self, path: impl AsRef<Path>) -> AppResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.results)
            .map_err(|e| AppError::file(path.display().to_string(), e.into()))?;
        std::fs::write(path, json).map_err(|e| AppError::file(path.display().to_string(), e))
    }
}

/// 会话监督器
pub struct Supervisor {
    max_concurrent: usize,
    discovery: Arc<dyn DeviceSource>,
    launcher: Arc<SessionLauncher>,
    flow: Arc<RegistrationFlow>,
}

impl Supervisor {
    pub fn new(
        max_concurrent: usize,
        discovery: Arc<dyn DeviceSource>,
        launcher: Arc<SessionLauncher>,
        flow: Arc<RegistrationFlow>,
    ) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            discovery,
            launcher,
            flow,
        }
    }

    /// 发现 → 启动 → 运行 → 清理
    pub async fn run(&self) -> AppResult<RunSummary> {
        let devices = self.discovery.list_devices().await?;
        if devices.is_empty() {
            warn!("⚠️ 没有发现可用设备，程序结束");
            return Ok(RunSummary::default());
        }
        log_devices_found(devices.len(), self.pool_size(devices.len()));

        let (sessions, mut results) = self.launch_all(devices).await;
        let (run_results, sessions) = self.run_all(sessions).await;
        results.extend(run_results);

        let services_stopped = self.shutdown_all(sessions).await;

        results.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(RunSummary {
            results,
            services_stopped,
        })
    }

    /// 并发数：设备数与上限取小
    fn pool_size(&self, live: usize) -> usize {
        live.clamp(1, self.max_concurrent)
    }

    /// 为所有设备并发启动会话
    async fn launch_all(
        &self,
        devices: Vec<DeviceId>,
    ) -> (Vec<(DeviceCtx, Session)>, Vec<RegistrationResult>) {
        let semaphore = Arc::new(Semaphore::new(self.pool_size(devices.len())));
        let mut handles = Vec::new();

        for (idx, device_id) in devices.into_iter().enumerate() {
            let launcher = self.launcher.clone();
            let semaphore = semaphore.clone();
            let task_device = device_id.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                launcher.launch_session(task_device).await
            });
            handles.push((idx + 1, device_id, handle));
        }

        let mut sessions = Vec::new();
        let mut failures = Vec::new();
        for (device_index, device_id, handle) in handles {
            match handle.await {
                Ok(Ok(session)) => {
                    let ctx = DeviceCtx::new(device_id, device_index, session.port());
                    info!("{} 🟢 会话已启动", ctx);
                    sessions.push((ctx, session));
                }
                Ok(Err(e)) => {
                    error!("[设备 {}] ❌ 会话启动失败: {}", device_id, e);
                    failures.push(RegistrationResult::launch_failed(device_id, &e));
                }
                Err(e) => {
                    error!("[设备 {}] ❌ 启动任务异常: {}", device_id, e);
                    failures.push(RegistrationResult::failed(
                        device_id,
                        None,
                        FailureKind::TaskPanicked,
                        e.to_string(),
                    ));
                }
            }
        }

        (sessions, failures)
    }

    /// 在所有会话上并发运行注册流程，会话本身留在这里等待清理
    async fn run_all(
        &self,
        sessions: Vec<(DeviceCtx, Session)>,
    ) -> (Vec<RegistrationResult>, Vec<Session>) {
        let semaphore = Arc::new(Semaphore::new(self.pool_size(sessions.len())));
        let mut handles = Vec::new();
        let mut live = Vec::new();

        for (ctx, session) in sessions {
            let flow = self.flow.clone();
            let driver = session.driver();
            let semaphore = semaphore.clone();
            let task_ctx = ctx.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                device_runner::run_device(&flow, driver, &task_ctx).await
            });
            handles.push((ctx, handle));
            live.push(session);
        }

        let mut results = Vec::new();
        for ((ctx, handle), session) in handles.into_iter().zip(live.iter_mut()) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!("{} ❌ 设备任务异常: {}", ctx, e);
                    RegistrationResult::failed(
                        ctx.device_id.clone(),
                        None,
                        FailureKind::TaskPanicked,
                        e.to_string(),
                    )
                }
            };
            session.finish(result.status.session_state());
            results.push(result);
        }

        (results, live)
    }

    /// 停止所有服务，返回停止的数量
    async fn shutdown_all(&self, sessions: Vec<Session>) -> usize {
        info!("🛑 清理 {} 个会话...", sessions.len());

        let outcomes = join_all(sessions.into_iter().map(|session| async move {
            let device_id = session.device_id().clone();
            (device_id, session.close().await)
        }))
        .await;

        for (device_id, outcome) in &outcomes {
            if let Err(e) = outcome {
                warn!("[设备 {}] ⚠️ 停止服务失败: {}", device_id, e);
            }
        }
        outcomes.len()
    }
}

/// 应用主结构
pub struct App {
    config: Config,
    supervisor: Supervisor,
}

impl App {
    /// 初始化应用：加载界面定位，组装真实的设备、端口、服务和驱动组件
    pub async fn initialize(config: Config) -> anyhow::Result<Self> {
        log_startup(&config);

        let ui_map = Arc::new(load_ui_map(Path::new(&config.ui_map_file)).await?);
        let reporter: Arc<dyn NumberReporter> =
            Arc::new(FileNumberReporter::with_path(&config.numbers_file));
        let flow = Arc::new(RegistrationFlow::new(&config, ui_map, reporter));

        let launcher = Arc::new(SessionLauncher::new(
            Arc::new(PortAllocator::from_config(&config)),
            Arc::new(AppiumBackend::new(&config)),
            Arc::new(AppiumConnector::new(&config)),
            LaunchSettings::from_config(&config),
        ));
        let discovery = Arc::new(AdbDiscovery::new(&config));

        let supervisor = Supervisor::new(config.max_concurrent_devices, discovery, launcher, flow);
        Ok(Self { config, supervisor })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> anyhow::Result<RunSummary> {
        let summary = self.supervisor.run().await?;

        if let Err(e) = summary.write_json(&self.config.report_file) {
            warn!("⚠️ 写入结果报告失败: {}", e);
        }
        print_final_stats(&summary, &self.config);

        Ok(summary)
    }
}
