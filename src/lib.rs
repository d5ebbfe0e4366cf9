//! # Device Onboard
//!
//! 多台 Android 设备并行执行应用注册流程的编排程序
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（设备、端口、服务进程、驱动会话），只暴露能力
//! - `Driver` - 单台设备的窄接口，`AppiumDriver` 是真实后端，`TimedDriver` 给每个调用加截止时间
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单台设备
//! - `SimNumberReader` - 读取本机号码
//! - `SmsCodeReader` - 读取短信验证码
//! - `NumberReporter` - 保存号码
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一台设备"的完整注册流程
//! - `DeviceCtx` - 上下文封装（设备 + 端口）
//! - `RegistrationFlow` - 流程编排（号码 → 引导 → 并行验证 → 短信 → 资料）
//! - `run_probes` - 并行验证，第一个决定性结论生效
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/launcher` - 会话启动器
//! - `orchestrator/supervisor` - 会话监督器，管理并发和清理
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::Driver;
pub use models::{DeviceId, PhoneNumber, RegistrationResult, RegistrationStatus};
pub use orchestrator::{App, RunSummary, SessionLauncher, Supervisor};
pub use workflow::{run_probes, DeviceCtx, FlowState, Probe, ProbeReport, RegistrationFlow};
