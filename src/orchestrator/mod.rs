//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `launcher` - 会话启动器
//! - 分配端口、启动自动化服务、轮询就绪、连接驱动
//! - 任一步失败都清理已经启动的部分
//!
//! ### `device_runner` - 单台设备处理器
//! - 在设备任务边界上运行注册流程，输出状态行
//!
//! ### `supervisor` - 会话监督器
//! - 设备发现、并发启动、并发运行、统一清理
//!
//! ## 层次关系
//!
//! ```text
//! supervisor (处理 Vec<Device>)
//!     ↓
//! launcher + device_runner (处理单台设备)
//!     ↓
//! workflow::RegistrationFlow (一台设备的注册步骤)
//!     ↓
//! services (能力层：号码 / 短信 / 记录)
//!     ↓
//! infrastructure (基础设施：端口、服务、驱动)
//! ```

pub mod device_runner;
pub mod launcher;
pub mod supervisor;

// 重新导出主要类型
pub use launcher::{LaunchSettings, Session, SessionLauncher};
pub use supervisor::{App, RunSummary, Supervisor};
