//! 单台设备处理器 - 编排层
//!
//! 在设备任务的边界上运行注册流程，输出该设备的状态行

use std::sync::Arc;

use tracing::info;

use crate::infrastructure::Driver;
use crate::models::{RegistrationResult, RegistrationStatus};
use crate::workflow::{DeviceCtx, RegistrationFlow};

/// 处理单台设备
///
/// # 参数
/// - `flow`: 注册流程
/// - `driver`: 该设备的驱动句柄
/// - `ctx`: 设备上下文
///
/// # 返回
/// 该设备的最终记录，流程中的错误已经转换进去
pub async fn run_device(
    flow: &RegistrationFlow,
    driver: Arc<dyn Driver>,
    ctx: &DeviceCtx,
) -> RegistrationResult {
    log_device_start(ctx, driver.device_id());

    let result = flow.run(driver, ctx).await;

    log_device_complete(ctx, &result);
    result
}

// ========== 日志辅助函数 ==========

fn log_device_start(ctx: &DeviceCtx, reported_id: Option<&str>) {
    info!("\n{} {}", ctx, "─".repeat(30));
    info!(
        "{} ▶️ 开始自动化 (驱动设备: {})",
        ctx,
        reported_id.unwrap_or("未知")
    );
}

fn log_device_complete(ctx: &DeviceCtx, result: &RegistrationResult) {
    let number = result
        .number
        .as_ref()
        .map(|n| n.to_string())
        .unwrap_or_else(|| "-".to_string());
    match result.status {
        RegistrationStatus::ProfileFinalized => {
            info!("{} ✅ 自动化完成，号码 {}", ctx, number)
        }
        RegistrationStatus::Banned | RegistrationStatus::UnderReview => {
            info!("{} ⛔ 号码 {} 状态: {}", ctx, number, result.status)
        }
        RegistrationStatus::Failed => info!(
            "{} ❌ 失败，号码 {}: {}",
            ctx,
            number,
            result.error.as_deref().unwrap_or("未知错误")
        ),
    }
}
