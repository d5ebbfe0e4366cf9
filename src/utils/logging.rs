/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::models::RegistrationStatus;
use crate::orchestrator::RunSummary;

/// 初始化 tracing
///
/// 默认级别 info（`verbose` 时为 debug），可以用 `RUST_LOG` 覆盖。
/// 给出日志文件时同时以无颜色格式追加写入。
pub fn init(verbose: bool, log_file_path: Option<&str>) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match log_file_path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("无法打开日志文件: {}", path))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .context("日志系统已经初始化")?;
    Ok(())
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n设备注册日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 多设备并行注册模式");
    info!("📦 目标应用: {}/{}", config.app_package, config.app_activity);
    info!("📊 最大并发数: {}", config.max_concurrent_devices);
    info!(
        "🔌 端口: 起始 {} 步长 {} 策略 {:?}",
        config.base_port, config.port_stride, config.port_strategy
    );
    info!("{}", "=".repeat(60));
}

/// 记录设备发现信息
///
/// # 参数
/// - `total`: 设备总数
/// - `pool_size`: 实际并发数
pub fn log_devices_found(total: usize, pool_size: usize) {
    info!("✓ 找到 {} 台可用设备", total);
    info!("📋 同时处理 {} 台\n", pool_size);
}

/// 打印最终统计信息和每台设备的状态行
pub fn print_final_stats(summary: &RunSummary, config: &Config) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    for result in &summary.results {
        let number = result
            .number
            .as_ref()
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        info!("📱 {} | {} | {}", result.device_id, number, result.status);
    }
    info!("{}", "─".repeat(60));
    info!(
        "✅ 完成: {}/{}",
        summary.count(RegistrationStatus::ProfileFinalized),
        summary.total()
    );
    info!("⛔ 封禁: {}", summary.count(RegistrationStatus::Banned));
    info!("🕒 审核中: {}", summary.count(RegistrationStatus::UnderReview));
    info!("❌ 失败: {}", summary.count(RegistrationStatus::Failed));
    info!("🛑 已停止服务: {}", summary.services_stopped);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", config.output_log_file);
    info!("结果报告: {}", config.report_file);
}
