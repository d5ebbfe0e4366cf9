use std::process::ExitCode;

use device_onboard::utils::logging;
use device_onboard::{App, Config};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    // 加载配置
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ 配置错误: {}", e);
            return ExitCode::from(1);
        }
    };

    // 初始化日志
    if let Err(e) = logging::init_log_file(&config.output_log_file)
        .and_then(|_| logging::init(config.verbose_logging, Some(&config.output_log_file)))
    {
        eprintln!("❌ 日志初始化失败: {:#}", e);
        return ExitCode::from(1);
    }

    // 初始化并运行应用
    let result = match App::initialize(config).await {
        Ok(app) => app.run().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(summary) => ExitCode::from(summary.exit_code()),
        Err(e) => {
            error!("❌ 运行失败: {:#}", e);
            ExitCode::from(1)
        }
    }
}
