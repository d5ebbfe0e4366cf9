use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::infrastructure::port::{PortStrategy, HASH_SLOTS};

/// 程序配置
///
/// 设备工具链的位置通过这里显式传给发现和服务启动模块，不修改进程环境变量。
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 设备工具链 ---
    /// adb 可执行文件路径
    pub adb_path: String,
    /// Android SDK 根目录（传给子进程的 ANDROID_HOME）
    pub android_sdk_root: Option<String>,
    /// 自动化服务可执行文件
    pub service_program: String,

    // --- 端口分配 ---
    pub base_port: u16,
    /// 探测步长，避免并发探测时撞到相邻端口
    pub port_stride: u16,
    pub port_search_limit: usize,
    pub port_strategy: PortStrategy,

    // --- 会话启动 ---
    pub service_ready_attempts: u32,
    pub service_ready_delay_ms: u64,
    /// 端口被占用时重新分配的次数
    pub launch_retries: u32,
    /// 目标应用包名
    pub app_package: String,
    /// 目标应用入口 Activity
    pub app_activity: String,

    // --- 并发与超时 ---
    /// 同时运行的设备数量上限
    pub max_concurrent_devices: usize,
    /// 单个驱动调用的截止时间
    pub action_timeout_secs: u64,
    /// 等待界面元素出现的时间
    pub element_wait_secs: u64,
    /// 验证探测等待标记出现的时间
    pub probe_wait_secs: u64,
    /// 确认号码后等待界面稳定的时间
    pub settle_delay_ms: u64,

    // --- 文件 ---
    /// 界面元素定位文件
    pub ui_map_file: String,
    /// 号码记录文件
    pub numbers_file: String,
    /// JSON 结果报告
    pub report_file: String,
    /// 运行日志文件
    pub output_log_file: String,

    /// 资料页填写的名字
    pub profile_name: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            adb_path: "adb".to_string(),
            android_sdk_root: None,
            service_program: "appium".to_string(),
            base_port: 4723,
            port_stride: 2,
            port_search_limit: 500,
            port_strategy: PortStrategy::HashThenProbe,
            service_ready_attempts: 10,
            service_ready_delay_ms: 1000,
            launch_retries: 3,
            app_package: String::new(),
            app_activity: String::new(),
            max_concurrent_devices: 16,
            action_timeout_secs: 60,
            element_wait_secs: 20,
            probe_wait_secs: 15,
            settle_delay_ms: 1000,
            ui_map_file: "ui_map.toml".to_string(),
            numbers_file: "numbers.txt".to_string(),
            report_file: "report.json".to_string(),
            output_log_file: "output.txt".to_string(),
            profile_name: "User".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 从环境变量加载（未设置的项使用默认值）
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// 加载配置：`CONFIG_FILE` 指定的 TOML 文件（如果有）再叠加环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("CONFIG_FILE") {
            Ok(path) => Self::from_toml_file(&path)?,
            Err(_) => Self::default(),
        };
        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载，缺失的字段使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::FileParse {
            path: path.display().to_string(),
            source,
        })
    }

    /// 用环境变量覆盖已有配置
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        let d = self;
        Ok(Self {
            adb_path: std::env::var("ADB_PATH").unwrap_or(d.adb_path),
            android_sdk_root: std::env::var("ANDROID_SDK_ROOT").ok().or(d.android_sdk_root),
            service_program: std::env::var("SERVICE_PROGRAM").unwrap_or(d.service_program),
            base_port: env_parse("BASE_PORT", "u16")?.unwrap_or(d.base_port),
            port_stride: env_parse("PORT_STRIDE", "u16")?.unwrap_or(d.port_stride),
            port_search_limit: env_parse("PORT_SEARCH_LIMIT", "usize")?.unwrap_or(d.port_search_limit),
            port_strategy: env_parse("PORT_STRATEGY", "probe|hash|hash_then_probe")?.unwrap_or(d.port_strategy),
            service_ready_attempts: env_parse("SERVICE_READY_ATTEMPTS", "u32")?.unwrap_or(d.service_ready_attempts),
            service_ready_delay_ms: env_parse("SERVICE_READY_DELAY_MS", "u64")?.unwrap_or(d.service_ready_delay_ms),
            launch_retries: env_parse("LAUNCH_RETRIES", "u32")?.unwrap_or(d.launch_retries),
            app_package: std::env::var("APP_PACKAGE").unwrap_or(d.app_package),
            app_activity: std::env::var("APP_ACTIVITY").unwrap_or(d.app_activity),
            max_concurrent_devices: env_parse("MAX_CONCURRENT_DEVICES", "usize")?.unwrap_or(d.max_concurrent_devices),
            action_timeout_secs: env_parse("ACTION_TIMEOUT_SECS", "u64")?.unwrap_or(d.action_timeout_secs),
            element_wait_secs: env_parse("ELEMENT_WAIT_SECS", "u64")?.unwrap_or(d.element_wait_secs),
            probe_wait_secs: env_parse("PROBE_WAIT_SECS", "u64")?.unwrap_or(d.probe_wait_secs),
            settle_delay_ms: env_parse("SETTLE_DELAY_MS", "u64")?.unwrap_or(d.settle_delay_ms),
            ui_map_file: std::env::var("UI_MAP_FILE").unwrap_or(d.ui_map_file),
            numbers_file: std::env::var("NUMBERS_FILE").unwrap_or(d.numbers_file),
            report_file: std::env::var("REPORT_FILE").unwrap_or(d.report_file),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(d.output_log_file),
            profile_name: std::env::var("PROFILE_NAME").unwrap_or(d.profile_name),
            verbose_logging: env_parse("VERBOSE_LOGGING", "bool")?.unwrap_or(d.verbose_logging),
        })
    }

    /// 检查必须由使用者提供的配置项
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_package.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "app_package",
                reason: "目标应用包名不能为空".to_string(),
            });
        }
        if self.app_activity.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "app_activity",
                reason: "目标应用入口不能为空".to_string(),
            });
        }
        if self.port_stride == 0 {
            return Err(ConfigError::InvalidValue {
                field: "port_stride",
                reason: "步长必须大于 0".to_string(),
            });
        }
        if self.port_strategy != PortStrategy::Probe {
            let last = u64::from(self.base_port) + (HASH_SLOTS - 1) * u64::from(self.port_stride);
            if last > u64::from(u16::MAX) {
                return Err(ConfigError::InvalidValue {
                    field: "base_port",
                    reason: format!(
                        "哈希端口范围 {}..={} 超出 {}",
                        self.base_port,
                        last,
                        u16::MAX
                    ),
                });
            }
        }
        if self.max_concurrent_devices == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_devices",
                reason: "并发上限必须大于 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn element_wait(&self) -> Duration {
        Duration::from_secs(self.element_wait_secs)
    }

    pub fn probe_wait(&self) -> Duration {
        Duration::from_secs(self.probe_wait_secs)
    }

    pub fn service_ready_delay(&self) -> Duration {
        Duration::from_millis(self.service_ready_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// 读取并解析环境变量；未设置返回 `None`，解析失败返回错误
fn env_parse<T: FromStr>(var_name: &str, expected_type: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
