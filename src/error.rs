use std::time::Duration;

use thiserror::Error;

use crate::workflow::FlowState;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 设备发现错误
    #[error("设备发现错误: {0}")]
    Discovery(#[from] DiscoveryError),
    /// 端口分配错误
    #[error("端口分配错误: {0}")]
    Port(#[from] PortError),
    /// 会话启动错误
    #[error("会话启动错误: {0}")]
    Launch(#[from] LaunchError),
    /// 驱动错误
    #[error("驱动错误: {0}")]
    Driver(#[from] DriverError),
    /// 流程错误
    #[error("流程错误: {0}")]
    Workflow(#[from] WorkflowError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文件操作错误
    #[error("文件错误 ({path}): {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 设备发现错误，对整次运行是致命的
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// 设备控制工具无法执行
    #[error("无法执行设备控制工具 {program}: {source}")]
    Unavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// 设备控制工具异常退出
    #[error("设备控制工具 {program} 异常退出 (状态: {status})")]
    ToolFailed { program: String, status: String },
}

/// 端口分配错误
#[derive(Debug, Error)]
pub enum PortError {
    /// 在限定的探测次数内没有空闲端口
    #[error("在 {attempts} 次探测内没有找到空闲端口 (起始端口: {base})")]
    Exhausted { base: u16, attempts: usize },
}

/// 自动化服务进程错误
#[derive(Debug, Error)]
pub enum ServiceError {
    /// 端口已被占用，可以换端口重试
    #[error("端口 {port} 已被占用")]
    PortInUse { port: u16 },
    /// 进程在就绪之前退出（通常是绑定端口失败），可以换端口重试
    #[error("端口 {port} 上的服务进程已退出 ({status})")]
    Exited { port: u16, status: String },
    /// 进程启动失败
    #[error("无法启动 {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// 进程停止失败
    #[error("停止端口 {port} 上的服务失败: {source}")]
    Stop {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// 会话启动错误，只影响单个设备
#[derive(Debug, Error)]
pub enum LaunchError {
    /// 端口分配失败
    #[error(transparent)]
    PortAllocation(#[from] PortError),
    /// 服务进程启动失败
    #[error("自动化服务启动失败 (端口 {port}): {source}")]
    ServiceSpawn {
        port: u16,
        #[source]
        source: ServiceError,
    },
    /// 服务在限定次数内未就绪
    #[error("自动化服务在 {attempts} 次检查内未就绪 (端口 {port})")]
    ServiceStartTimeout { port: u16, attempts: u32 },
    /// 驱动连接失败
    #[error("驱动连接失败 (设备 {device_id}, 端口 {port}): {source}")]
    DriverAttach {
        device_id: String,
        port: u16,
        #[source]
        source: DriverError,
    },
    /// 端口分配任务异常结束
    #[error("端口分配任务异常: {0}")]
    AllocationTask(#[from] tokio::task::JoinError),
}

/// 驱动调用错误
#[derive(Debug, Error)]
pub enum DriverError {
    /// 单个操作超过截止时间
    #[error("操作 {action} 超时 ({timeout:?})")]
    Timeout {
        action: &'static str,
        timeout: Duration,
    },
    /// 与自动化服务通信失败
    #[error("请求自动化服务失败: {0}")]
    Transport(#[from] reqwest::Error),
    /// 自动化服务返回错误
    #[error("自动化服务返回错误 ({status} {error}): {message}")]
    Remote {
        status: u16,
        error: String,
        message: String,
    },
    /// 响应格式无法识别
    #[error("无法识别的响应: {0}")]
    InvalidResponse(String),
}

/// 流程步骤错误，对该设备的会话是致命的
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// 驱动操作失败
    #[error("步骤 {step} 失败: {source}")]
    Step {
        step: FlowState,
        #[source]
        source: DriverError,
    },
    /// 在等待时间内没有找到界面元素
    #[error("步骤 {step} 未找到界面元素 {element}")]
    ElementNotFound { step: FlowState, element: String },
    /// 无法从界面文本中提取数据
    #[error("步骤 {step} 无法从文本中提取{what}: {text}")]
    Extraction {
        step: FlowState,
        what: &'static str,
        text: String,
    },
}

/// 单个验证探测失败，不是致命错误
#[derive(Debug, Clone, Error)]
#[error("探测 {probe} 失败: {reason}")]
pub struct ProbeFailure {
    pub probe: String,
    pub reason: String,
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 配置文件解析失败
    #[error("解析配置文件失败 ({path}): {source}")]
    FileParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 配置值无效
    #[error("配置项 {field} 无效: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

// ========== 便捷构造函数 ==========

impl ServiceError {
    /// 换一个端口重新启动可能成功
    pub fn is_port_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::PortInUse { .. } | ServiceError::Exited { .. }
        )
    }
}

impl LaunchError {
    /// 服务因为端口问题没有起来
    pub fn is_port_retryable(&self) -> bool {
        match self {
            LaunchError::ServiceSpawn { source, .. } => source.is_port_retryable(),
            _ => false,
        }
    }
}

impl WorkflowError {
    /// 把驱动错误归到某个步骤上
    pub fn step(step: FlowState) -> impl FnOnce(DriverError) -> Self {
        move |source| WorkflowError::Step { step, source }
    }
}

impl AppError {
    /// 创建文件错误
    pub fn file(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File {
            path: path.into(),
            source,
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
