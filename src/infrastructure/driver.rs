//! 设备驱动接口
//!
//! 自动化后端只通过这里的窄接口暴露能力：查找元素、点击、输入、按键、切换应用。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use tokio::time::{sleep, Instant};

use crate::error::DriverError;
use crate::models::{DeviceId, Locator};

/// 两次查找之间的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// 会话能力表
pub type Capabilities = Map<String, JsonValue>;

/// 自动化服务返回的元素引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef(pub String);

/// 被自动化的目标应用
#[derive(Debug, Clone)]
pub struct AppTarget {
    pub package: String,
    pub activity: String,
}

/// 单台设备的驱动句柄
#[async_trait]
pub trait Driver: Send + Sync {
    fn capabilities(&self) -> &Capabilities;

    /// 能力表中的设备标识
    fn device_id(&self) -> Option<&str> {
        let caps = self.capabilities();
        caps.get("appium:udid")
            .or_else(|| caps.get("udid"))
            .or_else(|| caps.get("deviceName"))
            .and_then(JsonValue::as_str)
    }

    /// 查找一次元素，不存在时返回 `None`
    async fn find_element(&self, locator: &Locator) -> Result<Option<ElementRef>, DriverError>;

    async fn click(&self, element: &ElementRef) -> Result<(), DriverError>;

    async fn type_text(&self, element: &ElementRef, text: &str) -> Result<(), DriverError>;

    async fn element_text(&self, element: &ElementRef) -> Result<String, DriverError>;

    async fn press_key(&self, keycode: u32) -> Result<(), DriverError>;

    async fn activate_app(&self, package: &str) -> Result<(), DriverError>;

    async fn terminate_app(&self, package: &str) -> Result<(), DriverError>;

    /// 关闭驱动会话
    async fn quit(&self) -> Result<(), DriverError>;
}

/// 连接驱动
#[async_trait]
pub trait DriverConnector: Send + Sync {
    /// 在指定端口的服务上为设备打开驱动会话，自动授予运行时权限
    async fn attach(
        &self,
        device_id: &DeviceId,
        port: u16,
        target: &AppTarget,
    ) -> Result<Arc<dyn Driver>, DriverError>;
}

/// 在 `wait` 时间内反复查找元素，直到出现或超时
///
/// 超时返回 `Ok(None)`，驱动错误直接返回。
pub async fn wait_for(
    driver: &dyn Driver,
    locator: &Locator,
    wait: Duration,
) -> Result<Option<ElementRef>, DriverError> {
    let deadline = Instant::now() + wait;
    loop {
        if let Some(element) = driver.find_element(locator).await? {
            return Ok(Some(element));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
}
