//! 为每个驱动调用加上截止时间

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::DriverError;
use crate::infrastructure::driver::{Capabilities, Driver, ElementRef};
use crate::models::Locator;

/// 带超时的驱动
///
/// 设备卡死时单个调用最多阻塞 `timeout`，不会让该设备的任务永远挂起。
pub struct TimedDriver {
    inner: Arc<dyn Driver>,
    timeout: Duration,
}

impl TimedDriver {
    pub fn new(inner: Arc<dyn Driver>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn deadline<T>(
        &self,
        action: &'static str,
        fut: impl Future<Output = Result<T, DriverError>> + Send,
    ) -> Result<T, DriverError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("⏱️ 驱动操作 {} 超过 {:?}", action, self.timeout);
                Err(DriverError::Timeout {
                    action,
                    timeout: self.timeout,
                })
            }
        }
    }
}

#[async_trait]
impl Driver for TimedDriver {
    fn capabilities(&self) -> &Capabilities {
        self.inner.capabilities()
    }

    async fn find_element(&self, locator: &Locator) -> Result<Option<ElementRef>, DriverError> {
        self.deadline("find_element", self.inner.find_element(locator))
            .await
    }

    async fn click(&self, element: &ElementRef) -> Result<(), DriverError> {
        self.deadline("click", self.inner.click(element)).await
    }

    async fn type_text(&self, element: &ElementRef, text: &str) -> Result<(), DriverError> {
        self.deadline("type_text", self.inner.type_text(element, text))
            .await
    }

    async fn element_text(&self, element: &ElementRef) -> Result<String, DriverError> {
        self.deadline("element_text", self.inner.element_text(element))
            .await
    }

    async fn press_key(&self, keycode: u32) -> Result<(), DriverError> {
        self.deadline("press_key", self.inner.press_key(keycode)).await
    }

    async fn activate_app(&self, package: &str) -> Result<(), DriverError> {
        self.deadline("activate_app", self.inner.activate_app(package))
            .await
    }

    async fn terminate_app(&self, package: &str) -> Result<(), DriverError> {
        self.deadline("terminate_app", self.inner.terminate_app(package))
            .await
    }

    async fn quit(&self) -> Result<(), DriverError> {
        self.deadline("quit", self.inner.quit()).await
    }
}
