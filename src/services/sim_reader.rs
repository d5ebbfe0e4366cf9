//! SIM 号码读取服务 - 业务能力层

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::WorkflowError;
use crate::infrastructure::Driver;
use crate::models::ui_map::SimScreen;
use crate::models::PhoneNumber;
use crate::services::require_element;
use crate::workflow::FlowState;

/// Android HOME 键
const KEYCODE_HOME: u32 = 3;

/// 从设备界面读取本机号码
///
/// 回到桌面 → 打开显示号码的应用 → 依次点击 → 读取号码 → 关闭该应用 → 回到目标应用
pub struct SimNumberReader {
    wait: Duration,
}

impl SimNumberReader {
    pub fn new(wait: Duration) -> Self {
        Self { wait }
    }

    pub async fn read_number(
        &self,
        driver: &dyn Driver,
        sim: &SimScreen,
        target_package: &str,
    ) -> Result<PhoneNumber, WorkflowError> {
        let step = FlowState::Init;

        driver
            .press_key(KEYCODE_HOME)
            .await
            .map_err(WorkflowError::step(step))?;
        driver
            .activate_app(&sim.app_package)
            .await
            .map_err(WorkflowError::step(step))?;

        for locator in &sim.open_steps {
            let element = require_element(driver, locator, self.wait, step).await?;
            driver.click(&element).await.map_err(WorkflowError::step(step))?;
        }

        let element = require_element(driver, &sim.number_text, self.wait, step).await?;
        let text = driver
            .element_text(&element)
            .await
            .map_err(WorkflowError::step(step))?;
        debug!("号码原文: {}", text);

        let number = PhoneNumber::parse(&text).ok_or_else(|| WorkflowError::Extraction {
            step,
            what: "号码",
            text: text.clone(),
        })?;

        if let Err(e) = driver.terminate_app(&sim.app_package).await {
            warn!("关闭 {} 失败: {}", sim.app_package, e);
        }
        driver
            .activate_app(target_package)
            .await
            .map_err(WorkflowError::step(step))?;

        Ok(number)
    }
}
