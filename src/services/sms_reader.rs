//! 短信验证码读取服务 - 业务能力层

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::error::WorkflowError;
use crate::infrastructure::{wait_for, Driver};
use crate::models::ui_map::SmsScreen;
use crate::services::require_element;
use crate::workflow::FlowState;

fn code_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{3})[- ]?(\d{3})\b").expect("静态正则"))
}

/// 从短信文本中提取 6 位验证码，支持 `123-456` 和 `123456`
pub fn extract_code(text: &str) -> Option<String> {
    code_pattern()
        .captures(text)
        .map(|caps| format!("{}{}", &caps[1], &caps[2]))
}

/// 短信验证码读取
pub struct SmsCodeReader {
    wait: Duration,
}

impl SmsCodeReader {
    pub fn new(wait: Duration) -> Self {
        Self { wait }
    }

    /// 打开短信应用并等待验证码短信
    ///
    /// 没有找到短信返回 `Ok(false)`，这是正常分支，不是错误
    pub async fn open_messages(
        &self,
        driver: &dyn Driver,
        sms: &SmsScreen,
    ) -> Result<bool, WorkflowError> {
        let step = FlowState::MessagingAppOpened;
        driver
            .activate_app(&sms.app_package)
            .await
            .map_err(WorkflowError::step(step))?;

        let found = wait_for(driver, &sms.latest_message, self.wait)
            .await
            .map_err(WorkflowError::step(step))?;
        Ok(found.is_some())
    }

    /// 读取验证码并回到目标应用
    pub async fn read_code(
        &self,
        driver: &dyn Driver,
        sms: &SmsScreen,
        target_package: &str,
    ) -> Result<String, WorkflowError> {
        let step = FlowState::MessagingAppOpened;
        let element = require_element(driver, &sms.latest_message, self.wait, step).await?;
        let text = driver
            .element_text(&element)
            .await
            .map_err(WorkflowError::step(step))?;
        debug!("短信原文: {}", text);

        let code = extract_code(&text).ok_or_else(|| WorkflowError::Extraction {
            step,
            what: "验证码",
            text: text.clone(),
        })?;

        driver
            .activate_app(target_package)
            .await
            .map_err(WorkflowError::step(step))?;

        Ok(code)
    }
}
