//! 注册流程 - 流程层
//!
//! 核心职责：定义“一台设备”的完整注册流程
//!
//! 流程顺序：
//! 1. 读取本机号码并立即保存
//! 2. 选择语言 → 继续 → 输入号码 → 确认
//! 3. 并行验证（封禁 / 审核中 直接结束）
//! 4. 短信应用里有验证码：输入验证码 → 开始填写资料；没有：直接跳到第 5 步
//! 5. 授予权限 → 填写名字 → 完成

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::WorkflowError;
use crate::infrastructure::Driver;
use crate::models::{
    FailureKind, Locator, PhoneNumber, RegistrationResult, RegistrationStatus, UiMap,
    VerificationOutcome,
};
use crate::services::{require_element, NumberReporter, SimNumberReader, SmsCodeReader};
use crate::workflow::device_ctx::DeviceCtx;
use crate::workflow::probes::{run_probes, verification_probes};

/// 流程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlowState {
    Init,
    LanguageSelected,
    ProceedClicked,
    NumberEntered,
    NumberConfirmed,
    Verifying,
    MessagingAppOpened,
    CodeEntered,
    ProfileStarted,
    PermissionGranted,
    NameSet,
    ProfileFinalized,
    Banned,
    UnderReview,
}

impl FlowState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FlowState::ProfileFinalized | FlowState::Banned | FlowState::UnderReview
        )
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 流程进度，失败时用来保留已经读取到的号码
#[derive(Debug)]
struct FlowProgress {
    state: FlowState,
    number: Option<PhoneNumber>,
}

/// 注册流程
///
/// - 编排一台设备的完整注册步骤
/// - 不持有服务进程，只使用驱动句柄
/// - 同一设备上除并行验证外，所有界面操作严格串行
pub struct RegistrationFlow {
    ui: Arc<UiMap>,
    reporter: Arc<dyn NumberReporter>,
    sim_reader: SimNumberReader,
    sms_reader: SmsCodeReader,
    element_wait: Duration,
    probe_wait: Duration,
    settle_delay: Duration,
    profile_name: String,
    app_package: String,
}

impl RegistrationFlow {
    /// 创建新的注册流程
    pub fn new(config: &Config, ui: Arc<UiMap>, reporter: Arc<dyn NumberReporter>) -> Self {
        Self {
            ui,
            reporter,
            sim_reader: SimNumberReader::new(config.element_wait()),
            sms_reader: SmsCodeReader::new(config.element_wait()),
            element_wait: config.element_wait(),
            probe_wait: config.probe_wait(),
            settle_delay: config.settle_delay(),
            profile_name: config.profile_name.clone(),
            app_package: config.app_package.clone(),
        }
    }

    /// 运行流程，所有错误都转换成该设备的结果
    pub async fn run(&self, driver: Arc<dyn Driver>, ctx: &DeviceCtx) -> RegistrationResult {
        let mut progress = FlowProgress {
            state: FlowState::Init,
            number: None,
        };

        match self.drive(driver, ctx, &mut progress).await {
            Ok(state) => {
                let status = match state {
                    FlowState::Banned => RegistrationStatus::Banned,
                    FlowState::UnderReview => RegistrationStatus::UnderReview,
                    _ => RegistrationStatus::ProfileFinalized,
                };
                RegistrationResult::finished(ctx.device_id.clone(), progress.number, status)
            }
            Err(e) => {
                error!("{} ❌ 在 {} 之后失败: {}", ctx, progress.state, e);
                RegistrationResult::failed(
                    ctx.device_id.clone(),
                    progress.number,
                    FailureKind::WorkflowStepError,
                    e.to_string(),
                )
            }
        }
    }

    async fn drive(
        &self,
        driver: Arc<dyn Driver>,
        ctx: &DeviceCtx,
        progress: &mut FlowProgress,
    ) -> Result<FlowState, WorkflowError> {
        let d = driver.as_ref();

        // ========== 读取号码 ==========
        info!("{} 📞 读取本机号码...", ctx);
        let number = self
            .sim_reader
            .read_number(d, &self.ui.sim, &self.app_package)
            .await?;
        info!("{} ✓ 号码: {}", ctx, number);
        progress.number = Some(number.clone());

        // 后续步骤可能失败，号码先保存
        if let Err(e) = self.reporter.save(&number).await {
            warn!("{} ⚠️ 保存号码失败: {:#}", ctx, e);
        }

        // ========== 注册引导 ==========
        let onboarding = &self.ui.onboarding;
        self.click(d, FlowState::LanguageSelected, &onboarding.language_option)
            .await?;
        advance(progress, ctx, FlowState::LanguageSelected);

        self.click(d, FlowState::ProceedClicked, &onboarding.proceed_button)
            .await?;
        advance(progress, ctx, FlowState::ProceedClicked);

        let national = number.national(onboarding.country_prefix.as_deref());
        self.fill(d, FlowState::NumberEntered, &onboarding.phone_input, national)
            .await?;
        if let Some(next) = &onboarding.next_button {
            self.click(d, FlowState::NumberEntered, next).await?;
        }
        advance(progress, ctx, FlowState::NumberEntered);

        self.click(d, FlowState::NumberConfirmed, &onboarding.confirm_button)
            .await?;
        advance(progress, ctx, FlowState::NumberConfirmed);
        sleep(self.settle_delay).await;

        // ========== 并行验证 ==========
        advance(progress, ctx, FlowState::Verifying);
        let probes = verification_probes(driver.clone(), &self.ui.verification, self.probe_wait);
        let report = run_probes(probes).await;

        if report.decisive {
            let terminal = match report.outcome {
                Some(VerificationOutcome::Banned) => FlowState::Banned,
                _ => FlowState::UnderReview,
            };
            advance(progress, ctx, terminal);
            warn!("{} ⛔ 号码 {} 状态: {}，结束该设备的流程", ctx, number, report.status);
            return Ok(terminal);
        }

        // ========== 短信验证码 ==========
        if self.sms_reader.open_messages(d, &self.ui.sms).await? {
            advance(progress, ctx, FlowState::MessagingAppOpened);

            let code = self
                .sms_reader
                .read_code(d, &self.ui.sms, &self.app_package)
                .await?;
            self.fill(d, FlowState::CodeEntered, &self.ui.profile.code_input, &code)
                .await?;
            advance(progress, ctx, FlowState::CodeEntered);

            self.click(d, FlowState::ProfileStarted, &self.ui.profile.continue_button)
                .await?;
            advance(progress, ctx, FlowState::ProfileStarted);
        } else {
            info!("{} 未找到验证码短信，直接进入权限步骤", ctx);
            d.activate_app(&self.app_package)
                .await
                .map_err(WorkflowError::step(FlowState::MessagingAppOpened))?;
        }

        // ========== 完成资料 ==========
        self.click(d, FlowState::PermissionGranted, &self.ui.profile.permission_allow)
            .await?;
        advance(progress, ctx, FlowState::PermissionGranted);

        self.fill(d, FlowState::NameSet, &self.ui.profile.name_input, &self.profile_name)
            .await?;
        advance(progress, ctx, FlowState::NameSet);

        self.click(d, FlowState::ProfileFinalized, &self.ui.profile.finish_button)
            .await?;
        advance(progress, ctx, FlowState::ProfileFinalized);

        Ok(FlowState::ProfileFinalized)
    }

    /// 等待元素出现并点击
    async fn click(
        &self,
        driver: &dyn Driver,
        step: FlowState,
        locator: &Locator,
    ) -> Result<(), WorkflowError> {
        let element = require_element(driver, locator, self.element_wait, step).await?;
        driver
            .click(&element)
            .await
            .map_err(WorkflowError::step(step))
    }

    /// 等待输入框出现并输入文本
    async fn fill(
        &self,
        driver: &dyn Driver,
        step: FlowState,
        locator: &Locator,
        text: &str,
    ) -> Result<(), WorkflowError> {
        let element = require_element(driver, locator, self.element_wait, step).await?;
        driver
            .type_text(&element, text)
            .await
            .map_err(WorkflowError::step(step))
    }
}

fn advance(progress: &mut FlowProgress, ctx: &DeviceCtx, next: FlowState) {
    info!("{} ▶️ {} → {}", ctx, progress.state, next);
    progress.state = next;
}
