//! 验证结果与每台设备的最终记录

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LaunchError;
use crate::models::{DeviceId, PhoneNumber, SessionState};

/// 单个验证探测得到的结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationOutcome {
    Banned,
    UnderReview,
    AnalysisRequested,
    ChipHealthy,
}

impl VerificationOutcome {
    /// 封禁和审核中会立即结束该设备的流程
    pub fn is_decisive(self) -> bool {
        matches!(
            self,
            VerificationOutcome::Banned | VerificationOutcome::UnderReview
        )
    }

    pub fn as_status(self) -> &'static str {
        match self {
            VerificationOutcome::Banned => "Banned",
            VerificationOutcome::UnderReview => "UnderReview",
            VerificationOutcome::AnalysisRequested => "AnalysisRequested",
            VerificationOutcome::ChipHealthy => "ChipHealthy",
        }
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_status())
    }
}

/// 设备的最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    ProfileFinalized,
    Banned,
    UnderReview,
    Failed,
}

impl RegistrationStatus {
    pub fn session_state(self) -> SessionState {
        match self {
            RegistrationStatus::ProfileFinalized => SessionState::Succeeded,
            RegistrationStatus::Banned => SessionState::Banned,
            RegistrationStatus::UnderReview => SessionState::UnderReview,
            RegistrationStatus::Failed => SessionState::Failed,
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegistrationStatus::ProfileFinalized => "ProfileFinalized",
            RegistrationStatus::Banned => "Banned",
            RegistrationStatus::UnderReview => "UnderReview",
            RegistrationStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// 失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    PortAllocationExhausted,
    ServiceStartTimeout,
    ServiceSpawnFailed,
    DriverAttachError,
    WorkflowStepError,
    TaskPanicked,
}

impl From<&LaunchError> for FailureKind {
    fn from(err: &LaunchError) -> Self {
        match err {
            LaunchError::PortAllocation(_) => FailureKind::PortAllocationExhausted,
            LaunchError::ServiceSpawn { .. } => FailureKind::ServiceSpawnFailed,
            LaunchError::ServiceStartTimeout { .. } => FailureKind::ServiceStartTimeout,
            LaunchError::DriverAttach { .. } => FailureKind::DriverAttachError,
            LaunchError::AllocationTask(_) => FailureKind::TaskPanicked,
        }
    }
}

/// 每台设备的最终记录，每个会话只产生一次
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResult {
    pub device_id: DeviceId,
    pub number: Option<PhoneNumber>,
    pub status: RegistrationStatus,
    pub failure: Option<FailureKind>,
    pub error: Option<String>,
}

impl RegistrationResult {
    pub fn finished(
        device_id: DeviceId,
        number: Option<PhoneNumber>,
        status: RegistrationStatus,
    ) -> Self {
        Self {
            device_id,
            number,
            status,
            failure: None,
            error: None,
        }
    }

    pub fn failed(
        device_id: DeviceId,
        number: Option<PhoneNumber>,
        failure: FailureKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            device_id,
            number,
            status: RegistrationStatus::Failed,
            failure: Some(failure),
            error: Some(error.into()),
        }
    }

    /// 会话启动阶段失败
    pub fn launch_failed(device_id: DeviceId, err: &LaunchError) -> Self {
        Self::failed(device_id, None, FailureKind::from(err), err.to_string())
    }

    pub fn is_failed(&self) -> bool {
        self.status == RegistrationStatus::Failed
    }
}
