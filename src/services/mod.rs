pub mod number_reporter;
pub mod sim_reader;
pub mod sms_reader;

pub use number_reporter::{FileNumberReporter, NumberReporter};
pub use sim_reader::SimNumberReader;
pub use sms_reader::{extract_code, SmsCodeReader};

use std::time::Duration;

use crate::error::WorkflowError;
use crate::infrastructure::{wait_for, Driver, ElementRef};
use crate::models::Locator;
use crate::workflow::FlowState;

/// 等待元素出现；超时视为该步骤失败
pub(crate) async fn require_element(
    driver: &dyn Driver,
    locator: &Locator,
    wait: Duration,
    step: FlowState,
) -> Result<ElementRef, WorkflowError> {
    wait_for(driver, locator, wait)
        .await
        .map_err(WorkflowError::step(step))?
        .ok_or_else(|| WorkflowError::ElementNotFound {
            step,
            element: locator.to_string(),
        })
}
