//! 并行验证
//!
//! 确认号码后，封禁检查、审核检查、申请复审、芯片检查同时进行。任意一个探测得到
//! 决定性结论（封禁 / 审核中）就立即返回，其余探测被取消；都没有结论时等全部完成。
//! 两个探测几乎同时给出结论时，先被收集到的那个生效。

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::ProbeFailure;
use crate::infrastructure::{wait_for, Driver};
use crate::models::ui_map::VerificationScreen;
use crate::models::{Locator, VerificationOutcome};

/// 探测结果：`Ok(None)` 表示没有结论
pub type ProbeResult = anyhow::Result<Option<VerificationOutcome>>;

/// 一个独立的验证探测
pub struct Probe {
    name: String,
    future: BoxFuture<'static, ProbeResult>,
}

impl Probe {
    pub fn new<F>(name: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = ProbeResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            future: future.boxed(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 汇总结果
#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    /// 是否有探测给出决定性结论
    pub decisive: bool,
    /// 决定性结论的状态名，没有时为空
    pub status: String,
    pub outcome: Option<VerificationOutcome>,
    /// 给出决定性结论的探测
    pub decided_by: Option<String>,
    /// 非决定性的结论
    pub observed: Vec<(String, VerificationOutcome)>,
    /// 失败的探测，不影响汇总
    pub failures: Vec<ProbeFailure>,
}

impl ProbeReport {
    /// `(是否决定性, 状态)`
    pub fn as_pair(&self) -> (bool, &str) {
        (self.decisive, &self.status)
    }
}

/// 并发运行所有探测
pub async fn run_probes(probes: Vec<Probe>) -> ProbeReport {
    let mut set = JoinSet::new();
    for Probe { name, future } in probes {
        set.spawn(async move {
            let result = AssertUnwindSafe(future).catch_unwind().await;
            (name, result)
        });
    }

    let mut report = ProbeReport::default();
    while let Some(joined) = set.join_next().await {
        let (name, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                report.failures.push(ProbeFailure {
                    probe: "<unknown>".to_string(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        match result {
            Ok(Ok(Some(outcome))) if outcome.is_decisive() => {
                info!("🔎 探测 {} 得到决定性结论: {}", name, outcome);
                set.abort_all();
                report.decisive = true;
                report.status = outcome.as_status().to_string();
                report.outcome = Some(outcome);
                report.decided_by = Some(name);
                return report;
            }
            Ok(Ok(Some(outcome))) => {
                debug!("探测 {} 结论: {}", name, outcome);
                report.observed.push((name, outcome));
            }
            Ok(Ok(None)) => debug!("探测 {} 无结论", name),
            Ok(Err(e)) => {
                let failure = ProbeFailure {
                    probe: name,
                    reason: format!("{:#}", e),
                };
                warn!("⚠️ {}", failure);
                report.failures.push(failure);
            }
            Err(panic) => {
                let failure = ProbeFailure {
                    probe: name,
                    reason: panic_message(panic.as_ref()),
                };
                warn!("⚠️ {}", failure);
                report.failures.push(failure);
            }
        }
    }

    report
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}

/// 确认号码后运行的四个探测
pub fn verification_probes(
    driver: Arc<dyn Driver>,
    screen: &VerificationScreen,
    wait: Duration,
) -> Vec<Probe> {
    vec![
        marker_probe(
            "ban_check",
            driver.clone(),
            screen.banned_marker.clone(),
            wait,
            VerificationOutcome::Banned,
        ),
        marker_probe(
            "review_check",
            driver.clone(),
            screen.review_marker.clone(),
            wait,
            VerificationOutcome::UnderReview,
        ),
        request_review_probe(driver.clone(), screen.request_review_button.clone(), wait),
        marker_probe(
            "chip_check",
            driver,
            screen.chip_ok_marker.clone(),
            wait,
            VerificationOutcome::ChipHealthy,
        ),
    ]
}

/// 标记在等待时间内出现就得到对应结论
fn marker_probe(
    name: &'static str,
    driver: Arc<dyn Driver>,
    marker: Locator,
    wait: Duration,
    outcome: VerificationOutcome,
) -> Probe {
    Probe::new(name, async move {
        let found = wait_for(driver.as_ref(), &marker, wait).await?;
        Ok(found.map(|_| outcome))
    })
}

/// 出现“申请复审”按钮时点击它
fn request_review_probe(driver: Arc<dyn Driver>, button: Locator, wait: Duration) -> Probe {
    Probe::new("request_analysis", async move {
        match wait_for(driver.as_ref(), &button, wait).await? {
            Some(element) => {
                driver.click(&element).await?;
                Ok(Some(VerificationOutcome::AnalysisRequested))
            }
            None => Ok(None),
        }
    })
}
