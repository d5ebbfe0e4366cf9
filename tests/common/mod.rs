//! 测试用的假设备、假服务和假端口
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;

use device_onboard::config::Config;
use device_onboard::error::{DiscoveryError, DriverError, PortError, ServiceError};
use device_onboard::infrastructure::{
    AppTarget, Capabilities, DeviceSource, Driver, DriverConnector, ElementRef, PortProbe,
    PortSource, ServiceBackend, ServiceInstance,
};
use device_onboard::models::ui_map::{
    OnboardingScreen, ProfileScreen, SimScreen, SmsScreen, VerificationScreen,
};
use device_onboard::models::{DeviceId, Locator, PhoneNumber, UiMap};
use device_onboard::services::NumberReporter;

// ========== 界面定位 ==========

pub const SIM_PACKAGE: &str = "com.android.settings";
pub const SMS_PACKAGE: &str = "com.android.messaging";
pub const APP_PACKAGE: &str = "com.example.chat";

pub const SIM_ABOUT: &str = "sim:about";
pub const SIM_STATUS: &str = "sim:status";
pub const SIM_NUMBER: &str = "sim:number";

pub const OB_LANGUAGE: &str = "ob:language";
pub const OB_PROCEED: &str = "ob:proceed";
pub const OB_PHONE: &str = "ob:phone";
pub const OB_CONFIRM: &str = "ob:confirm";

pub const VF_BANNED: &str = "vf:banned";
pub const VF_REVIEW: &str = "vf:review";
pub const VF_REQUEST: &str = "vf:request";
pub const VF_CHIP: &str = "vf:chip";

pub const SMS_LATEST: &str = "sms:latest";

pub const PF_CODE: &str = "pf:code";
pub const PF_CONTINUE: &str = "pf:continue";
pub const PF_ALLOW: &str = "pf:allow";
pub const PF_NAME: &str = "pf:name";
pub const PF_FINISH: &str = "pf:finish";

pub fn ui_map() -> UiMap {
    UiMap {
        sim: SimScreen {
            app_package: SIM_PACKAGE.to_string(),
            open_steps: vec![Locator::id(SIM_ABOUT), Locator::id(SIM_STATUS)],
            number_text: Locator::id(SIM_NUMBER),
        },
        onboarding: OnboardingScreen {
            language_option: Locator::id(OB_LANGUAGE),
            proceed_button: Locator::id(OB_PROCEED),
            phone_input: Locator::id(OB_PHONE),
            next_button: None,
            confirm_button: Locator::id(OB_CONFIRM),
            country_prefix: Some("55".to_string()),
        },
        verification: VerificationScreen {
            banned_marker: Locator::id(VF_BANNED),
            review_marker: Locator::id(VF_REVIEW),
            request_review_button: Locator::id(VF_REQUEST),
            chip_ok_marker: Locator::id(VF_CHIP),
        },
        sms: SmsScreen {
            app_package: SMS_PACKAGE.to_string(),
            latest_message: Locator::id(SMS_LATEST),
        },
        profile: ProfileScreen {
            code_input: Locator::id(PF_CODE),
            continue_button: Locator::id(PF_CONTINUE),
            permission_allow: Locator::id(PF_ALLOW),
            name_input: Locator::id(PF_NAME),
            finish_button: Locator::id(PF_FINISH),
        },
    }
}

/// 等待时间很短的配置
pub fn test_config() -> Config {
    Config {
        app_package: APP_PACKAGE.to_string(),
        app_activity: format!("{}.Main", APP_PACKAGE),
        service_ready_attempts: 3,
        service_ready_delay_ms: 100,
        launch_retries: 3,
        max_concurrent_devices: 4,
        action_timeout_secs: 5,
        element_wait_secs: 1,
        probe_wait_secs: 2,
        settle_delay_ms: 10,
        ..Config::default()
    }
}

// ========== 假驱动 ==========

struct FakeElement {
    text: String,
    appear_after: Duration,
}

/// 按定位值查找元素的假驱动，记录所有操作
pub struct FakeDriver {
    caps: Capabilities,
    created: Instant,
    elements: Mutex<HashMap<String, FakeElement>>,
    fail_clicks: Mutex<HashSet<String>>,
    actions: Mutex<Vec<String>>,
}

impl FakeDriver {
    pub fn new(device_id: &str) -> Self {
        let mut caps = Capabilities::new();
        caps.insert("appium:udid".to_string(), json!(device_id));
        Self {
            caps,
            created: Instant::now(),
            elements: Mutex::new(HashMap::new()),
            fail_clicks: Mutex::new(HashSet::new()),
            actions: Mutex::new(Vec::new()),
        }
    }

    /// 整个流程都能走通的设备：没有封禁或审核标记，也没有短信
    pub fn happy(device_id: &str) -> Self {
        let driver = Self::new(device_id);
        for value in [
            SIM_ABOUT, SIM_STATUS, OB_LANGUAGE, OB_PROCEED, OB_PHONE, OB_CONFIRM, VF_CHIP,
            PF_CODE, PF_CONTINUE, PF_ALLOW, PF_NAME, PF_FINISH,
        ] {
            driver.show(value, "");
        }
        driver.show(SIM_NUMBER, "+55 (11) 95451-0423");
        driver
    }

    pub fn with(self, value: &str, text: &str) -> Self {
        self.show(value, text);
        self
    }

    pub fn with_delayed(self, value: &str, text: &str, delay: Duration) -> Self {
        self.elements.lock().unwrap().insert(
            value.to_string(),
            FakeElement {
                text: text.to_string(),
                appear_after: delay,
            },
        );
        self
    }

    pub fn without(self, value: &str) -> Self {
        self.elements.lock().unwrap().remove(value);
        self
    }

    pub fn failing_click(self, value: &str) -> Self {
        self.fail_clicks.lock().unwrap().insert(value.to_string());
        self
    }

    fn show(&self, value: &str, text: &str) {
        self.elements.lock().unwrap().insert(
            value.to_string(),
            FakeElement {
                text: text.to_string(),
                appear_after: Duration::ZERO,
            },
        );
    }

    fn record(&self, action: String) {
        self.actions.lock().unwrap().push(action);
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    pub fn did(&self, action: &str) -> bool {
        self.actions.lock().unwrap().iter().any(|a| a == action)
    }

    /// 某个操作在日志中的位置
    pub fn position(&self, action: &str) -> Option<usize> {
        self.actions.lock().unwrap().iter().position(|a| a == action)
    }
}

#[async_trait]
impl Driver for FakeDriver {
    fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    async fn find_element(&self, locator: &Locator) -> Result<Option<ElementRef>, DriverError> {
        let elements = self.elements.lock().unwrap();
        Ok(elements
            .get(&locator.value)
            .filter(|e| self.created.elapsed() >= e.appear_after)
            .map(|_| ElementRef(locator.value.clone())))
    }

    async fn click(&self, element: &ElementRef) -> Result<(), DriverError> {
        if self.fail_clicks.lock().unwrap().contains(&element.0) {
            return Err(DriverError::InvalidResponse(format!("stale element {}", element.0)));
        }
        self.record(format!("click:{}", element.0));
        Ok(())
    }

    async fn type_text(&self, element: &ElementRef, text: &str) -> Result<(), DriverError> {
        self.record(format!("type:{}={}", element.0, text));
        Ok(())
    }

    async fn element_text(&self, element: &ElementRef) -> Result<String, DriverError> {
        let elements = self.elements.lock().unwrap();
        Ok(elements
            .get(&element.0)
            .map(|e| e.text.clone())
            .unwrap_or_default())
    }

    async fn press_key(&self, keycode: u32) -> Result<(), DriverError> {
        self.record(format!("key:{}", keycode));
        Ok(())
    }

    async fn activate_app(&self, package: &str) -> Result<(), DriverError> {
        self.record(format!("activate:{}", package));
        Ok(())
    }

    async fn terminate_app(&self, package: &str) -> Result<(), DriverError> {
        self.record(format!("terminate:{}", package));
        Ok(())
    }

    async fn quit(&self) -> Result<(), DriverError> {
        self.record("quit".to_string());
        Ok(())
    }
}

// ========== 号码记录 ==========

#[derive(Default)]
pub struct MemoryReporter {
    numbers: Mutex<Vec<PhoneNumber>>,
}

impl MemoryReporter {
    pub fn numbers(&self) -> Vec<String> {
        self.numbers
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.to_string())
            .collect()
    }
}

#[async_trait]
impl NumberReporter for MemoryReporter {
    async fn save(&self, number: &PhoneNumber) -> anyhow::Result<()> {
        self.numbers.lock().unwrap().push(number.clone());
        Ok(())
    }
}

// ========== 假服务 ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Immediate,
    Never,
}

/// 记录启动和停止次数的服务后端
pub struct FakeBackend {
    readiness: Readiness,
    busy_ports: Mutex<HashSet<u16>>,
    exiting_ports: Mutex<HashSet<u16>>,
    pub spawned: Arc<AtomicUsize>,
    pub stopped: Arc<AtomicUsize>,
    pub killed: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub fn new(readiness: Readiness) -> Self {
        Self {
            readiness,
            busy_ports: Mutex::new(HashSet::new()),
            exiting_ports: Mutex::new(HashSet::new()),
            spawned: Arc::new(AtomicUsize::new(0)),
            stopped: Arc::new(AtomicUsize::new(0)),
            killed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 这些端口被外部进程占用
    pub fn with_busy_ports(self, ports: &[u16]) -> Self {
        self.busy_ports.lock().unwrap().extend(ports.iter().copied());
        self
    }

    /// 这些端口上启动的进程绑定失败后立即退出
    pub fn with_exiting_ports(self, ports: &[u16]) -> Self {
        self.exiting_ports.lock().unwrap().extend(ports.iter().copied());
        self
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn kill_count(&self) -> usize {
        self.killed.load(Ordering::SeqCst)
    }
}

struct FakeService {
    port: u16,
    ready: bool,
    exits: bool,
    stopped: Arc<AtomicUsize>,
    killed: Arc<AtomicUsize>,
}

#[async_trait]
impl ServiceInstance for FakeService {
    fn port(&self) -> u16 {
        self.port
    }

    async fn is_ready(&mut self) -> Result<bool, ServiceError> {
        if self.exits {
            return Err(ServiceError::Exited {
                port: self.port,
                status: "exit status: 1".to_string(),
            });
        }
        Ok(self.ready)
    }

    async fn stop(&mut self) -> Result<(), ServiceError> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn kill(&mut self) {
        self.killed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ServiceBackend for FakeBackend {
    async fn spawn(&self, port: u16) -> Result<Box<dyn ServiceInstance>, ServiceError> {
        if self.busy_ports.lock().unwrap().contains(&port) {
            return Err(ServiceError::PortInUse { port });
        }
        self.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeService {
            port,
            ready: self.readiness == Readiness::Immediate,
            exits: self.exiting_ports.lock().unwrap().contains(&port),
            stopped: self.stopped.clone(),
            killed: self.killed.clone(),
        }))
    }
}

// ========== 假驱动连接 ==========

/// 按设备返回预先准备的假驱动
#[derive(Default)]
pub struct FakeConnector {
    drivers: Mutex<HashMap<String, Arc<FakeDriver>>>,
    failing: Mutex<HashSet<String>>,
    attached: AtomicUsize,
}

impl FakeConnector {
    pub fn with_driver(self, device_id: &str, driver: FakeDriver) -> Self {
        self.drivers
            .lock()
            .unwrap()
            .insert(device_id.to_string(), Arc::new(driver));
        self
    }

    pub fn failing_for(self, device_id: &str) -> Self {
        self.failing.lock().unwrap().insert(device_id.to_string());
        self
    }

    pub fn driver(&self, device_id: &str) -> Option<Arc<FakeDriver>> {
        self.drivers.lock().unwrap().get(device_id).cloned()
    }

    pub fn attach_count(&self) -> usize {
        self.attached.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriverConnector for FakeConnector {
    async fn attach(
        &self,
        device_id: &DeviceId,
        _port: u16,
        _target: &AppTarget,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        self.attached.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(device_id.as_str()) {
            return Err(DriverError::Remote {
                status: 500,
                error: "session not created".to_string(),
                message: format!("device {} not reachable", device_id),
            });
        }
        let driver: Arc<dyn Driver> = self
            .drivers
            .lock()
            .unwrap()
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(FakeDriver::happy(device_id.as_str())))
            .clone();
        Ok(driver)
    }
}

// ========== 端口和设备 ==========

/// 从 5000 开始按步长 2 分配，指定的设备分配失败
pub struct ScriptedPorts {
    next: Mutex<u16>,
    step: u16,
    exhausted_for: HashSet<String>,
    claimed: Mutex<HashSet<u16>>,
    released: Mutex<Vec<u16>>,
}

impl ScriptedPorts {
    pub fn new(exhausted_for: &[&str]) -> Self {
        Self {
            next: Mutex::new(5000),
            step: 2,
            exhausted_for: exhausted_for.iter().map(|s| s.to_string()).collect(),
            claimed: Mutex::new(HashSet::new()),
            released: Mutex::new(Vec::new()),
        }
    }

    /// 每次都给出 5000
    pub fn sticky() -> Self {
        Self {
            step: 0,
            ..Self::new(&[])
        }
    }

    pub fn claimed_count(&self) -> usize {
        self.claimed.lock().unwrap().len()
    }

    pub fn released(&self) -> Vec<u16> {
        self.released.lock().unwrap().clone()
    }
}

impl PortSource for ScriptedPorts {
    fn allocate(&self, device_id: &DeviceId) -> Result<u16, PortError> {
        if self.exhausted_for.contains(device_id.as_str()) {
            return Err(PortError::Exhausted {
                base: 5000,
                attempts: 10,
            });
        }
        let mut next = self.next.lock().unwrap();
        let port = *next;
        *next += self.step;
        self.claimed.lock().unwrap().insert(port);
        Ok(port)
    }

    fn release(&self, port: u16) {
        self.claimed.lock().unwrap().remove(&port);
        self.released.lock().unwrap().push(port);
    }
}

/// 分配时阻塞调用线程，直到 `open` 被调用或超过一秒
pub struct GatedPorts {
    open: Arc<AtomicBool>,
}

impl GatedPorts {
    pub fn new() -> Self {
        Self {
            open: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn gate(&self) -> Arc<AtomicBool> {
        self.open.clone()
    }
}

impl PortSource for GatedPorts {
    fn allocate(&self, _device_id: &DeviceId) -> Result<u16, PortError> {
        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        while !self.open.load(Ordering::SeqCst) {
            if std::time::Instant::now() >= deadline {
                return Err(PortError::Exhausted {
                    base: 5000,
                    attempts: 1,
                });
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(5000)
    }

    fn release(&self, _port: u16) {}
}

/// 所有端口都空闲
pub struct AllFree;

impl PortProbe for AllFree {
    fn is_free(&self, _port: u16) -> bool {
        true
    }
}

/// 返回固定设备列表，或者模拟设备工具不可用
pub struct FakeDiscovery {
    devices: Option<Vec<DeviceId>>,
}

impl FakeDiscovery {
    pub fn with(devices: &[&str]) -> Self {
        Self {
            devices: Some(devices.iter().map(|d| DeviceId::new(*d)).collect()),
        }
    }

    pub fn broken() -> Self {
        Self { devices: None }
    }
}

#[async_trait]
impl DeviceSource for FakeDiscovery {
    async fn list_devices(&self) -> Result<Vec<DeviceId>, DiscoveryError> {
        self.devices.clone().ok_or_else(|| DiscoveryError::ToolFailed {
            program: "adb".to_string(),
            status: "exit status: 1".to_string(),
        })
    }
}
