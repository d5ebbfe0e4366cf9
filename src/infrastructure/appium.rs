//! Appium 后端
//!
//! - `AppiumBackend`：启动 appium 进程并轮询 `/status`
//! - `AppiumConnector` / `AppiumDriver`：通过 WebDriver HTTP 接口控制设备

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value as JsonValue};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{DriverError, ServiceError};
use crate::infrastructure::driver::{AppTarget, Capabilities, Driver, DriverConnector, ElementRef};
use crate::infrastructure::port::{PortProbe, TcpPortProbe};
use crate::infrastructure::service::{ServiceBackend, ServiceInstance};
use crate::models::{DeviceId, Locator};

/// W3C 元素引用的键
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

// ========== 服务进程 ==========

/// 启动 appium 服务进程
pub struct AppiumBackend {
    program: PathBuf,
    sdk_root: Option<PathBuf>,
    client: Client,
}

impl AppiumBackend {
    pub fn new(config: &Config) -> Self {
        Self {
            program: PathBuf::from(&config.service_program),
            sdk_root: config.android_sdk_root.as_ref().map(PathBuf::from),
            client: http_client(Duration::from_secs(2)),
        }
    }

    /// 子进程的 PATH：在当前 PATH 后追加 SDK 的工具目录
    fn child_path(&self) -> Option<OsString> {
        let root = self.sdk_root.as_ref()?;
        let mut paths: Vec<PathBuf> = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        paths.push(root.join("platform-tools"));
        paths.push(root.join("cmdline-tools").join("latest").join("bin"));
        std::env::join_paths(paths).ok()
    }
}

#[async_trait]
impl ServiceBackend for AppiumBackend {
    async fn spawn(&self, port: u16) -> Result<Box<dyn ServiceInstance>, ServiceError> {
        let free = tokio::task::spawn_blocking(move || TcpPortProbe.is_free(port))
            .await
            .unwrap_or(false);
        if !free {
            return Err(ServiceError::PortInUse { port });
        }

        let mut cmd = Command::new(&self.program);
        cmd.args([
            "--port",
            &port.to_string(),
            "--base-path",
            "/",
            "--use-drivers",
            "uiautomator2",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

        if let Some(root) = &self.sdk_root {
            cmd.env("ANDROID_HOME", root);
        }
        if let Some(path) = self.child_path() {
            cmd.env("PATH", path);
        }

        let child = cmd.spawn().map_err(|source| ServiceError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;
        debug!("appium 进程已启动 (端口 {}, pid {:?})", port, child.id());

        Ok(Box::new(AppiumProcess {
            port,
            child,
            client: self.client.clone(),
        }))
    }
}

/// 一个 appium 进程
pub struct AppiumProcess {
    port: u16,
    child: Child,
    client: Client,
}

#[async_trait]
impl ServiceInstance for AppiumProcess {
    fn port(&self) -> u16 {
        self.port
    }

    async fn is_ready(&mut self) -> Result<bool, ServiceError> {
        if let Ok(Some(status)) = self.child.try_wait() {
            return Err(ServiceError::Exited {
                port: self.port,
                status: status.to_string(),
            });
        }
        let url = format!("http://127.0.0.1:{}/status", self.port);
        let ready = match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json::<JsonValue>()
                .await
                .map(|body| body["value"]["ready"].as_bool().unwrap_or(true))
                .unwrap_or(false),
            _ => false,
        };
        Ok(ready)
    }

    async fn stop(&mut self) -> Result<(), ServiceError> {
        let port = self.port;
        if let Ok(Some(_)) = self.child.try_wait() {
            return Ok(());
        }
        self.child
            .kill()
            .await
            .map_err(|source| ServiceError::Stop { port, source })
    }

    fn kill(&mut self) {
        let _ = self.child.start_kill();
    }
}

// ========== 驱动会话 ==========

/// 打开 appium 驱动会话
pub struct AppiumConnector {
    client: Client,
}

impl AppiumConnector {
    pub fn new(config: &Config) -> Self {
        Self {
            client: http_client(config.action_timeout()),
        }
    }
}

#[async_trait]
impl DriverConnector for AppiumConnector {
    async fn attach(
        &self,
        device_id: &DeviceId,
        port: u16,
        target: &AppTarget,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        let base_url = format!("http://127.0.0.1:{}", port);
        info!("🧩 [设备 {}] 在端口 {} 上创建驱动", device_id, port);

        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "platformName": "Android",
                    "appium:automationName": "UiAutomator2",
                    "appium:deviceName": device_id.as_str(),
                    "appium:udid": device_id.as_str(),
                    "appium:appPackage": target.package,
                    "appium:appActivity": target.activity,
                    "appium:autoGrantPermissions": true,
                },
                "firstMatch": [{}],
            }
        });

        let value = send(&self.client, Method::POST, &format!("{}/session", base_url), Some(body)).await?;
        let session_id = value["sessionId"]
            .as_str()
            .ok_or_else(|| DriverError::InvalidResponse(format!("缺少 sessionId: {}", value)))?
            .to_string();

        let mut capabilities = value["capabilities"].as_object().cloned().unwrap_or_default();
        capabilities
            .entry("appium:udid")
            .or_insert_with(|| json!(device_id.as_str()));

        debug!("[设备 {}] 驱动会话 {}", device_id, session_id);

        Ok(Arc::new(AppiumDriver {
            client: self.client.clone(),
            session_url: format!("{}/session/{}", base_url, session_id),
            capabilities,
        }))
    }
}

/// WebDriver 驱动会话
pub struct AppiumDriver {
    client: Client,
    session_url: String,
    capabilities: Capabilities,
}

impl AppiumDriver {
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
    ) -> Result<JsonValue, DriverError> {
        let url = format!("{}{}", self.session_url, path);
        send(&self.client, method, &url, body).await
    }
}

#[async_trait]
impl Driver for AppiumDriver {
    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn find_element(&self, locator: &Locator) -> Result<Option<ElementRef>, DriverError> {
        let body = json!({ "using": locator.using.as_webdriver(), "value": locator.value });
        match self.command(Method::POST, "/element", Some(body)).await {
            Ok(value) => element_id(&value).map(Some),
            Err(DriverError::Remote { error, .. }) if error == "no such element" => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn click(&self, element: &ElementRef) -> Result<(), DriverError> {
        let path = format!("/element/{}/click", element.0);
        self.command(Method::POST, &path, Some(json!({}))).await?;
        Ok(())
    }

    async fn type_text(&self, element: &ElementRef, text: &str) -> Result<(), DriverError> {
        let path = format!("/element/{}/value", element.0);
        self.command(Method::POST, &path, Some(json!({ "text": text })))
            .await?;
        Ok(())
    }

    async fn element_text(&self, element: &ElementRef) -> Result<String, DriverError> {
        let path = format!("/element/{}/text", element.0);
        let value = self.command(Method::GET, &path, None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn press_key(&self, keycode: u32) -> Result<(), DriverError> {
        self.command(
            Method::POST,
            "/appium/device/press_keycode",
            Some(json!({ "keycode": keycode })),
        )
        .await?;
        Ok(())
    }

    async fn activate_app(&self, package: &str) -> Result<(), DriverError> {
        self.command(
            Method::POST,
            "/appium/device/activate_app",
            Some(json!({ "appId": package })),
        )
        .await?;
        Ok(())
    }

    async fn terminate_app(&self, package: &str) -> Result<(), DriverError> {
        self.command(
            Method::POST,
            "/appium/device/terminate_app",
            Some(json!({ "appId": package })),
        )
        .await?;
        Ok(())
    }

    async fn quit(&self) -> Result<(), DriverError> {
        send(&self.client, Method::DELETE, &self.session_url, None).await?;
        Ok(())
    }
}

/// 发送请求并取出 `value` 字段；非 2xx 响应转换为 `DriverError::Remote`
async fn send(
    client: &Client,
    method: Method,
    url: &str,
    body: Option<JsonValue>,
) -> Result<JsonValue, DriverError> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await?;
    let status = response.status();
    let payload: JsonValue = response.json().await.unwrap_or(JsonValue::Null);
    let value = payload.get("value").cloned().unwrap_or(JsonValue::Null);

    if status.is_success() {
        Ok(value)
    } else {
        Err(remote_error(status.as_u16(), &value))
    }
}

fn remote_error(status: u16, value: &JsonValue) -> DriverError {
    DriverError::Remote {
        status,
        error: value["error"].as_str().unwrap_or("unknown error").to_string(),
        message: value["message"].as_str().unwrap_or_default().to_string(),
    }
}

fn element_id(value: &JsonValue) -> Result<ElementRef, DriverError> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get("ELEMENT"))
        .and_then(JsonValue::as_str)
        .map(|id| ElementRef(id.to_string()))
        .ok_or_else(|| DriverError::InvalidResponse(format!("无法识别的元素引用: {}", value)))
}
