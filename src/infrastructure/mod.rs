//! 基础设施层
//!
//! 持有稀缺资源（设备、端口、服务进程、驱动会话），只暴露能力，不认识注册流程。

pub mod appium;
pub mod discovery;
pub mod driver;
pub mod port;
pub mod service;
pub mod timed_driver;

pub use appium::{AppiumBackend, AppiumConnector, AppiumDriver};
pub use discovery::{AdbDiscovery, DeviceSource};
pub use driver::{wait_for, AppTarget, Capabilities, Driver, DriverConnector, ElementRef};
pub use port::{PortAllocator, PortProbe, PortSource, PortStrategy, TcpPortProbe};
pub use service::{ServiceBackend, ServiceHandle, ServiceInstance};
pub use timed_driver::TimedDriver;
