mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use device_onboard::error::{LaunchError, ServiceError};
use device_onboard::infrastructure::{PortAllocator, PortStrategy};
use device_onboard::models::{DeviceId, SessionState};
use device_onboard::orchestrator::{LaunchSettings, SessionLauncher};

use common::{
    test_config, AllFree, FakeBackend, FakeConnector, GatedPorts, Readiness, ScriptedPorts,
};

struct Rig {
    ports: Arc<ScriptedPorts>,
    backend: Arc<FakeBackend>,
    connector: Arc<FakeConnector>,
    launcher: SessionLauncher,
}

fn rig(ports: ScriptedPorts, backend: FakeBackend, connector: FakeConnector) -> Rig {
    let ports = Arc::new(ports);
    let backend = Arc::new(backend);
    let connector = Arc::new(connector);
    let launcher = SessionLauncher::new(
        ports.clone(),
        backend.clone(),
        connector.clone(),
        LaunchSettings::from_config(&test_config()),
    );
    Rig {
        ports,
        backend,
        connector,
        launcher,
    }
}

#[tokio::test(start_paused = true)]
async fn test_service_never_ready_times_out() {
    let rig = rig(
        ScriptedPorts::new(&[]),
        FakeBackend::new(Readiness::Never),
        FakeConnector::default(),
    );

    let err = match rig.launcher.launch_session(DeviceId::new("A")).await {
        Err(e) => e,
        Ok(_) => panic!("服务未就绪时不应该返回会话"),
    };

    assert!(matches!(
        err,
        LaunchError::ServiceStartTimeout {
            port: 5000,
            attempts: 3
        }
    ));
    assert_eq!(rig.connector.attach_count(), 0);
    assert_eq!(rig.backend.stop_count(), 1);
    assert_eq!(rig.backend.kill_count(), 0);
    assert_eq!(rig.ports.claimed_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_busy_port_is_reallocated() {
    let rig = rig(
        ScriptedPorts::new(&[]),
        FakeBackend::new(Readiness::Immediate).with_busy_ports(&[5000]),
        FakeConnector::default(),
    );

    let session = match rig.launcher.launch_session(DeviceId::new("A")).await {
        Ok(session) => session,
        Err(e) => panic!("换端口后应该启动成功: {}", e),
    };

    assert_eq!(session.port(), 5002);
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(rig.ports.released(), vec![5000]);
    assert_eq!(rig.backend.spawn_count(), 1);

    tokio_test::assert_ok!(session.close().await);
    assert_eq!(rig.backend.stop_count(), 1);
    assert_eq!(rig.ports.claimed_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_busy_ports_give_up_after_retries() {
    let rig = rig(
        ScriptedPorts::new(&[]),
        FakeBackend::new(Readiness::Immediate).with_busy_ports(&[5000, 5002, 5004]),
        FakeConnector::default(),
    );

    let err = match rig.launcher.launch_session(DeviceId::new("A")).await {
        Err(e) => e,
        Ok(_) => panic!("端口都被占用时不应该返回会话"),
    };

    assert!(matches!(
        err,
        LaunchError::ServiceSpawn {
            port: 5004,
            source: ServiceError::PortInUse { .. }
        }
    ));
    assert_eq!(rig.backend.spawn_count(), 0);
    assert_eq!(rig.ports.claimed_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_exited_service_is_restarted_on_new_port() {
    let rig = rig(
        ScriptedPorts::new(&[]),
        FakeBackend::new(Readiness::Immediate).with_exiting_ports(&[5000]),
        FakeConnector::default(),
    );
    let started = tokio::time::Instant::now();

    let session = match rig.launcher.launch_session(DeviceId::new("A")).await {
        Ok(session) => session,
        Err(e) => panic!("换端口后应该启动成功: {}", e),
    };

    // 退出的进程不用等到就绪检查用完
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(session.port(), 5002);
    assert_eq!(rig.backend.spawn_count(), 2);
    assert_eq!(rig.backend.stop_count(), 1);
    assert_eq!(rig.ports.released(), vec![5000]);

    tokio_test::assert_ok!(session.close().await);
    assert_eq!(rig.backend.stop_count(), 2);
    assert_eq!(rig.backend.kill_count(), 0);
    assert_eq!(rig.ports.claimed_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_exiting_services_give_up_after_retries() {
    let rig = rig(
        ScriptedPorts::new(&[]),
        FakeBackend::new(Readiness::Immediate).with_exiting_ports(&[5000, 5002, 5004]),
        FakeConnector::default(),
    );

    let err = match rig.launcher.launch_session(DeviceId::new("A")).await {
        Err(e) => e,
        Ok(_) => panic!("服务一直退出时不应该返回会话"),
    };

    assert!(matches!(
        err,
        LaunchError::ServiceSpawn {
            port: 5004,
            source: ServiceError::Exited { .. }
        }
    ));
    assert_eq!(rig.backend.spawn_count(), 3);
    assert_eq!(rig.backend.stop_count(), 3);
    assert_eq!(rig.connector.attach_count(), 0);
    assert_eq!(rig.ports.claimed_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_same_port_again_is_released_once() {
    let rig = rig(
        ScriptedPorts::sticky(),
        FakeBackend::new(Readiness::Immediate).with_busy_ports(&[5000]),
        FakeConnector::default(),
    );

    let err = match rig.launcher.launch_session(DeviceId::new("A")).await {
        Err(e) => e,
        Ok(_) => panic!("端口被占用时不应该返回会话"),
    };

    assert!(matches!(
        err,
        LaunchError::ServiceSpawn {
            port: 5000,
            source: ServiceError::PortInUse { .. }
        }
    ));
    assert_eq!(rig.ports.released(), vec![5000]);
    assert_eq!(rig.ports.claimed_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hash_only_busy_port_fails_without_leaking_claim() {
    let device = DeviceId::new("A");
    let ports = Arc::new(PortAllocator::new(
        5000,
        2,
        10,
        PortStrategy::Hash,
        Arc::new(AllFree),
    ));
    let hashed = ports.hashed_port(&device);
    let backend = Arc::new(FakeBackend::new(Readiness::Immediate).with_busy_ports(&[hashed]));
    let launcher = SessionLauncher::new(
        ports.clone(),
        backend.clone(),
        Arc::new(FakeConnector::default()),
        LaunchSettings::from_config(&test_config()),
    );

    let err = match launcher.launch_session(device.clone()).await {
        Err(e) => e,
        Ok(_) => panic!("哈希端口被占用时不应该返回会话"),
    };

    assert!(matches!(err, LaunchError::PortAllocation(_)));
    assert_eq!(backend.spawn_count(), 0);
    assert_eq!(ports.claimed_count(), 0);
}

#[tokio::test]
async fn test_port_allocation_leaves_runtime_free() {
    let ports = Arc::new(GatedPorts::new());
    let gate = ports.gate();
    let launcher = SessionLauncher::new(
        ports,
        Arc::new(FakeBackend::new(Readiness::Immediate)),
        Arc::new(FakeConnector::default()),
        LaunchSettings::from_config(&test_config()),
    );

    // 分配阻塞期间，同一个运行时上的任务仍然可以执行
    tokio::spawn(async move { gate.store(true, Ordering::SeqCst) });

    let session = match launcher.launch_session(DeviceId::new("A")).await {
        Ok(session) => session,
        Err(e) => panic!("分配不应该阻塞运行时: {}", e),
    };
    assert_eq!(session.port(), 5000);
    tokio_test::assert_ok!(session.close().await);
}

#[tokio::test(start_paused = true)]
async fn test_attach_failure_stops_service() {
    let rig = rig(
        ScriptedPorts::new(&[]),
        FakeBackend::new(Readiness::Immediate),
        FakeConnector::default().failing_for("A"),
    );

    let err = match rig.launcher.launch_session(DeviceId::new("A")).await {
        Err(e) => e,
        Ok(_) => panic!("驱动连接失败时不应该返回会话"),
    };

    assert!(matches!(err, LaunchError::DriverAttach { port: 5000, .. }));
    assert_eq!(rig.connector.attach_count(), 1);
    assert_eq!(rig.backend.stop_count(), 1);
    assert_eq!(rig.backend.kill_count(), 0);
    assert_eq!(rig.ports.claimed_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_port_exhaustion_starts_nothing() {
    let rig = rig(
        ScriptedPorts::new(&["A"]),
        FakeBackend::new(Readiness::Immediate),
        FakeConnector::default(),
    );

    let err = match rig.launcher.launch_session(DeviceId::new("A")).await {
        Err(e) => e,
        Ok(_) => panic!("端口分配失败时不应该返回会话"),
    };

    assert!(matches!(err, LaunchError::PortAllocation(_)));
    assert_eq!(rig.backend.spawn_count(), 0);
    assert_eq!(rig.connector.attach_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_quits_driver_and_stops_service_once() {
    let rig = rig(
        ScriptedPorts::new(&[]),
        FakeBackend::new(Readiness::Immediate),
        FakeConnector::default(),
    );

    let mut session = match rig.launcher.launch_session(DeviceId::new("A")).await {
        Ok(session) => session,
        Err(e) => panic!("启动失败: {}", e),
    };
    assert_eq!(session.driver().device_id(), Some("A"));

    session.finish(SessionState::Succeeded);
    assert_eq!(session.state(), SessionState::Succeeded);
    session.close().await.unwrap();

    let driver = rig.connector.driver("A").unwrap();
    assert!(driver.did("quit"));
    assert_eq!(rig.backend.stop_count(), 1);
    assert_eq!(rig.backend.kill_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_session_kills_service() {
    let rig = rig(
        ScriptedPorts::new(&[]),
        FakeBackend::new(Readiness::Immediate),
        FakeConnector::default(),
    );

    let session = match rig.launcher.launch_session(DeviceId::new("A")).await {
        Ok(session) => session,
        Err(e) => panic!("启动失败: {}", e),
    };
    drop(session);

    assert_eq!(rig.backend.stop_count(), 0);
    assert_eq!(rig.backend.kill_count(), 1);
}
