//! 节点生命周期与多板交互测试（环回总线）

use std::sync::Arc;
use std::time::{Duration, Instant};

use amiro_can::{
    AmiroFrame, CanAdapter, CanDeviceError, CanDeviceErrorKind, CanError, LoopbackBus, RxAdapter,
    SplittableAdapter, TxAdapter,
};
use amiro_driver::boards::{DiWheelDrive, LightRing, PowerManagement};
use amiro_driver::sim::{SimImu, SimLights, SimMotor, SimPower, SimProximity};
use amiro_driver::{
    AmiroNode, CalibrationState, DriverError, IntentRebroadcast, NodeBuilder, NodeConfig,
    ShutdownSupervisor,
};
use amiro_protocol::{
    BoardId, CalibrationGroup, CalibrationStatus, Color, FrameCodec, KinematicVelocity, Message,
    NUM_FLOOR_SENSORS, NUM_RING_SENSORS,
};

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

fn fast_config(board: BoardId) -> NodeConfig {
    let mut config = NodeConfig::for_board(board);
    config.timing.receive_timeout_ms = 2;
    config.timing.periodic_interval_ms = 5;
    config.timing.join_timeout_ms = 500;
    config
}

fn app_node(bus: &LoopbackBus, board: BoardId) -> AmiroNode {
    NodeBuilder::new(fast_config(board))
        .start(bus.attach())
        .unwrap()
}

#[test]
fn test_wheel_drive_reports_reach_other_boards() {
    let bus = LoopbackBus::new();
    let motor = Arc::new(SimMotor::new());
    let floor = Arc::new(SimProximity::new(NUM_FLOOR_SENSORS));
    floor.set_value(2, 321);
    let wheel = NodeBuilder::new(fast_config(BoardId::DI_WHEEL_DRIVE))
        .profile(Arc::new(DiWheelDrive::new(
            motor.clone(),
            floor,
            Arc::new(SimImu::new()),
        )))
        .start(bus.attach())
        .unwrap();
    let app = app_node(&bus, BoardId(4));

    let velocity = KinematicVelocity::new(80_000, -12_000);
    app.transmitter().set_target_speed(velocity).unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        app.actual_speed().unwrap() == velocity && app.proximity_floor_value(2).unwrap() == 321
    }));
    assert!(matches!(
        app.proximity_floor_value(NUM_FLOOR_SENSORS),
        Err(DriverError::InvalidInput(_))
    ));
    assert!(wheel.metrics().periodic_cycles > 0);
    assert!(wheel.is_healthy());
    assert!(motor.target_position().is_none());
}

#[test]
fn test_light_ring_applies_commands() {
    let bus = LoopbackBus::new();
    let lights = Arc::new(SimLights::new());
    let _ring = NodeBuilder::new(fast_config(BoardId::LIGHT_RING))
        .handler(Arc::new(LightRing::new(lights.clone())))
        .start(bus.attach())
        .unwrap();
    let app = app_node(&bus, BoardId(4));

    app.transmitter().set_light_color(5, Color::rgb(1, 2, 3)).unwrap();
    app.transmitter().set_light_brightness(60).unwrap();

    assert!(wait_until(Duration::from_secs(2), || lights.brightness() == 60));
    assert_eq!(lights.colors()[5], Color::rgb(1, 2, 3));
}

#[test]
fn test_ring_calibration_request_response() {
    let bus = LoopbackBus::new();
    let ring = Arc::new(SimProximity::new(NUM_RING_SENSORS));
    let mut config = fast_config(BoardId::POWER_MANAGEMENT);
    config.robot_id = Some(12);
    let _power = NodeBuilder::new(config)
        .profile(Arc::new(PowerManagement::new(
            ring.clone(),
            Arc::new(SimPower::default()),
            Some(12),
        )))
        .start(bus.attach())
        .unwrap();
    let app = app_node(&bus, BoardId(4));

    app.calibrate_proximity_ring_values().unwrap();
    assert!(matches!(
        app.calibration_status(CalibrationGroup::Ring),
        CalibrationState::Pending | CalibrationState::Done(_)
    ));
    assert!(wait_until(Duration::from_secs(2), || {
        app.calibration_status(CalibrationGroup::Ring)
            == CalibrationState::Done(CalibrationStatus::Ok)
    }));
    assert_eq!(ring.calibrations(), 1);
    assert_eq!(
        app.calibration_status(CalibrationGroup::Floor),
        CalibrationState::Idle
    );

    assert!(wait_until(Duration::from_secs(2), || app.robot_id() == Some(12)));
}

#[test]
fn test_calibrating_own_sensors_is_rejected() {
    let bus = LoopbackBus::new();
    let wheel = app_node(&bus, BoardId::DI_WHEEL_DRIVE);
    assert!(matches!(
        wheel.calibrate_proximity_floor_values(),
        Err(DriverError::InvalidInput(_))
    ));
    assert_eq!(
        wheel.calibration_status(CalibrationGroup::Floor),
        CalibrationState::Idle
    );
}

#[test]
fn test_shutdown_broadcast_reaches_supervisor() {
    let bus = LoopbackBus::new();
    let supervisor = ShutdownSupervisor::new();
    let light = NodeBuilder::new(fast_config(BoardId::LIGHT_RING))
        .shutdown_signal(supervisor.signal())
        .start(bus.attach())
        .unwrap();
    let power = app_node(&bus, BoardId::POWER_MANAGEMENT);

    assert!(!supervisor.wait(Duration::from_millis(10)));
    power.transmitter().broadcast_shutdown().unwrap();
    assert!(supervisor.wait(Duration::from_secs(2)));
    assert!(light.shutdown_requested());
    // 发送者不会收到自己的广播
    assert!(!power.shutdown_requested());
}

#[test]
fn test_rx_thread_restarts_after_bus_off() {
    let bus = LoopbackBus::new();
    let node = app_node(&bus, BoardId(4));
    let mut peer = bus.attach();

    bus.inject_bus_off();
    assert!(wait_until(Duration::from_secs(2), || !bus.is_bus_off()));
    assert!(wait_until(Duration::from_secs(2), || node.metrics().bus_restarts >= 1));

    let velocity = KinematicVelocity::new(1, 2);
    let frame = FrameCodec::default()
        .encode(BoardId::DI_WHEEL_DRIVE, &Message::ActualSpeed(velocity))
        .unwrap();
    peer.send(frame).unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        node.actual_speed().unwrap() == velocity
    }));
    assert!(node.is_running());
}

#[test]
fn test_stop_is_prompt_with_long_periodic_interval() {
    let bus = LoopbackBus::new();
    let mut config = fast_config(BoardId(4));
    config.timing.periodic_interval_ms = 10_000;
    let mut node = NodeBuilder::new(config)
        .publisher(Arc::new(IntentRebroadcast))
        .start(bus.attach())
        .unwrap();
    assert!(node.is_healthy());

    let start = Instant::now();
    node.stop();
    assert!(start.elapsed() < Duration::from_millis(500));
    assert!(!node.is_running());
    assert_eq!(node.check_health(), (false, false));

    // 再次调用无副作用
    node.stop();
}

#[test]
fn test_intent_rebroadcast_repeats_last_command() {
    let bus = LoopbackBus::new();
    let node = NodeBuilder::new(fast_config(BoardId(4)))
        .publisher(Arc::new(IntentRebroadcast))
        .start(bus.attach())
        .unwrap();
    let (mut observer, _) = bus.attach().split().unwrap();

    let velocity = KinematicVelocity::new(3, 4);
    node.transmitter().set_target_speed(velocity).unwrap();

    let codec = FrameCodec::default();
    let mut seen = 0;
    let deadline = Instant::now() + Duration::from_secs(2);
    while seen < 3 && Instant::now() < deadline {
        if let Ok(frame) = observer.receive_timeout(Duration::from_millis(20)) {
            assert_eq!(
                codec.decode(&frame).unwrap().message,
                Message::TargetSpeed(velocity)
            );
            seen += 1;
        }
    }
    assert_eq!(seen, 3);
}

/// 接收若干次超时后报告设备消失
struct VanishingAdapter {
    timeouts_left: u32,
}

struct VanishingRx {
    timeouts_left: u32,
}

struct DiscardTx;

impl CanAdapter for VanishingAdapter {
    fn send(&mut self, _frame: AmiroFrame) -> Result<(), CanError> {
        Ok(())
    }

    fn receive(&mut self) -> Result<AmiroFrame, CanError> {
        Err(CanError::Timeout)
    }
}

impl SplittableAdapter for VanishingAdapter {
    type RxAdapter = VanishingRx;
    type TxAdapter = DiscardTx;

    fn split(self) -> Result<(VanishingRx, DiscardTx), CanError> {
        Ok((
            VanishingRx {
                timeouts_left: self.timeouts_left,
            },
            DiscardTx,
        ))
    }
}

impl RxAdapter for VanishingRx {
    fn receive_timeout(&mut self, timeout: Duration) -> Result<AmiroFrame, CanError> {
        if self.timeouts_left == 0 {
            return Err(CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::NoDevice,
                "adapter unplugged",
            )));
        }
        self.timeouts_left -= 1;
        std::thread::sleep(timeout);
        Err(CanError::Timeout)
    }
}

impl TxAdapter for DiscardTx {
    fn send_timeout(&mut self, _frame: AmiroFrame, _timeout: Duration) -> Result<(), CanError> {
        Ok(())
    }
}

#[test]
fn test_fatal_device_error_stops_node() {
    let node = NodeBuilder::new(fast_config(BoardId(4)))
        .start(VanishingAdapter { timeouts_left: 3 })
        .unwrap();

    assert!(wait_until(Duration::from_secs(2), || !node.is_running()));
    assert!(wait_until(Duration::from_secs(2), || !node.check_health().0));
    assert_eq!(node.metrics().rx_timeouts, 3);
}
