//! 软件模拟外设
//!
//! 没有硬件时让板卡配置跑在环回总线上：电机理想跟踪目标速度，
//! 传感器返回可由测试设置的值。

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use amiro_protocol::{
    Axes3, Color, KinematicConstants, KinematicVelocity, MAX_BRIGHTNESS, NUM_LEDS, Position,
    PowerStatus, TargetPosition,
};
use parking_lot::Mutex;

use crate::error::DriverError;
use crate::peripherals::{InertialSensors, LightDriver, MotorDriver, PowerMonitor, ProximitySensors};

#[derive(Debug, Default)]
struct MotorState {
    speed: KinematicVelocity,
    odometry: Position,
    target_position: Option<TargetPosition>,
    constants: Option<KinematicConstants>,
}

/// 理想电机：实际速度立即等于目标速度
#[derive(Debug, Default)]
pub struct SimMotor {
    state: Mutex<MotorState>,
}

impl SimMotor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_position(&self) -> Option<TargetPosition> {
        self.state.lock().target_position
    }

    pub fn kinematic_constants(&self) -> Option<KinematicConstants> {
        self.state.lock().constants
    }
}

impl MotorDriver for SimMotor {
    fn actual_speed(&self) -> KinematicVelocity {
        self.state.lock().speed
    }

    fn odometry(&self) -> Position {
        self.state.lock().odometry
    }

    fn set_target_speed(&self, velocity: KinematicVelocity) -> Result<(), DriverError> {
        self.state.lock().speed = velocity;
        Ok(())
    }

    fn set_target_position(&self, target: TargetPosition) -> Result<(), DriverError> {
        self.state.lock().target_position = Some(target);
        Ok(())
    }

    fn set_odometry(&self, position: Position) -> Result<(), DriverError> {
        self.state.lock().odometry = position;
        Ok(())
    }

    fn set_kinematic_constants(&self, constants: KinematicConstants) -> Result<(), DriverError> {
        self.state.lock().constants = Some(constants);
        Ok(())
    }
}

/// 可设置读数的接近传感器组
#[derive(Debug)]
pub struct SimProximity {
    values: Mutex<Vec<u16>>,
    calibrations: AtomicU32,
    fail_calibration: AtomicBool,
}

impl SimProximity {
    pub fn new(count: usize) -> Self {
        Self {
            values: Mutex::new(vec![0; count]),
            calibrations: AtomicU32::new(0),
            fail_calibration: AtomicBool::new(false),
        }
    }

    pub fn set_value(&self, index: usize, value: u16) {
        if let Some(slot) = self.values.lock().get_mut(index) {
            *slot = value;
        }
    }

    /// 已执行的校准次数
    pub fn calibrations(&self) -> u32 {
        self.calibrations.load(Ordering::Relaxed)
    }

    /// 让后续校准返回错误
    pub fn set_fail_calibration(&self, fail: bool) {
        self.fail_calibration.store(fail, Ordering::Relaxed);
    }
}

impl ProximitySensors for SimProximity {
    fn count(&self) -> usize {
        self.values.lock().len()
    }

    fn read(&self, index: usize) -> Result<u16, DriverError> {
        self.values
            .lock()
            .get(index)
            .copied()
            .ok_or_else(|| DriverError::InvalidInput(format!("sensor index {} out of range", index)))
    }

    fn calibrate(&self) -> Result<(), DriverError> {
        self.calibrations.fetch_add(1, Ordering::Relaxed);
        if self.fail_calibration.load(Ordering::Relaxed) {
            return Err(DriverError::Peripheral("calibration failed".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SimPower {
    status: Mutex<PowerStatus>,
}

impl SimPower {
    pub fn new(status: PowerStatus) -> Self {
        Self {
            status: Mutex::new(status),
        }
    }

    pub fn set_status(&self, status: PowerStatus) {
        *self.status.lock() = status;
    }
}

impl PowerMonitor for SimPower {
    fn power_status(&self) -> Result<PowerStatus, DriverError> {
        Ok(*self.status.lock())
    }
}

#[derive(Debug, Default)]
pub struct SimImu {
    readings: Mutex<(Axes3, Axes3)>,
}

impl SimImu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_readings(&self, magnetometer: Axes3, gyroscope: Axes3) {
        *self.readings.lock() = (magnetometer, gyroscope);
    }
}

impl InertialSensors for SimImu {
    fn magnetometer(&self) -> Result<Axes3, DriverError> {
        Ok(self.readings.lock().0)
    }

    fn gyroscope(&self) -> Result<Axes3, DriverError> {
        Ok(self.readings.lock().1)
    }
}

/// 记录最近一次设置的 LED 灯环
#[derive(Debug)]
pub struct SimLights {
    colors: Mutex<[Color; NUM_LEDS]>,
    brightness: Mutex<u8>,
}

impl Default for SimLights {
    fn default() -> Self {
        Self {
            colors: Mutex::new([Color::BLACK; NUM_LEDS]),
            brightness: Mutex::new(MAX_BRIGHTNESS),
        }
    }
}

impl SimLights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn colors(&self) -> [Color; NUM_LEDS] {
        *self.colors.lock()
    }

    pub fn brightness(&self) -> u8 {
        *self.brightness.lock()
    }
}

impl LightDriver for SimLights {
    fn set_color(&self, index: u8, color: Color) -> Result<(), DriverError> {
        let mut colors = self.colors.lock();
        let slot = colors
            .get_mut(index as usize)
            .ok_or_else(|| DriverError::InvalidInput(format!("LED index {} out of range", index)))?;
        *slot = color;
        Ok(())
    }

    fn set_brightness(&self, percent: u8) -> Result<(), DriverError> {
        *self.brightness.lock() = percent.min(MAX_BRIGHTNESS);
        Ok(())
    }
}
