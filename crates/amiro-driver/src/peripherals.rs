//! 外设接口
//!
//! 芯片级驱动（电机 PWM、接近传感器、电源监测、LED、IMU）不在本层实现，
//! 板卡配置只通过这些 trait 调用它们。所有方法取 `&self`，
//! 因为接收线程和周期线程会同时访问同一个外设。

use amiro_protocol::{Axes3, Color, KinematicConstants, KinematicVelocity, Position, PowerStatus, TargetPosition};

use crate::error::DriverError;

/// 差速驱动电机控制器
pub trait MotorDriver: Send + Sync {
    /// 当前实际速度
    fn actual_speed(&self) -> KinematicVelocity;

    /// 当前里程计位姿
    fn odometry(&self) -> Position;

    fn set_target_speed(&self, velocity: KinematicVelocity) -> Result<(), DriverError>;

    fn set_target_position(&self, target: TargetPosition) -> Result<(), DriverError>;

    /// 覆盖里程计（重新定位）
    fn set_odometry(&self, position: Position) -> Result<(), DriverError>;

    fn set_kinematic_constants(&self, constants: KinematicConstants) -> Result<(), DriverError>;
}

/// 一组接近传感器（环形或地面）
pub trait ProximitySensors: Send + Sync {
    /// 传感器数量
    fn count(&self) -> usize;

    fn read(&self, index: usize) -> Result<u16, DriverError>;

    /// 重新采集基线
    fn calibrate(&self) -> Result<(), DriverError>;
}

/// 电池 / 电源监测
pub trait PowerMonitor: Send + Sync {
    fn power_status(&self) -> Result<PowerStatus, DriverError>;
}

/// 磁力计 + 陀螺仪
pub trait InertialSensors: Send + Sync {
    fn magnetometer(&self) -> Result<Axes3, DriverError>;

    fn gyroscope(&self) -> Result<Axes3, DriverError>;
}

/// LED 灯环
pub trait LightDriver: Send + Sync {
    fn set_color(&self, index: u8, color: Color) -> Result<(), DriverError>;

    fn set_brightness(&self, percent: u8) -> Result<(), DriverError>;
}
