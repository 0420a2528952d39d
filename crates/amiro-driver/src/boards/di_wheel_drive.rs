use std::sync::Arc;

use amiro_protocol::{CalibrationGroup, Message, NUM_FLOOR_SENSORS};

use super::{answer_calibration, proximity_reports, publish_reports};
use crate::dispatch::FrameHandler;
use crate::error::DriverError;
use crate::peripherals::{InertialSensors, MotorDriver, ProximitySensors};
use crate::transmitter::{PeriodicPublisher, Transmitter};

/// 差速驱动板
pub struct DiWheelDrive {
    motor: Arc<dyn MotorDriver>,
    floor: Arc<dyn ProximitySensors>,
    imu: Arc<dyn InertialSensors>,
}

impl DiWheelDrive {
    pub fn new(
        motor: Arc<dyn MotorDriver>,
        floor: Arc<dyn ProximitySensors>,
        imu: Arc<dyn InertialSensors>,
    ) -> Self {
        Self { motor, floor, imu }
    }
}

impl PeriodicPublisher for DiWheelDrive {
    fn publish(&self, tx: &Transmitter) -> Result<(), DriverError> {
        let motion = [
            Ok(Message::ActualSpeed(self.motor.actual_speed())),
            Ok(Message::Odometry(self.motor.odometry())),
        ];
        let floor = proximity_reports(self.floor.as_ref(), NUM_FLOOR_SENSORS, |index, value| {
            Message::ProximityFloor { index, value }
        });
        let imu = [
            self.imu.magnetometer().map(Message::Magnetometer),
            self.imu.gyroscope().map(Message::Gyroscope),
        ];

        publish_reports(tx, motion.into_iter().chain(floor).chain(imu))
    }
}

impl FrameHandler for DiWheelDrive {
    fn handle_command(&self, command: &Message, tx: &Transmitter) -> Result<bool, DriverError> {
        match *command {
            Message::TargetSpeed(velocity) => self.motor.set_target_speed(velocity)?,
            Message::SetOdometry(position) => self.motor.set_odometry(position)?,
            Message::TargetPosition(target) => self.motor.set_target_position(target)?,
            Message::KinematicConstants(constants) => {
                self.motor.set_kinematic_constants(constants)?
            },
            Message::Calibrate {
                group: CalibrationGroup::Floor,
                requester,
            } => {
                return answer_calibration(
                    self.floor.as_ref(),
                    CalibrationGroup::Floor,
                    requester,
                    tx,
                );
            },
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl std::fmt::Debug for DiWheelDrive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiWheelDrive")
            .field("floor_sensors", &self.floor.count())
            .finish_non_exhaustive()
    }
}
