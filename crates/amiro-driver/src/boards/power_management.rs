use std::sync::Arc;

use amiro_protocol::{CalibrationGroup, Message, NUM_RING_SENSORS};

use super::{answer_calibration, proximity_reports, publish_reports};
use crate::dispatch::FrameHandler;
use crate::error::DriverError;
use crate::peripherals::{PowerMonitor, ProximitySensors};
use crate::transmitter::{PeriodicPublisher, Transmitter};

/// 电源管理板（同时承载环形接近传感器）
pub struct PowerManagement {
    ring: Arc<dyn ProximitySensors>,
    power: Arc<dyn PowerMonitor>,
    /// 配置了机器人编号时每个周期广播一次
    robot_id: Option<u8>,
}

impl PowerManagement {
    pub fn new(
        ring: Arc<dyn ProximitySensors>,
        power: Arc<dyn PowerMonitor>,
        robot_id: Option<u8>,
    ) -> Self {
        Self {
            ring,
            power,
            robot_id,
        }
    }
}

impl PeriodicPublisher for PowerManagement {
    fn publish(&self, tx: &Transmitter) -> Result<(), DriverError> {
        let ring = proximity_reports(self.ring.as_ref(), NUM_RING_SENSORS, |index, value| {
            Message::ProximityRing { index, value }
        });
        let power = self.power.power_status().map(Message::PowerStatus);
        let reports = publish_reports(tx, ring.chain(std::iter::once(power)));

        if let Some(robot_id) = self.robot_id {
            tx.broadcast_robot_id(robot_id)?;
        }
        reports
    }
}

impl FrameHandler for PowerManagement {
    fn handle_command(&self, command: &Message, tx: &Transmitter) -> Result<bool, DriverError> {
        match *command {
            Message::Calibrate {
                group: CalibrationGroup::Ring,
                requester,
            } => answer_calibration(self.ring.as_ref(), CalibrationGroup::Ring, requester, tx),
            _ => Ok(false),
        }
    }
}

impl std::fmt::Debug for PowerManagement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerManagement")
            .field("ring_sensors", &self.ring.count())
            .field("robot_id", &self.robot_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopologyConfig;
    use crate::metrics::NodeMetrics;
    use crate::sim::{SimPower, SimProximity};
    use amiro_can::{LoopbackBus, RxAdapter, SplittableAdapter};
    use amiro_protocol::{BoardId, ChargingFlags, FrameCodec, PowerStatus};
    use std::time::Duration;

    #[test]
    fn test_periodic_reports_and_robot_id() {
        let bus = LoopbackBus::new();
        let (_rx, tx) = bus.attach().split().unwrap();
        let (mut observer, _) = bus.attach().split().unwrap();
        let tx = Transmitter::new(
            tx,
            FrameCodec::default(),
            BoardId::POWER_MANAGEMENT,
            TopologyConfig::default(),
            Duration::from_millis(5),
            Arc::new(NodeMetrics::new()),
        );

        let ring = Arc::new(SimProximity::new(NUM_RING_SENSORS));
        ring.set_value(7, 4000);
        let status = PowerStatus {
            flags: ChargingFlags::from_byte(0b011),
            state_of_charge: 87,
            minutes_remaining: 140,
            power_consumption_mw: 5200,
        };
        let board = PowerManagement::new(ring, Arc::new(SimPower::new(status)), Some(9));
        board.publish(&tx).unwrap();

        let codec = FrameCodec::default();
        let envelopes: Vec<_> =
            std::iter::from_fn(|| observer.receive_timeout(Duration::from_millis(5)).ok())
                .map(|frame| codec.decode(&frame).unwrap())
                .collect();

        assert_eq!(envelopes.len(), NUM_RING_SENSORS + 2);
        assert_eq!(
            envelopes[7].message,
            Message::ProximityRing { index: 7, value: 4000 }
        );
        assert_eq!(envelopes[7].board, BoardId::POWER_MANAGEMENT);
        assert_eq!(envelopes[8].message, Message::PowerStatus(status));
        assert_eq!(envelopes[9].board, BoardId::BROADCAST);
        assert_eq!(envelopes[9].message, Message::RobotId(9));
    }

    #[test]
    fn test_only_ring_calibration_handled() {
        let bus = LoopbackBus::new();
        let (_rx, tx) = bus.attach().split().unwrap();
        let tx = Transmitter::new(
            tx,
            FrameCodec::default(),
            BoardId::POWER_MANAGEMENT,
            TopologyConfig::default(),
            Duration::from_millis(5),
            Arc::new(NodeMetrics::new()),
        );
        let ring = Arc::new(SimProximity::new(NUM_RING_SENSORS));
        let board = PowerManagement::new(ring.clone(), Arc::new(SimPower::default()), None);

        let floor = Message::Calibrate {
            group: CalibrationGroup::Floor,
            requester: BoardId(1),
        };
        assert!(!board.handle_command(&floor, &tx).unwrap());

        let ring_request = Message::Calibrate {
            group: CalibrationGroup::Ring,
            requester: BoardId(1),
        };
        assert!(board.handle_command(&ring_request, &tx).unwrap());
        assert_eq!(ring.calibrations(), 1);
    }
}
