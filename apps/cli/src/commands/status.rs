//! 状态查询：启动节点，收一段时间报告后输出缓存

use std::fmt;
use std::time::Duration;

use amiro_driver::{AmiroNode, MetricsSnapshot, NodeBuilder};
use amiro_protocol::{
    Axes3, CalibrationGroup, KinematicVelocity, NUM_FLOOR_SENSORS, NUM_RING_SENSORS, Position,
    PowerStatus,
};
use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::connection::GlobalArgs;

#[derive(Args, Debug)]
pub struct StatusCommand {
    /// 收集报告的时间（ms）
    #[arg(long, default_value_t = 500)]
    pub wait_ms: u64,

    /// 输出 JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusCommand {
    pub fn execute(&self, global: &GlobalArgs) -> Result<()> {
        let node = global.start(NodeBuilder::default())?;
        std::thread::sleep(Duration::from_millis(self.wait_ms));

        let report = StatusReport::collect(&node)?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", report);
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct PowerReport {
    pub charger_connected: bool,
    pub charging: bool,
    pub state_of_charge: u8,
    pub minutes_remaining: u16,
    pub power_consumption_mw: u16,
}

impl From<PowerStatus> for PowerReport {
    fn from(status: PowerStatus) -> Self {
        Self {
            charger_connected: status.flags.charger_connected(),
            charging: status.flags.is_charging(),
            state_of_charge: status.state_of_charge,
            minutes_remaining: status.minutes_remaining,
            power_consumption_mw: status.power_consumption_mw,
        }
    }
}

/// 节点缓存中其他板的最新状态
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub board: u8,
    pub robot_id: Option<u8>,
    pub actual_speed: KinematicVelocity,
    pub odometry: Position,
    pub proximity_ring: [u16; NUM_RING_SENSORS],
    pub proximity_floor: [u16; NUM_FLOOR_SENSORS],
    pub power: PowerReport,
    pub magnetometer: Axes3,
    pub gyroscope: Axes3,
    pub ring_calibration: String,
    pub floor_calibration: String,
    pub metrics: MetricsSnapshot,
}

impl StatusReport {
    pub fn collect(node: &AmiroNode) -> Result<Self> {
        Ok(Self {
            board: node.board().raw(),
            robot_id: node.robot_id(),
            actual_speed: node.actual_speed()?,
            odometry: node.odometry()?,
            proximity_ring: node.proximity_ring_values()?,
            proximity_floor: node.proximity_floor_values()?,
            power: node.power_status()?.into(),
            magnetometer: node.magnetometer()?,
            gyroscope: node.gyroscope()?,
            ring_calibration: format!("{:?}", node.calibration_status(CalibrationGroup::Ring)),
            floor_calibration: format!("{:?}", node.calibration_status(CalibrationGroup::Floor)),
            metrics: node.metrics(),
        })
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.robot_id {
            Some(id) => writeln!(f, "robot {} (seen from board {})", id, self.board)?,
            None => writeln!(f, "robot ? (seen from board {})", self.board)?,
        }
        writeln!(
            f,
            "  speed     v={} µm/s  w={} µrad/s",
            self.actual_speed.v_um_s, self.actual_speed.w_urad_s
        )?;
        writeln!(
            f,
            "  odometry  x={} µm  y={} µm  f={} µrad",
            self.odometry.x_um, self.odometry.y_um, self.odometry.f_z_urad
        )?;
        writeln!(f, "  ring      {:?} ({})", self.proximity_ring, self.ring_calibration)?;
        writeln!(f, "  floor     {:?} ({})", self.proximity_floor, self.floor_calibration)?;
        writeln!(
            f,
            "  power     {}%  {} min  {} mW{}",
            self.power.state_of_charge,
            self.power.minutes_remaining,
            self.power.power_consumption_mw,
            if self.power.charging { "  charging" } else { "" }
        )?;
        writeln!(
            f,
            "  imu       mag=({}, {}, {})  gyro=({}, {}, {})",
            self.magnetometer.x,
            self.magnetometer.y,
            self.magnetometer.z,
            self.gyroscope.x,
            self.gyroscope.y,
            self.gyroscope.z
        )?;
        writeln!(
            f,
            "  frames    rx={} tx={} dropped={}",
            self.metrics.rx_frames_total,
            self.metrics.tx_frames_total,
            self.metrics.rx_dropped()
        )
    }
}
