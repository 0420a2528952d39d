//! 一次性控制命令（启动节点 -> 发送 -> 停止）

use std::sync::Arc;
use std::time::{Duration, Instant};

use amiro_driver::{CalibrationState, IntentRebroadcast, NodeBuilder, ShutdownSupervisor};
use amiro_protocol::{CalibrationGroup, CalibrationStatus, Color, KinematicVelocity, MAX_BRIGHTNESS};
use anyhow::{Result, bail};
use clap::{Args, ValueEnum};
use tracing::info;

use crate::connection::{GlobalArgs, install_ctrlc};

#[derive(Args, Debug)]
pub struct SpeedCommand {
    /// 线速度（µm/s）
    #[arg(allow_hyphen_values = true)]
    pub v_um_s: i32,

    /// 角速度（µrad/s）
    #[arg(allow_hyphen_values = true)]
    pub w_urad_s: i32,

    /// 持续周期性重发的时间（ms），0 表示只发一次
    #[arg(long, default_value_t = 0)]
    pub hold_ms: u64,
}

impl SpeedCommand {
    pub fn execute(&self, global: &GlobalArgs) -> Result<()> {
        let supervisor = ShutdownSupervisor::new();
        let mut builder = NodeBuilder::default().shutdown_signal(supervisor.signal());
        if self.hold_ms > 0 {
            builder = builder.publisher(Arc::new(IntentRebroadcast));
        }
        let node = global.start(builder)?;

        let velocity = KinematicVelocity::new(self.v_um_s, self.w_urad_s);
        node.transmitter().set_target_speed(velocity)?;
        println!("target speed {:?} -> {}", velocity, node.config().topology.di_wheel_drive());

        if self.hold_ms > 0 {
            install_ctrlc(supervisor.signal())?;
            if supervisor.wait(Duration::from_millis(self.hold_ms)) {
                info!("Hold interrupted");
            }
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct ColorCommand {
    /// LED 序号
    pub index: u8,

    /// 颜色，十六进制 RRGGBB（可带 `#`）
    #[arg(value_parser = parse_color)]
    pub color: Color,
}

impl ColorCommand {
    pub fn execute(&self, global: &GlobalArgs) -> Result<()> {
        let node = global.start(NodeBuilder::default())?;
        node.transmitter().set_light_color(self.index, self.color)?;
        println!("LED {} -> {:?}", self.index, self.color);
        Ok(())
    }
}

/// 解析 `#RRGGBB` / `RRGGBB`
pub fn parse_color(text: &str) -> Result<Color, String> {
    let digits = text.strip_prefix('#').unwrap_or(text);
    let bytes = hex::decode(digits).map_err(|e| format!("invalid color {:?}: {}", text, e))?;
    match bytes.as_slice() {
        [r, g, b] => Ok(Color::rgb(*r, *g, *b)),
        _ => Err(format!("invalid color {:?}: expected 6 hex digits", text)),
    }
}

#[derive(Args, Debug)]
pub struct BrightnessCommand {
    /// 亮度（%）
    pub percent: u8,
}

impl BrightnessCommand {
    pub fn execute(&self, global: &GlobalArgs) -> Result<()> {
        if self.percent > MAX_BRIGHTNESS {
            bail!("brightness {} exceeds {}%", self.percent, MAX_BRIGHTNESS);
        }
        let node = global.start(NodeBuilder::default())?;
        node.transmitter().set_light_brightness(self.percent)?;
        println!("brightness -> {}%", self.percent);
        Ok(())
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorGroup {
    Ring,
    Floor,
}

impl From<SensorGroup> for CalibrationGroup {
    fn from(group: SensorGroup) -> Self {
        match group {
            SensorGroup::Ring => CalibrationGroup::Ring,
            SensorGroup::Floor => CalibrationGroup::Floor,
        }
    }
}

#[derive(Args, Debug)]
pub struct CalibrateCommand {
    /// 传感器组
    #[arg(value_enum)]
    pub group: SensorGroup,

    /// 等待校准结果的时间（ms）
    #[arg(long, default_value_t = 5000)]
    pub timeout_ms: u64,
}

impl CalibrateCommand {
    pub fn execute(&self, global: &GlobalArgs) -> Result<()> {
        let node = global.start(NodeBuilder::default())?;
        let group = CalibrationGroup::from(self.group);
        match group {
            CalibrationGroup::Ring => node.calibrate_proximity_ring_values()?,
            CalibrationGroup::Floor => node.calibrate_proximity_floor_values()?,
        }
        println!(
            "calibration of {:?} requested from {}",
            group,
            node.transmitter().calibration_owner(group)
        );

        let deadline = Instant::now() + Duration::from_millis(self.timeout_ms);
        loop {
            match node.calibration_status(group) {
                CalibrationState::Done(CalibrationStatus::Ok) => {
                    println!("calibration finished");
                    return Ok(());
                },
                CalibrationState::Done(CalibrationStatus::Failed) => {
                    bail!("calibration of {:?} failed on the sensor board", group)
                },
                _ if Instant::now() >= deadline => {
                    bail!("no calibration result within {} ms", self.timeout_ms)
                },
                _ => std::thread::sleep(Duration::from_millis(10)),
            }
        }
    }
}

/// 广播关机
pub fn shutdown(global: &GlobalArgs) -> Result<()> {
    let node = global.start(NodeBuilder::default())?;
    node.transmitter().broadcast_shutdown()?;
    println!("shutdown broadcast sent");
    Ok(())
}
