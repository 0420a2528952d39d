//! 整机模拟：三块板卡 + CLI 节点挂在同一条进程内环回总线上

use std::sync::Arc;
use std::time::{Duration, Instant};

use amiro_can::LoopbackBus;
use amiro_driver::boards::{DiWheelDrive, LightRing, PowerManagement};
use amiro_driver::sim::{SimImu, SimLights, SimMotor, SimPower, SimProximity};
use amiro_driver::{AmiroNode, NodeBuilder, NodeConfig, ShutdownSupervisor};
use amiro_protocol::{
    Axes3, BoardId, CalibrationGroup, Color, KinematicVelocity, NUM_FLOOR_SENSORS, NUM_LEDS,
    NUM_RING_SENSORS,
};
use anyhow::{Result, bail};
use clap::Args;
use tracing::info;

use super::status::StatusReport;
use crate::connection::{CLI_BOARD_ID, install_ctrlc};

#[derive(Args, Debug)]
pub struct SimulateCommand {
    /// 运行时间（秒），0 表示直到 Ctrl-C
    #[arg(long, default_value_t = 0)]
    pub seconds: u64,

    /// 板卡周期广播间隔（ms）
    #[arg(long, default_value_t = 100)]
    pub interval_ms: u64,

    /// 机器人编号（由 PowerManagement 广播）
    #[arg(long, default_value_t = 1)]
    pub robot_id: u8,
}

/// 模拟的整台机器人
struct SimRobot {
    ring: Arc<SimProximity>,
    lights: Arc<SimLights>,
    boards: Vec<AmiroNode>,
    supervisors: Vec<ShutdownSupervisor>,
}

impl SimulateCommand {
    fn board_config(&self, board: BoardId) -> NodeConfig {
        let mut config = NodeConfig::for_board(board);
        config.timing.periodic_interval_ms = self.interval_ms;
        config
    }

    fn start_robot(&self, bus: &LoopbackBus) -> Result<SimRobot> {
        let floor = Arc::new(SimProximity::new(NUM_FLOOR_SENSORS));
        let imu = Arc::new(SimImu::new());
        imu.set_readings(Axes3::new(120, -40, 300), Axes3::new(0, 0, 5));
        let ring = Arc::new(SimProximity::new(NUM_RING_SENSORS));
        for index in 0..NUM_RING_SENSORS {
            ring.set_value(index, 1000 + 100 * index as u16);
        }
        let lights = Arc::new(SimLights::new());

        let supervisors: Vec<_> = (0..3).map(|_| ShutdownSupervisor::new()).collect();
        let boards = vec![
            NodeBuilder::new(self.board_config(BoardId::DI_WHEEL_DRIVE))
                .profile(Arc::new(DiWheelDrive::new(
                    Arc::new(SimMotor::new()),
                    floor,
                    imu,
                )))
                .shutdown_signal(supervisors[0].signal())
                .start(bus.attach())?,
            NodeBuilder::new(self.board_config(BoardId::POWER_MANAGEMENT))
                .profile(Arc::new(PowerManagement::new(
                    ring.clone(),
                    Arc::new(SimPower::default()),
                    Some(self.robot_id),
                )))
                .shutdown_signal(supervisors[1].signal())
                .start(bus.attach())?,
            NodeBuilder::new(self.board_config(BoardId::LIGHT_RING))
                .handler(Arc::new(LightRing::new(lights.clone())))
                .shutdown_signal(supervisors[2].signal())
                .start(bus.attach())?,
        ];

        Ok(SimRobot {
            ring,
            lights,
            boards,
            supervisors,
        })
    }

    pub fn execute(&self) -> Result<()> {
        let bus = LoopbackBus::new();
        let robot = self.start_robot(&bus)?;

        let supervisor = ShutdownSupervisor::new();
        install_ctrlc(supervisor.signal())?;
        let app = NodeBuilder::new(self.board_config(BoardId(CLI_BOARD_ID)))
            .start(bus.attach())?;
        info!("Simulated robot {} running on loopback bus", self.robot_id);

        let tx = app.transmitter();
        tx.set_target_speed(KinematicVelocity::new(100_000, 250_000))?;
        tx.set_light_brightness(80)?;
        for index in 0..NUM_LEDS as u8 {
            let color = if index % 2 == 0 { Color::RED } else { Color::BLUE };
            tx.set_light_color(index, color)?;
        }
        app.calibrate_proximity_ring_values()?;

        let started = Instant::now();
        let run_for = Duration::from_secs(self.seconds);
        loop {
            let stop = supervisor.wait(Duration::from_secs(1));
            print!("{}", StatusReport::collect(&app)?);
            if stop || (self.seconds > 0 && started.elapsed() >= run_for) {
                break;
            }
        }

        println!(
            "lights: brightness {}%  colors {:?}",
            robot.lights.brightness(),
            robot.lights.colors()
        );
        println!(
            "ring calibrations: {}  ({:?})",
            robot.ring.calibrations(),
            app.calibration_status(CalibrationGroup::Ring)
        );

        tx.broadcast_shutdown()?;
        let all_notified = robot
            .supervisors
            .iter()
            .all(|board| board.wait(Duration::from_secs(1)));
        drop(robot.boards);
        if !all_notified {
            bail!("not every simulated board received the shutdown broadcast");
        }
        println!("all boards acknowledged shutdown");
        Ok(())
    }
}
