//! # AMiRo CLI
//!
//! 通过 CAN 总线与 AMiRo 各板卡交互的命令行工具。
//!
//! ```bash
//! # 观察总线流量
//! amiro-cli --iface can0 monitor --count 100
//!
//! # 发送命令（内部：启动节点 -> 发送 -> 停止）
//! amiro-cli speed 50000 0
//! amiro-cli color 3 '#ff8800'
//!
//! # 打开 LightRing 的 shell
//! amiro-cli shell 3
//!
//! # 没有硬件：在进程内环回总线上跑整台机器人
//! amiro-cli simulate --seconds 5
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod connection;

use commands::{
    BrightnessCommand, CalibrateCommand, ColorCommand, MonitorCommand, ShellCommand,
    SimulateCommand, SpeedCommand, StatusCommand,
};
use connection::GlobalArgs;

/// AMiRo CLI - 板间 CAN 通信工具
#[derive(Parser, Debug)]
#[command(name = "amiro-cli")]
#[command(about = "Command-line tool for AMiRo inter-board CAN communication", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 打印总线上的帧（原始 + 解码）
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },

    /// 读取其他板的最新状态
    Status {
        #[command(flatten)]
        args: StatusCommand,
    },

    /// 设置 DiWheelDrive 目标速度
    Speed {
        #[command(flatten)]
        args: SpeedCommand,
    },

    /// 设置一个 LED 的颜色
    Color {
        #[command(flatten)]
        args: ColorCommand,
    },

    /// 设置 LED 亮度
    Brightness {
        #[command(flatten)]
        args: BrightnessCommand,
    },

    /// 请求传感器校准
    Calibrate {
        #[command(flatten)]
        args: CalibrateCommand,
    },

    /// 广播关机命令
    Shutdown,

    /// 连接到某块板的 shell
    Shell {
        #[command(flatten)]
        args: ShellCommand,
    },

    /// 在环回总线上模拟整台机器人
    Simulate {
        #[command(flatten)]
        args: SimulateCommand,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("amiro_cli=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let global = &cli.global;

    match cli.command {
        Commands::Monitor { args } => args.execute(global),
        Commands::Status { args } => args.execute(global),
        Commands::Speed { args } => args.execute(global),
        Commands::Color { args } => args.execute(global),
        Commands::Brightness { args } => args.execute(global),
        Commands::Calibrate { args } => args.execute(global),
        Commands::Shutdown => commands::shutdown(global),
        Commands::Shell { args } => args.execute(global),
        Commands::Simulate { args } => args.execute(),
    }
}
