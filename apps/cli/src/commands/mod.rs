//! 命令定义和实现

pub mod control;
pub mod monitor;
pub mod shell;
pub mod simulate;
pub mod status;

pub use control::{BrightnessCommand, CalibrateCommand, ColorCommand, SpeedCommand, shutdown};
pub use monitor::MonitorCommand;
pub use shell::ShellCommand;
pub use simulate::SimulateCommand;
pub use status::StatusCommand;
