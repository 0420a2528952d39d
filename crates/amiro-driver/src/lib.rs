//! 驱动层模块
//!
//! 每块 AMiRo 板上运行的通信核心：
//! - 发送角色（即时发送 + 周期广播，共用发送锁）
//! - 接收角色（接收线程、解码分发、命令处理）
//! - 分布式状态缓存（逐字段原子更新，无锁读取）
//! - 远程 shell 中继
//! - 各板卡配置与外设接口
//!
//! # 使用场景
//!
//! 应用通过 [`NodeBuilder`] 组装节点，之后在任意线程调用
//! [`AmiroNode::transmitter`] 发送命令、调用访问器读取其他板的最新状态。

mod builder;
pub mod boards;
pub mod config;
pub mod dispatch;
mod error;
pub mod metrics;
mod node;
pub mod peripherals;
pub mod pipeline;
pub mod shell;
pub mod shutdown;
pub mod sim;
pub mod state;
pub mod transmitter;

pub use builder::NodeBuilder;
pub use config::{LayoutConfig, NodeConfig, TimingConfig, TopologyConfig};
pub use dispatch::{Disposition, Dispatcher, FrameHandler, IgnoreReason};
pub use error::DriverError;
pub use metrics::{MetricsSnapshot, NodeMetrics};
pub use node::AmiroNode;
pub use pipeline::{PipelineConfig, periodic_loop, rx_loop};
pub use shell::{Console, RelayMode, RemoteShellPort, ShellRelay, ShellRoute};
pub use shutdown::{ShutdownSignal, ShutdownSupervisor};
pub use state::{BoardState, CalibrationState, NetworkState};
pub use transmitter::{IntentRebroadcast, OutboundIntent, PeriodicPublisher, Transmitter};
