//! Builder 模式实现
//!
//! 提供链式构造 `AmiroNode` 的便捷方式。

use std::sync::Arc;

use amiro_can::SplittableAdapter;
#[cfg(target_os = "linux")]
use amiro_can::SocketCanAdapter;

use crate::config::NodeConfig;
use crate::dispatch::FrameHandler;
use crate::error::DriverError;
use crate::node::{AmiroNode, NodeParts};
use crate::shell::Console;
use crate::shutdown::{ShutdownSignal, ShutdownSupervisor};
use crate::transmitter::PeriodicPublisher;

/// 节点 Builder（链式构造）
///
/// 板卡配置通过 `profile()` 同时注册为周期发布器和命令处理器；
/// 只发命令的控制程序可以都不注册。
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use amiro_can::LoopbackBus;
/// use amiro_driver::boards::LightRing;
/// use amiro_driver::sim::SimLights;
/// use amiro_driver::{NodeBuilder, NodeConfig};
/// use amiro_protocol::BoardId;
///
/// let bus = LoopbackBus::new();
/// let lights = Arc::new(SimLights::new());
/// let node = NodeBuilder::new(NodeConfig::for_board(BoardId::LIGHT_RING))
///     .handler(Arc::new(LightRing::new(lights)))
///     .start(bus.attach())
///     .unwrap();
/// assert!(node.is_running());
/// ```
pub struct NodeBuilder {
    config: NodeConfig,
    publisher: Option<Arc<dyn PeriodicPublisher>>,
    handler: Option<Arc<dyn FrameHandler>>,
    console: Option<Box<dyn Console>>,
    local_shell: Option<Box<dyn Console>>,
    shutdown: Option<ShutdownSignal>,
}

impl NodeBuilder {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            publisher: None,
            handler: None,
            console: None,
            local_shell: None,
            shutdown: None,
        }
    }

    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn PeriodicPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn handler(mut self, handler: Arc<dyn FrameHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// 同时作为周期发布器和命令处理器
    pub fn profile<P>(self, profile: Arc<P>) -> Self
    where
        P: PeriodicPublisher + FrameHandler + 'static,
    {
        self.publisher(profile.clone()).handler(profile)
    }

    /// 显示远端 shell 输出的控制台
    pub fn console(mut self, console: Box<dyn Console>) -> Self {
        self.console = Some(console);
        self
    }

    /// 控制台连接本地时的输入端
    pub fn local_shell(mut self, shell: Box<dyn Console>) -> Self {
        self.local_shell = Some(shell);
        self
    }

    /// 使用外部监督者的关机信号；不设置时节点自带一个
    pub fn shutdown_signal(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    /// 分离适配器并启动接收线程（有发布器时还有周期线程）
    pub fn start<C>(self, can: C) -> Result<AmiroNode, DriverError>
    where
        C: SplittableAdapter,
        C::RxAdapter: Send + 'static,
        C::TxAdapter: Send + 'static,
    {
        let parts = NodeParts {
            config: self.config,
            publisher: self.publisher,
            handler: self.handler,
            console: self.console,
            local_shell: self.local_shell,
            shutdown: self
                .shutdown
                .unwrap_or_else(|| ShutdownSupervisor::new().signal()),
        };
        AmiroNode::start(parts, can)
    }

    /// 在 SocketCAN 接口上启动（仅 Linux）
    #[cfg(target_os = "linux")]
    pub fn start_socketcan(self, interface: &str) -> Result<AmiroNode, DriverError> {
        let adapter = SocketCanAdapter::new(interface)?;
        self.start(adapter)
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new(NodeConfig::default())
    }
}
