//! 入站帧分发
//!
//! 每一帧走 解码 → 分发 → (更新缓存 | 执行命令 | 忽略)。
//! `Dispatcher::dispatch` 不做 IO 等待，接收线程之外也可以直接调用（测试就是这样做的）。

use std::sync::Arc;
use std::sync::atomic::Ordering;

use amiro_can::AmiroFrame;
use amiro_protocol::{Addressing, BoardId, Category, Envelope, FrameCodec, Message, ProtocolError};
use tracing::{debug, info, trace, warn};

use crate::config::NodeConfig;
use crate::error::DriverError;
use crate::metrics::NodeMetrics;
use crate::shell::ShellRelay;
use crate::shutdown::ShutdownSignal;
use crate::state::{CalibrationState, NetworkState};
use crate::transmitter::Transmitter;

/// 板卡命令处理的能力接口
///
/// 只会收到目标为本板、且不属于 shell / 校准结果的命令类消息。
pub trait FrameHandler: Send + Sync {
    /// 返回 `Ok(false)` 表示本板不支持该命令
    fn handle_command(&self, command: &Message, tx: &Transmitter) -> Result<bool, DriverError>;
}

/// 一帧的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// 写入了状态缓存（传感器报告、机器人编号、校准结果）
    StateUpdated(Category),
    CommandHandled(Category),
    CommandFailed(Category),
    ShutdownRequested,
    /// 交给了 shell 中继
    Shell(Category),
    Ignored(IgnoreReason),
    /// 已识别类别但载荷非法，丢弃
    Dropped(ProtocolError),
    /// 未知类别或非本协议的帧
    Unknown,
    /// 帧合法，但本地缓冲已满，丢弃
    Overflow(Category),
}

/// 忽略原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// 命令的目标是其他板
    NotAddressed,
    /// 本板自己的报告
    OwnReport,
    /// 发送者不在 `accept_from` 中
    NotAccepted,
    /// 没有注册命令处理器，或处理器不支持该命令
    Unsupported,
    /// 关机帧魔数错误
    InvalidMagic,
    /// 不是当前 shell 目标板发来的输出
    InactiveShell,
}

/// 分发器
pub struct Dispatcher {
    codec: FrameCodec,
    local: BoardId,
    config: NodeConfig,
    state: Arc<NetworkState>,
    shutdown: ShutdownSignal,
    shell: Arc<ShellRelay>,
    transmitter: Arc<Transmitter>,
    handler: Option<Arc<dyn FrameHandler>>,
    metrics: Arc<NodeMetrics>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &NodeConfig,
        codec: FrameCodec,
        state: Arc<NetworkState>,
        shutdown: ShutdownSignal,
        shell: Arc<ShellRelay>,
        transmitter: Arc<Transmitter>,
        handler: Option<Arc<dyn FrameHandler>>,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        Self {
            codec,
            local: config.board(),
            config: config.clone(),
            state,
            shutdown,
            shell,
            transmitter,
            handler,
            metrics,
        }
    }

    pub fn dispatch(&self, frame: &AmiroFrame) -> Disposition {
        let envelope = match self.codec.decode(frame) {
            Ok(envelope) => envelope,
            Err(ProtocolError::UnknownCategory { id }) => {
                self.metrics.rx_unknown_category.fetch_add(1, Ordering::Relaxed);
                trace!("RX: unknown frame 0x{:X}", id);
                return Disposition::Unknown;
            },
            Err(ProtocolError::InvalidMagic { actual }) => {
                self.metrics.rx_ignored.fetch_add(1, Ordering::Relaxed);
                debug!("RX: shutdown frame with wrong magic 0x{:04X} ignored", actual);
                return Disposition::Ignored(IgnoreReason::InvalidMagic);
            },
            Err(e @ ProtocolError::InvalidLength { .. }) => {
                self.metrics.rx_invalid_length.fetch_add(1, Ordering::Relaxed);
                warn!("RX: dropping frame 0x{:X}: {}", frame.id, e);
                return Disposition::Dropped(e);
            },
            Err(e) => {
                self.metrics.rx_malformed.fetch_add(1, Ordering::Relaxed);
                warn!("RX: dropping malformed frame 0x{:X}: {}", frame.id, e);
                return Disposition::Dropped(e);
            },
        };

        match envelope.category().addressing() {
            Addressing::Sender => self.update_cache(envelope),
            Addressing::Broadcast => self.handle_broadcast(envelope),
            Addressing::Target if envelope.board != self.local => {
                self.ignore(IgnoreReason::NotAddressed)
            },
            Addressing::Target => self.handle_addressed(envelope),
        }
    }

    fn ignore(&self, reason: IgnoreReason) -> Disposition {
        self.metrics.rx_ignored.fetch_add(1, Ordering::Relaxed);
        Disposition::Ignored(reason)
    }

    fn update_cache(&self, envelope: Envelope) -> Disposition {
        let Envelope { board, message } = envelope;
        if board == self.local {
            return self.ignore(IgnoreReason::OwnReport);
        }
        if !self.config.accepts_reports_from(board) {
            return self.ignore(IgnoreReason::NotAccepted);
        }
        if !self.state.apply_report(board, &message) {
            return self.ignore(IgnoreReason::NotAccepted);
        }
        self.metrics.rx_state_updates.fetch_add(1, Ordering::Relaxed);
        Disposition::StateUpdated(message.category())
    }

    fn handle_broadcast(&self, envelope: Envelope) -> Disposition {
        match envelope.message {
            Message::Shutdown => {
                if !self.shutdown.is_requested() {
                    info!("RX: shutdown broadcast received");
                }
                self.shutdown.request();
                Disposition::ShutdownRequested
            },
            Message::RobotId(id) => {
                if self.state.robot_id() != Some(id) {
                    info!("RX: robot id set to {}", id);
                }
                self.state.set_robot_id(id);
                self.metrics.rx_state_updates.fetch_add(1, Ordering::Relaxed);
                Disposition::StateUpdated(Category::RobotId)
            },
            _ => self.ignore(IgnoreReason::Unsupported),
        }
    }

    fn handle_addressed(&self, envelope: Envelope) -> Disposition {
        let category = envelope.category();
        match envelope.message {
            Message::ShellQuery { from, chunk } => match self.shell.on_query(from, chunk) {
                Ok(()) => Disposition::Shell(category),
                // 邮箱满已在中继中计数和记录
                Err(_) => Disposition::Overflow(category),
            },
            Message::ShellReply { from, chunk } => {
                if self.shell.on_reply(from, chunk) {
                    Disposition::Shell(category)
                } else {
                    self.ignore(IgnoreReason::InactiveShell)
                }
            },
            Message::ShellSwitch { target } => {
                self.shell.switch_to(target);
                Disposition::Shell(category)
            },
            Message::CalibrationDone { group, status } => {
                debug!("RX: calibration of {:?} finished: {:?}", group, status);
                self.state
                    .set_calibration(group, CalibrationState::Done(status));
                self.metrics.rx_state_updates.fetch_add(1, Ordering::Relaxed);
                Disposition::StateUpdated(category)
            },
            message => self.invoke_command(&message),
        }
    }

    fn invoke_command(&self, message: &Message) -> Disposition {
        let category = message.category();
        let Some(handler) = &self.handler else {
            debug!("RX: no handler for {:?}", category);
            return self.ignore(IgnoreReason::Unsupported);
        };

        self.metrics.rx_commands.fetch_add(1, Ordering::Relaxed);
        match handler.handle_command(message, &self.transmitter) {
            Ok(true) => Disposition::CommandHandled(category),
            Ok(false) => {
                debug!("RX: {:?} not supported by this board", category);
                self.ignore(IgnoreReason::Unsupported)
            },
            Err(e) => {
                self.metrics.rx_command_errors.fetch_add(1, Ordering::Relaxed);
                warn!("RX: command {:?} failed: {}", category, e);
                Disposition::CommandFailed(category)
            },
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("local", &self.local)
            .field("accept_from", &self.config.accept_from)
            .field("has_handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}
