//! 远程 shell 中继
//!
//! 一个物理控制台（串口 / 终端）挂在某块板上，可以切换到总线上任意一块板的 shell：
//!
//! ```text
//!  控制台所在板                           目标板
//!  input(bytes) ── ShellQuery ──────────▶ RemoteShellPort::read()
//!  Console     ◀── ShellReply ────────── RemoteShellPort::write()
//! ```
//!
//! 同一发送者的帧在总线上保持顺序，发送端在一次加锁内连续发出所有块，
//! 因此两个方向上的字节顺序端到端保持不变。

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use amiro_protocol::{BoardId, ShellChunk};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::DriverError;
use crate::metrics::NodeMetrics;
use crate::transmitter::Transmitter;

/// 本地字节输出端（控制台或本地 shell 的输入）
pub trait Console: Send {
    fn write(&mut self, bytes: &[u8]);
}

/// 中继当前的链路状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// 控制台连着本地 shell，也没有远端在使用本板 shell
    Idle,
    /// 本板控制台的输入转发给 `target`
    Forwarding { target: BoardId },
    /// 本板 shell 正在为 `console_owner` 上的控制台服务
    Serving { console_owner: BoardId },
}

/// `input` 的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellRoute {
    Local,
    Remote(BoardId),
}

/// shell 中继
pub struct ShellRelay {
    local: BoardId,
    transmitter: Arc<Transmitter>,
    /// 控制台当前连接的板（0 = 本地）
    active: AtomicU8,
    /// 最近一次发来查询的控制台所在板
    peer: Mutex<Option<BoardId>>,
    console: Mutex<Option<Box<dyn Console>>>,
    local_shell: Mutex<Option<Box<dyn Console>>>,
    inbox_tx: Sender<ShellChunk>,
    inbox_rx: Receiver<ShellChunk>,
    metrics: Arc<NodeMetrics>,
}

impl ShellRelay {
    pub fn new(
        local: BoardId,
        transmitter: Arc<Transmitter>,
        mailbox_capacity: usize,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        let (inbox_tx, inbox_rx) = bounded(mailbox_capacity);
        Self {
            local,
            transmitter,
            active: AtomicU8::new(BoardId::BROADCAST.raw()),
            peer: Mutex::new(None),
            console: Mutex::new(None),
            local_shell: Mutex::new(None),
            inbox_tx,
            inbox_rx,
            metrics,
        }
    }

    /// 设置接收远端 shell 输出的控制台
    pub fn set_console(&self, console: Box<dyn Console>) {
        *self.console.lock() = Some(console);
    }

    /// 设置本地 shell 的输入端（控制台连接本地时 `input` 写到这里）
    pub fn set_local_shell(&self, shell: Box<dyn Console>) {
        *self.local_shell.lock() = Some(shell);
    }

    pub fn active_target(&self) -> BoardId {
        BoardId(self.active.load(Ordering::Acquire))
    }

    pub fn mode(&self) -> RelayMode {
        let active = self.active_target();
        if !active.is_broadcast() {
            return RelayMode::Forwarding { target: active };
        }
        match *self.peer.lock() {
            Some(console_owner) => RelayMode::Serving { console_owner },
            None => RelayMode::Idle,
        }
    }

    /// 把控制台切换到 `target`（0 或本板 = 本地 shell）
    pub fn switch_to(&self, target: BoardId) {
        let target = if target == self.local {
            BoardId::BROADCAST
        } else {
            target
        };
        let previous = self.active.swap(target.raw(), Ordering::AcqRel);
        if previous != target.raw() {
            info!("Shell: console switched from {} to {}", BoardId(previous), target);
        }
    }

    /// 控制台输入：按顺序转发给当前目标，目标为本地时写入本地 shell
    pub fn input(&self, bytes: &[u8]) -> Result<ShellRoute, DriverError> {
        let target = self.active_target();
        if target.is_broadcast() {
            if let Some(shell) = self.local_shell.lock().as_mut() {
                shell.write(bytes);
            }
            return Ok(ShellRoute::Local);
        }
        self.transmitter.query_shell(target, bytes)?;
        Ok(ShellRoute::Remote(target))
    }

    /// 远端 shell 端口（本板 shell 通过它读写总线上的控制台）
    pub fn remote_port(self: &Arc<Self>) -> RemoteShellPort {
        RemoteShellPort {
            relay: self.clone(),
        }
    }

    /// 收到 ShellQuery：记下控制台所在板，数据放入邮箱
    ///
    /// 邮箱满时丢弃该块并返回 `ChannelFull`。
    pub(crate) fn on_query(&self, from: BoardId, chunk: ShellChunk) -> Result<(), DriverError> {
        {
            let mut peer = self.peer.lock();
            if *peer != Some(from) {
                debug!("Shell: serving console on {}", from);
                *peer = Some(from);
            }
        }

        match self.inbox_tx.try_send(chunk) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.metrics.shell_drops.fetch_add(1, Ordering::Relaxed);
                warn!("Shell: mailbox full, dropping {} bytes from {}", chunk.len(), from);
                Err(DriverError::ChannelFull)
            },
            Err(TrySendError::Disconnected(_)) => Err(DriverError::ChannelClosed),
        }
    }

    /// 收到 ShellReply：只接受当前目标板的输出，返回是否写入了控制台
    pub(crate) fn on_reply(&self, from: BoardId, chunk: ShellChunk) -> bool {
        if from != self.active_target() {
            debug!("Shell: ignoring reply from {} (not the active target)", from);
            return false;
        }
        if let Some(console) = self.console.lock().as_mut() {
            console.write(chunk.as_bytes());
        }
        true
    }
}

impl std::fmt::Debug for ShellRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellRelay")
            .field("local", &self.local)
            .field("mode", &self.mode())
            .field("pending", &self.inbox_rx.len())
            .finish_non_exhaustive()
    }
}

/// 本板 shell 面向总线的读写端
#[derive(Debug, Clone)]
pub struct RemoteShellPort {
    relay: Arc<ShellRelay>,
}

impl RemoteShellPort {
    /// 读取远端控制台输入：等待第一块最多 `timeout`，然后取走已到达的全部数据
    pub fn read(&self, timeout: Duration) -> Result<Vec<u8>, DriverError> {
        let first = match self.relay.inbox_rx.recv_timeout(timeout) {
            Ok(chunk) => chunk,
            Err(RecvTimeoutError::Timeout) => return Err(DriverError::Timeout),
            Err(RecvTimeoutError::Disconnected) => return Err(DriverError::ChannelClosed),
        };

        let mut bytes = first.as_bytes().to_vec();
        while let Ok(chunk) = self.relay.inbox_rx.try_recv() {
            bytes.extend_from_slice(chunk.as_bytes());
        }
        Ok(bytes)
    }

    /// 把 shell 输出发回控制台所在板
    pub fn write(&self, bytes: &[u8]) -> Result<(), DriverError> {
        let peer = self.peer().ok_or_else(|| {
            DriverError::InvalidInput("no remote console attached".to_string())
        })?;
        self.relay.transmitter.reply_shell(peer, bytes)
    }

    /// 当前连接的控制台所在板
    pub fn peer(&self) -> Option<BoardId> {
        *self.relay.peer.lock()
    }
}
