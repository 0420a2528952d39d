//! # AMiRo CAN Transport
//!
//! CAN 总线传输层抽象：核心层只依赖这里的 trait，具体后端可替换。
//!
//! - `loopback`: 进程内虚拟总线（测试、仿真）
//! - `socketcan`: Linux SocketCAN（仅 Linux）

use std::time::Duration;
use thiserror::Error;

// 重新导出 amiro-protocol 中的 AmiroFrame
pub use amiro_protocol::AmiroFrame;

pub mod loopback;

pub use loopback::{LoopbackAdapter, LoopbackBus, LoopbackRxAdapter, LoopbackTxAdapter};

#[cfg(target_os = "linux")]
pub mod socketcan;

#[cfg(target_os = "linux")]
pub use socketcan::{SocketCanAdapter, SocketCanRxAdapter, SocketCanTxAdapter};

/// CAN 适配层统一错误类型
#[derive(Error, Debug)]
pub enum CanError {
    /// 底层 IO 错误
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 设备相关错误（接口不存在、未启动、配置失败等）
    #[error("Device Error: {0}")]
    Device(#[from] CanDeviceError),

    /// 收发超时（非致命，可以重试）
    #[error("Timeout")]
    Timeout,

    /// 接收缓冲区溢出
    #[error("Buffer overflow")]
    BufferOverflow,

    /// 总线关闭，需要 `restart()` 后才能继续收发
    #[error("Bus off")]
    BusOff,

    /// 设备未启动
    #[error("Device not started")]
    NotStarted,
}

impl CanError {
    /// 是否需要停止使用该适配器
    ///
    /// 超时、总线关闭、溢出都可以在原地恢复，只有设备级致命错误才返回 `true`。
    pub fn is_fatal(&self) -> bool {
        match self {
            CanError::Device(e) => e.is_fatal(),
            CanError::NotStarted => true,
            _ => false,
        }
    }
}

/// 设备/后端错误的结构化分类（不绑定具体后端实现）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanDeviceErrorKind {
    Unknown,
    /// 接口不存在
    NotFound,
    /// 设备已断开
    NoDevice,
    /// 权限不足/被拒绝
    AccessDenied,
    /// 资源忙/被占用
    Busy,
    /// 不支持的配置
    UnsupportedConfig,
    /// 解析到无效帧
    InvalidFrame,
    /// 其他后端错误
    Backend,
}

/// 结构化设备错误：kind + message
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct CanDeviceError {
    pub kind: CanDeviceErrorKind,
    pub message: String,
}

impl CanDeviceError {
    pub fn new(kind: CanDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 致命错误表示设备已不可用，需要重新初始化或停止操作。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            CanDeviceErrorKind::NoDevice
                | CanDeviceErrorKind::AccessDenied
                | CanDeviceErrorKind::NotFound
        )
    }
}

impl From<String> for CanDeviceError {
    fn from(message: String) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for CanDeviceError {
    fn from(message: &str) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

/// 控制器错误状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusState {
    #[default]
    ErrorActive,
    ErrorPassive,
    BusOff,
}

/// 总线状态查询结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusStatus {
    pub state: BusState,
    /// 发送失败次数（后端可用时）
    pub tx_errors: u32,
    /// 接收错误次数（后端可用时）
    pub rx_errors: u32,
}

/// CAN 适配器 Trait
///
/// 语义：
/// - `send()`: 写入控制器发送缓冲区即返回
/// - `receive()`: 阻塞直到收到有效数据帧或超时
pub trait CanAdapter {
    /// 发送一帧
    fn send(&mut self, frame: AmiroFrame) -> Result<(), CanError>;

    /// 接收一帧（错误帧由后端过滤或映射为 `CanError`）
    fn receive(&mut self) -> Result<AmiroFrame, CanError>;

    /// 设置后续 `receive()` 调用的超时时间（默认空操作）
    fn set_receive_timeout(&mut self, _timeout: Duration) {}

    /// 带超时的接收
    fn receive_timeout(&mut self, timeout: Duration) -> Result<AmiroFrame, CanError> {
        self.set_receive_timeout(timeout);
        self.receive()
    }

    /// 非阻塞接收
    fn try_receive(&mut self) -> Result<Option<AmiroFrame>, CanError> {
        match self.receive_timeout(Duration::ZERO) {
            Ok(frame) => Ok(Some(frame)),
            Err(CanError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 带超时的发送（默认忽略超时）
    fn send_timeout(&mut self, frame: AmiroFrame, _timeout: Duration) -> Result<(), CanError> {
        self.send(frame)
    }

    /// 查询总线状态
    fn status(&self) -> Result<BusStatus, CanError> {
        Ok(BusStatus::default())
    }

    /// 总线关闭后重启控制器
    fn restart(&mut self) -> Result<(), CanError> {
        Ok(())
    }
}

/// RX 适配器 Trait（用于接收线程）
pub trait RxAdapter {
    /// 阻塞接收，最长等待 `timeout`
    ///
    /// - 超时 → `CanError::Timeout`（可重试）
    /// - 总线关闭 → `CanError::BusOff`（调用 `restart()` 后重试）
    fn receive_timeout(&mut self, timeout: Duration) -> Result<AmiroFrame, CanError>;

    fn status(&self) -> Result<BusStatus, CanError> {
        Ok(BusStatus::default())
    }

    fn restart(&mut self) -> Result<(), CanError> {
        Ok(())
    }
}

/// TX 适配器 Trait（所有发送方共享，外层负责加锁）
pub trait TxAdapter {
    /// 发送一帧，最长阻塞 `timeout`
    fn send_timeout(&mut self, frame: AmiroFrame, timeout: Duration) -> Result<(), CanError>;

    fn restart(&mut self) -> Result<(), CanError> {
        Ok(())
    }
}

/// 可分离适配器 Trait
///
/// 分离为独立的 RX 和 TX 适配器，两者可以在不同线程中并发使用
/// （CAN 全双工，收发之间不需要互斥）。
pub trait SplittableAdapter: CanAdapter {
    type RxAdapter: RxAdapter;
    type TxAdapter: TxAdapter;

    /// 分离后原适配器不再可用（消费 `self`）
    fn split(self) -> Result<(Self::RxAdapter, Self::TxAdapter), CanError>;
}
