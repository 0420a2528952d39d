//! 驱动层错误类型定义

use amiro_can::CanError;
use amiro_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// CAN 传输错误
    #[error("CAN driver error: {0}")]
    Can(#[from] CanError),

    /// 协议编解码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 配置无效或无法解析
    #[error("Configuration error: {0}")]
    Config(String),

    /// 内部通道已关闭（接收线程退出）
    #[error("Channel closed")]
    ChannelClosed,

    /// 内部邮箱已满，数据被丢弃
    #[error("Mailbox full")]
    ChannelFull,

    /// IO 线程错误
    #[error("IO thread error: {0}")]
    IoThread(String),

    /// 外设驱动返回的错误
    #[error("Peripheral error: {0}")]
    Peripheral(String),

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,

    /// 无效输入（如越界的传感器索引）
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
