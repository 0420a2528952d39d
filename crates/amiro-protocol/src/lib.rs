//! # AMiRo Protocol
//!
//! AMiRo 板间 CAN 总线协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: 板卡 ID 与 CAN ID 分区布局（类别 / 板卡 / 索引）
//! - `category`: 帧类别定义（寻址方式、DLC、索引范围）
//! - `constants`: 协议常量（缩放位移、关机魔数、传感器数量）
//! - `messages`: 载荷中的物理量类型
//! - `codec`: `Message` 与 `AmiroFrame` 之间的编解码
//!
//! ## 字节序
//!
//! 所有多字节字段均为大端字节序（高位在前）。
//! 本模块提供了字节序转换工具函数。

pub mod category;
pub mod codec;
pub mod constants;
pub mod ids;
pub mod messages;

// 重新导出常用类型
pub use category::*;
pub use codec::*;
pub use constants::*;
pub use ids::*;
pub use messages::*;

/// CAN 2.0 帧的统一抽象
///
/// 协议层和传输层之间的中间类型：协议层通过 `FrameCodec` 生成/解析它，
/// 传输层（`amiro-can`）负责与 SocketCAN 或环回总线之间的转换。
///
/// # 转换示例
///
/// ```rust
/// use amiro_protocol::AmiroFrame;
///
/// let frame = AmiroFrame::new_standard(0x123, &[1, 2, 3, 4]);
/// assert_eq!(frame.id(), 0x123);
/// assert_eq!(frame.data_slice(), &[1, 2, 3, 4]);
///
/// let frame_ext = AmiroFrame::new_extended(0x12345678, &[5, 6, 7, 8]);
/// assert!(frame_ext.is_extended);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AmiroFrame {
    /// CAN ID（标准帧或扩展帧）
    pub id: u32,

    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],

    /// 有效数据长度 (0-8)
    pub len: u8,

    /// 是否为扩展帧（29-bit ID）
    pub is_extended: bool,

    /// 接收时间戳（微秒），0 表示不可用
    pub timestamp_us: u64,
}

impl AmiroFrame {
    /// 创建标准帧
    pub fn new_standard(id: u16, data: &[u8]) -> Self {
        Self::new(id as u32, data, false)
    }

    /// 创建扩展帧
    pub fn new_extended(id: u32, data: &[u8]) -> Self {
        Self::new(id, data, true)
    }

    /// 通用构造器
    fn new(id: u32, data: &[u8], is_extended: bool) -> Self {
        let mut fixed_data = [0u8; 8];
        let len = data.len().min(8);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id,
            data: fixed_data,
            len: len as u8,
            is_extended,
            timestamp_us: 0,
        }
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 获取 CAN ID
    pub fn id(&self) -> u32 {
        self.id
    }

    /// 获取完整数据（8字节固定数组）
    pub fn data(&self) -> &[u8; 8] {
        &self.data
    }
}

use thiserror::Error;

/// 协议编解码错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// 类别位不对应任何已知类别（或帧格式与布局不符）。
    /// 接收端将其视为前向兼容的未知流量，只计数不报错。
    #[error("Unknown category in CAN ID 0x{id:X}")]
    UnknownCategory { id: u32 },

    #[error("Invalid frame length for {category:?}: expected {expected}, got {actual}")]
    InvalidLength {
        category: Category,
        expected: Dlc,
        actual: usize,
    },

    #[error("Invalid shutdown magic: 0x{actual:04X}")]
    InvalidMagic { actual: u16 },

    #[error("Index {index} out of range for {category:?} (max {max})")]
    IndexOutOfRange {
        category: Category,
        index: u8,
        max: u8,
    },

    #[error("Board id {board} does not fit the identifier layout")]
    InvalidBoardId { board: u8 },

    #[error("{category:?} must be addressed to the broadcast id, got board {board}")]
    InvalidAddress { category: Category, board: u8 },

    #[error("Value out of range for field {field}: {value}")]
    OutOfRange { field: &'static str, value: i64 },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: &'static str, value: u8 },

    #[error("Invalid identifier layout: {0}")]
    InvalidLayout(String),
}

/// 字节序转换工具函数
///
/// 协议使用大端字节序（高位在前）。
///
/// 大端字节序转 i32
pub fn bytes_to_i32_be(bytes: [u8; 4]) -> i32 {
    i32::from_be_bytes(bytes)
}

/// 大端字节序转 i16
pub fn bytes_to_i16_be(bytes: [u8; 2]) -> i16 {
    i16::from_be_bytes(bytes)
}

/// 大端字节序转 u16
pub fn bytes_to_u16_be(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

/// 3 字节大端有符号整数（24 位补码）转 i32
pub fn bytes_to_i24_be(bytes: [u8; 3]) -> i32 {
    // 放到高 24 位再算术右移，完成符号扩展
    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], 0]) >> 8
}

/// i32 转大端字节序
pub fn i32_to_bytes_be(value: i32) -> [u8; 4] {
    value.to_be_bytes()
}

/// i16 转大端字节序
pub fn i16_to_bytes_be(value: i16) -> [u8; 2] {
    value.to_be_bytes()
}

/// u16 转大端字节序
pub fn u16_to_bytes_be(value: u16) -> [u8; 2] {
    value.to_be_bytes()
}

/// i32 的低 24 位转 3 字节大端（调用方保证值在 24 位有符号范围内）
pub fn i24_to_bytes_be(value: i32) -> [u8; 3] {
    let bytes = value.to_be_bytes();
    [bytes[1], bytes[2], bytes[3]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_i32_be() {
        let bytes = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(bytes_to_i32_be(bytes), 0x12345678);
    }

    #[test]
    fn test_bytes_to_i32_be_negative() {
        assert_eq!(bytes_to_i32_be([0xFF, 0xFF, 0xFF, 0xFF]), -1);
    }

    #[test]
    fn test_bytes_to_i16_be_negative() {
        assert_eq!(bytes_to_i16_be([0xFF, 0xFE]), -2);
    }

    #[test]
    fn test_i24_sign_extension() {
        assert_eq!(bytes_to_i24_be([0xFF, 0xFF, 0xFE]), -2);
        assert_eq!(bytes_to_i24_be([0x80, 0x00, 0x00]), -(1 << 23));
        assert_eq!(bytes_to_i24_be([0x7F, 0xFF, 0xFF]), (1 << 23) - 1);
    }

    #[test]
    fn test_i24_to_bytes_be() {
        assert_eq!(i24_to_bytes_be(1), [0x00, 0x00, 0x01]);
        assert_eq!(i24_to_bytes_be(-2), [0xFF, 0xFF, 0xFE]);
    }

    #[test]
    fn test_roundtrip_i24() {
        for value in [0, 1, -1, 0x12_3456, -0x12_3456, (1 << 23) - 1, -(1 << 23)] {
            assert_eq!(bytes_to_i24_be(i24_to_bytes_be(value)), value);
        }
    }

    #[test]
    fn test_frame_truncates_to_eight_bytes() {
        let frame = AmiroFrame::new_standard(0x7FF, &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(frame.len, 8);
        assert_eq!(frame.data_slice(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(!frame.is_extended);
    }
}
