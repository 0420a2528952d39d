//! 载荷中的物理量类型
//!
//! 单位约定：
//! - 速度：µm/s（线速度）、µrad/s（角速度）
//! - 位置：µm；朝向：µrad，合法范围 [0, 2π×10⁶]
//! - 功耗：mW

use bilge::prelude::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::ProtocolError;
use crate::constants::SHELL_CHUNK_MAX;

/// RGB 颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// 从 0xRRGGBB 构造（高 8 位忽略）
    pub const fn from_u32(value: u32) -> Self {
        Self {
            r: (value >> 16) as u8,
            g: (value >> 8) as u8,
            b: value as u8,
        }
    }

    pub const fn to_u32(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }
}

/// 运动学速度（差速底盘：x 方向线速度 + z 轴角速度）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KinematicVelocity {
    /// 线速度（µm/s）
    pub v_um_s: i32,
    /// 角速度（µrad/s）
    pub w_urad_s: i32,
}

impl KinematicVelocity {
    pub const fn new(v_um_s: i32, w_urad_s: i32) -> Self {
        Self { v_um_s, w_urad_s }
    }
}

/// 平面位姿
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub x_um: i32,
    pub y_um: i32,
    /// 朝向（µrad），合法范围 [0, MAX_ORIENTATION_URAD]
    pub f_z_urad: i32,
}

impl Position {
    pub const fn new(x_um: i32, y_um: i32, f_z_urad: i32) -> Self {
        Self { x_um, y_um, f_z_urad }
    }
}

/// 目标位置 + 截止时间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetPosition {
    pub position: Position,
    /// 到达截止时间（ms，相对当前时刻）
    pub deadline_ms: u16,
}

/// 充电状态位域（PowerStatus Byte 0）
///
/// - Bit 0: 充电器已连接
/// - Bit 1: 电池 A 充电中
/// - Bit 2: 电池 B 充电中
/// - Bit 3-7: 保留
#[bitsize(8)]
#[derive(FromBits, DebugBits, PartialEq, Eq, Clone, Copy, Default)]
pub struct ChargingFlags {
    pub charger_connected: bool,
    pub battery_a_charging: bool,
    pub battery_b_charging: bool,
    pub reserved: u5,
}

impl ChargingFlags {
    pub fn from_byte(byte: u8) -> Self {
        Self::from(u8::new(byte))
    }

    pub fn to_byte(self) -> u8 {
        u8::from(self).value()
    }

    pub fn is_charging(&self) -> bool {
        self.battery_a_charging() || self.battery_b_charging()
    }
}

/// 电源状态报告
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerStatus {
    pub flags: ChargingFlags,
    /// 电量（%）
    pub state_of_charge: u8,
    /// 预计剩余时间（min）
    pub minutes_remaining: u16,
    /// 当前功耗（mW）
    pub power_consumption_mw: u16,
}

/// 三轴读数（磁力计 / 陀螺仪原始值）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Axes3 {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl Axes3 {
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }
}

/// 运动学修正常数（轮距误差 Ed、轮径误差 Eb）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KinematicConstants {
    pub ed: f32,
    pub eb: f32,
}

/// 接近传感器校准组（帧索引字段）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CalibrationGroup {
    Ring = 0,
    Floor = 1,
}

/// 校准结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CalibrationStatus {
    Ok = 0,
    Failed = 1,
}

/// 一帧 shell 数据（1..=8 字节）
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ShellChunk {
    bytes: [u8; SHELL_CHUNK_MAX],
    len: u8,
}

impl ShellChunk {
    pub fn new(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.is_empty() || bytes.len() > SHELL_CHUNK_MAX {
            return Err(ProtocolError::OutOfRange {
                field: "shell_chunk_len",
                value: bytes.len() as i64,
            });
        }
        let mut buf = [0u8; SHELL_CHUNK_MAX];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            bytes: buf,
            len: bytes.len() as u8,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 把任意长度的字节流按顺序切成帧大小的块
    pub fn split(bytes: &[u8]) -> impl Iterator<Item = ShellChunk> + '_ {
        bytes.chunks(SHELL_CHUNK_MAX).map(|chunk| {
            let mut buf = [0u8; SHELL_CHUNK_MAX];
            buf[..chunk.len()].copy_from_slice(chunk);
            ShellChunk {
                bytes: buf,
                len: chunk.len() as u8,
            }
        })
    }
}

impl std::fmt::Debug for ShellChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ShellChunk({:?})", String::from_utf8_lossy(self.as_bytes()))
    }
}
