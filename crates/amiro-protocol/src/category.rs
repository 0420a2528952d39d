//! 帧类别定义
//!
//! 每个类别固定三件事：寻址方式（ID 中的板卡字段含义）、合法 DLC、索引上限。

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

use crate::constants::{NUM_FLOOR_SENSORS, NUM_LEDS, NUM_RING_SENSORS};

/// 帧类别（ID 中的类别字段）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Category {
    ShellQuery = 0x01,
    ShellReply = 0x02,
    ShellSwitch = 0x03,
    LightColor = 0x04,
    LightBrightness = 0x05,
    Shutdown = 0x06,
    RobotId = 0x07,
    ProximityRing = 0x08,
    ProximityFloor = 0x09,
    ActualSpeed = 0x0A,
    TargetSpeed = 0x0B,
    Odometry = 0x0C,
    SetOdometry = 0x0D,
    PowerStatus = 0x0E,
    Magnetometer = 0x0F,
    Gyroscope = 0x10,
    TargetPosition = 0x11,
    KinematicConstants = 0x12,
    Calibrate = 0x13,
    CalibrationDone = 0x14,
}

/// ID 中板卡字段的含义
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// 板卡字段 = 发布者（传感器/状态报告）
    Sender,
    /// 板卡字段 = 接收者（命令）
    Target,
    /// 板卡字段恒为 0（全体广播）
    Broadcast,
}

/// 合法的数据长度码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dlc {
    Exact(u8),
    Range { min: u8, max: u8 },
}

impl Dlc {
    pub fn accepts(&self, len: u8) -> bool {
        match *self {
            Dlc::Exact(n) => len == n,
            Dlc::Range { min, max } => (min..=max).contains(&len),
        }
    }
}

impl fmt::Display for Dlc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dlc::Exact(n) => write!(f, "{}", n),
            Dlc::Range { min, max } => write!(f, "{}..={}", min, max),
        }
    }
}

impl Category {
    pub const ALL: [Category; 20] = [
        Category::ShellQuery,
        Category::ShellReply,
        Category::ShellSwitch,
        Category::LightColor,
        Category::LightBrightness,
        Category::Shutdown,
        Category::RobotId,
        Category::ProximityRing,
        Category::ProximityFloor,
        Category::ActualSpeed,
        Category::TargetSpeed,
        Category::Odometry,
        Category::SetOdometry,
        Category::PowerStatus,
        Category::Magnetometer,
        Category::Gyroscope,
        Category::TargetPosition,
        Category::KinematicConstants,
        Category::Calibrate,
        Category::CalibrationDone,
    ];

    /// 类别编码
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn addressing(self) -> Addressing {
        use Category::*;
        match self {
            Shutdown | RobotId => Addressing::Broadcast,
            ProximityRing | ProximityFloor | ActualSpeed | Odometry | PowerStatus | Magnetometer
            | Gyroscope => Addressing::Sender,
            ShellQuery | ShellReply | ShellSwitch | LightColor | LightBrightness | TargetSpeed
            | SetOdometry | TargetPosition | KinematicConstants | Calibrate | CalibrationDone => {
                Addressing::Target
            },
        }
    }

    pub const fn dlc(self) -> Dlc {
        use Category::*;
        match self {
            ShellQuery | ShellReply => Dlc::Range { min: 1, max: 8 },
            ShellSwitch | LightBrightness | RobotId | Calibrate | CalibrationDone => Dlc::Exact(1),
            Shutdown | ProximityRing | ProximityFloor => Dlc::Exact(2),
            LightColor => Dlc::Exact(3),
            PowerStatus | Magnetometer | Gyroscope => Dlc::Exact(6),
            ActualSpeed | TargetSpeed | Odometry | SetOdometry | TargetPosition
            | KinematicConstants => Dlc::Exact(8),
        }
    }

    /// 索引字段上限（含）
    ///
    /// shell 类别的索引字段承载源板卡 ID，由布局的索引位宽限制，这里返回 u8::MAX。
    pub const fn max_index(self) -> u8 {
        use Category::*;
        match self {
            ShellQuery | ShellReply => u8::MAX,
            LightColor => (NUM_LEDS - 1) as u8,
            ProximityRing => (NUM_RING_SENSORS - 1) as u8,
            ProximityFloor => (NUM_FLOOR_SENSORS - 1) as u8,
            // 0 = 环形, 1 = 地面
            Calibrate | CalibrationDone => 1,
            _ => 0,
        }
    }

    /// 是否为命令类别（需要调用副作用处理器而不是更新缓存）
    pub const fn is_command(self) -> bool {
        !matches!(self.addressing(), Addressing::Sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_roundtrip_through_try_from() {
        for category in Category::ALL {
            assert_eq!(Category::try_from(category.code()).ok(), Some(category));
        }
    }

    #[test]
    fn test_unknown_code_is_rejected() {
        assert!(Category::try_from(0x00).is_err());
        assert!(Category::try_from(0x15).is_err());
        assert!(Category::try_from(0x1F).is_err());
    }

    #[test]
    fn test_codes_are_unique_and_fit_five_bits() {
        let mut seen = [false; 32];
        for category in Category::ALL {
            let code = category.code() as usize;
            assert!(code < 32, "{:?} does not fit 5 bits", category);
            assert!(!seen[code], "duplicate code for {:?}", category);
            seen[code] = true;
        }
    }

    #[test]
    fn test_dlc_rules() {
        assert!(Category::ShellQuery.dlc().accepts(1));
        assert!(Category::ShellQuery.dlc().accepts(8));
        assert!(!Category::ShellQuery.dlc().accepts(0));
        assert!(Category::Shutdown.dlc().accepts(2));
        assert!(!Category::Shutdown.dlc().accepts(3));
        assert_eq!(Category::Odometry.dlc(), Dlc::Exact(8));
        assert_eq!(Dlc::Range { min: 1, max: 8 }.to_string(), "1..=8");
    }

    #[test]
    fn test_addressing() {
        assert_eq!(Category::Shutdown.addressing(), Addressing::Broadcast);
        assert_eq!(Category::ActualSpeed.addressing(), Addressing::Sender);
        assert_eq!(Category::TargetSpeed.addressing(), Addressing::Target);
        assert!(Category::ShellSwitch.is_command());
        assert!(!Category::PowerStatus.is_command());
    }
}
