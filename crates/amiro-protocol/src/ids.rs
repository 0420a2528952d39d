//! 板卡 ID 与 CAN ID 分区布局
//!
//! CAN ID 从低位开始依次打包：
//!
//! ```text
//! [ reserved | category:N | board:M | index:K ]
//! ```
//!
//! 默认布局为 5/3/3，正好占满 11 位标准帧 ID。

use std::fmt;

use crate::ProtocolError;
use crate::constants::{EXTENDED_ID_BITS, STANDARD_ID_BITS};

/// 板卡 ID（出厂/配置时分配，不做自动发现）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(transparent))]
pub struct BoardId(pub u8);

impl BoardId {
    /// 广播地址
    pub const BROADCAST: BoardId = BoardId(0);
    pub const DI_WHEEL_DRIVE: BoardId = BoardId(1);
    pub const POWER_MANAGEMENT: BoardId = BoardId(2);
    pub const LIGHT_RING: BoardId = BoardId(3);

    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn is_broadcast(self) -> bool {
        self.0 == 0
    }
}

impl From<u8> for BoardId {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            BoardId::BROADCAST => write!(f, "broadcast"),
            BoardId::DI_WHEEL_DRIVE => write!(f, "DiWheelDrive(1)"),
            BoardId::POWER_MANAGEMENT => write!(f, "PowerManagement(2)"),
            BoardId::LIGHT_RING => write!(f, "LightRing(3)"),
            BoardId(other) => write!(f, "board({})", other),
        }
    }
}

/// 拆分后的 CAN ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameId {
    pub category_code: u8,
    pub board: BoardId,
    pub index: u8,
}

/// CAN ID 分区布局
///
/// 位宽是板级配置常量，所有板卡必须一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdLayout {
    category_bits: u8,
    board_bits: u8,
    index_bits: u8,
    extended: bool,
}

impl Default for IdLayout {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl IdLayout {
    /// 11 位标准帧：类别 5 位，板卡 3 位，索引 3 位
    pub const STANDARD: IdLayout = IdLayout {
        category_bits: 5,
        board_bits: 3,
        index_bits: 3,
        extended: false,
    };

    /// 29 位扩展帧：各 8 位，高 5 位保留
    pub const EXTENDED: IdLayout = IdLayout {
        category_bits: 8,
        board_bits: 8,
        index_bits: 8,
        extended: true,
    };

    /// 创建自定义布局
    ///
    /// 约束：
    /// - 类别 5..=8 位（容纳全部类别编码，且拆分时不截断）
    /// - 板卡 1..=8 位，索引 3..=8 位（8 个 LED / 环形传感器）
    /// - 索引不窄于板卡字段：shell 帧在索引字段中携带源板卡 ID
    /// - 总位宽不超过帧 ID 宽度（11 或 29）
    pub fn new(
        category_bits: u8,
        board_bits: u8,
        index_bits: u8,
        extended: bool,
    ) -> Result<Self, ProtocolError> {
        if !(5..=8).contains(&category_bits) {
            return Err(ProtocolError::InvalidLayout(format!(
                "category field must be 5..=8 bits, got {}",
                category_bits
            )));
        }
        if !(1..=8).contains(&board_bits) {
            return Err(ProtocolError::InvalidLayout(format!(
                "board field must be 1..=8 bits, got {}",
                board_bits
            )));
        }
        if !(3..=8).contains(&index_bits) {
            return Err(ProtocolError::InvalidLayout(format!(
                "index field must be 3..=8 bits, got {}",
                index_bits
            )));
        }
        if index_bits < board_bits {
            return Err(ProtocolError::InvalidLayout(format!(
                "index field ({} bits) must be at least as wide as the board field ({} bits)",
                index_bits, board_bits
            )));
        }

        let limit = if extended {
            EXTENDED_ID_BITS
        } else {
            STANDARD_ID_BITS
        };
        let total = category_bits as u32 + board_bits as u32 + index_bits as u32;
        if total > limit {
            return Err(ProtocolError::InvalidLayout(format!(
                "{} bits do not fit a {}-bit identifier",
                total, limit
            )));
        }

        Ok(Self {
            category_bits,
            board_bits,
            index_bits,
            extended,
        })
    }

    pub fn category_bits(&self) -> u8 {
        self.category_bits
    }

    pub fn board_bits(&self) -> u8 {
        self.board_bits
    }

    pub fn index_bits(&self) -> u8 {
        self.index_bits
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn total_bits(&self) -> u32 {
        self.category_bits as u32 + self.board_bits as u32 + self.index_bits as u32
    }

    /// 可寻址的板卡数量（含广播地址 0）
    pub fn board_count(&self) -> usize {
        1usize << self.board_bits
    }

    pub fn max_index(&self) -> u8 {
        mask(self.index_bits) as u8
    }

    pub fn max_board(&self) -> u8 {
        mask(self.board_bits) as u8
    }

    /// 组合 CAN ID
    pub fn compose(&self, category_code: u8, board: BoardId, index: u8) -> Result<u32, ProtocolError> {
        if board.raw() as u32 > mask(self.board_bits) {
            return Err(ProtocolError::InvalidBoardId { board: board.raw() });
        }
        if category_code as u32 > mask(self.category_bits) {
            return Err(ProtocolError::InvalidLayout(format!(
                "category code 0x{:02X} does not fit {} bits",
                category_code, self.category_bits
            )));
        }
        if index as u32 > mask(self.index_bits) {
            return Err(ProtocolError::InvalidLayout(format!(
                "index {} does not fit {} bits",
                index, self.index_bits
            )));
        }

        let board_shift = self.index_bits as u32;
        let category_shift = board_shift + self.board_bits as u32;
        Ok(((category_code as u32) << category_shift)
            | ((board.raw() as u32) << board_shift)
            | index as u32)
    }

    /// 拆分 CAN ID；保留位非零时返回 `None`（不是本协议的帧）
    pub fn split(&self, id: u32) -> Option<FrameId> {
        if id >> self.total_bits() != 0 {
            return None;
        }

        let board_shift = self.index_bits as u32;
        let category_shift = board_shift + self.board_bits as u32;
        Some(FrameId {
            category_code: ((id >> category_shift) & mask(self.category_bits)) as u8,
            board: BoardId((id >> board_shift & mask(self.board_bits)) as u8),
            index: (id & mask(self.index_bits)) as u8,
        })
    }
}

fn mask(bits: u8) -> u32 {
    (1u32 << bits) - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Category;

    #[test]
    fn test_standard_layout_fills_eleven_bits() {
        assert_eq!(IdLayout::STANDARD.total_bits(), 11);
        assert_eq!(IdLayout::STANDARD.board_count(), 8);
        assert_eq!(IdLayout::STANDARD.max_index(), 7);
    }

    #[test]
    fn test_compose_bit_positions() {
        let layout = IdLayout::STANDARD;
        // category 0x0C (odometry), board 1, index 0 -> 0b01100_001_000
        let id = layout.compose(0x0C, BoardId::DI_WHEEL_DRIVE, 0).unwrap();
        assert_eq!(id, 0b01100_001_000);
        let id = layout.compose(0x04, BoardId::LIGHT_RING, 5).unwrap();
        assert_eq!(id, 0b00100_011_101);
    }

    #[test]
    fn test_layout_is_collision_free() {
        // 不同 (类别, 板卡, 索引) 组合必须得到不同的 ID
        for layout in [IdLayout::STANDARD, IdLayout::EXTENDED] {
            let mut seen = std::collections::HashSet::new();
            for category in Category::ALL {
                for board in 0..=layout.max_board().min(15) {
                    for index in 0..=layout.max_index().min(15) {
                        let id = layout.compose(category.code(), BoardId(board), index).unwrap();
                        assert!(seen.insert(id), "collision at 0x{:X}", id);
                        let split = layout.split(id).unwrap();
                        assert_eq!(split.category_code, category.code());
                        assert_eq!(split.board, BoardId(board));
                        assert_eq!(split.index, index);
                    }
                }
            }
        }
    }

    #[test]
    fn test_split_rejects_reserved_bits() {
        assert!(IdLayout::STANDARD.split(0x800).is_none());
        assert!(IdLayout::EXTENDED.split(1 << 24).is_none());
    }

    #[test]
    fn test_compose_rejects_wide_board() {
        let err = IdLayout::STANDARD.compose(0x01, BoardId(8), 0).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidBoardId { board: 8 });
    }

    #[test]
    fn test_new_validates_widths() {
        assert!(IdLayout::new(5, 3, 3, false).is_ok());
        assert!(IdLayout::new(6, 3, 3, false).is_err());
        assert!(IdLayout::new(4, 3, 3, true).is_err());
        assert!(IdLayout::new(5, 3, 2, false).is_err());
        assert!(IdLayout::new(8, 8, 8, true).is_ok());
    }

    #[test]
    fn test_new_rejects_category_wider_than_a_byte() {
        let err = IdLayout::new(9, 8, 8, true).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidLayout(ref m) if m.contains("5..=8")), "{err}");
        assert!(IdLayout::new(13, 8, 8, true).is_err());
    }

    #[test]
    fn test_new_rejects_index_narrower_than_board() {
        // 板卡 20 放不进 3 位索引，shell 帧无法携带源板卡
        let err = IdLayout::new(8, 8, 3, true).unwrap_err();
        assert!(
            matches!(err, ProtocolError::InvalidLayout(ref m) if m.contains("at least as wide")),
            "{err}"
        );
        assert!(IdLayout::new(5, 3, 4, true).is_ok());
    }

    #[test]
    fn test_board_display() {
        assert_eq!(BoardId::BROADCAST.to_string(), "broadcast");
        assert_eq!(BoardId(6).to_string(), "board(6)");
    }
}
