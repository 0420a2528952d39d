//! 节点配置
//!
//! 从 TOML 加载，所有字段都有默认值：
//!
//! ```toml
//! board_id = 1
//! robot_id = 7
//! accept_from = [2, 3]
//!
//! [timing]
//! receive_timeout_ms = 10
//! periodic_interval_ms = 100
//!
//! [layout]
//! category_bits = 5
//! board_bits = 3
//! index_bits = 3
//! extended = false
//! ```

use std::path::Path;
use std::time::Duration;

use amiro_protocol::{BoardId, IdLayout};
use serde::{Deserialize, Serialize};

use crate::error::DriverError;
use crate::pipeline::PipelineConfig;

/// 节点配置（每块板一份）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// 本板 ID（不能为 0，0 是广播地址）
    pub board_id: u8,
    /// 机器人编号（只有 PowerManagement 广播）
    pub robot_id: Option<u8>,
    /// 缓存这些板的传感器报告；为空表示接受所有板
    pub accept_from: Vec<u8>,
    /// 远程 shell 邮箱容量（数据块数）
    pub shell_mailbox_capacity: usize,
    pub timing: TimingConfig,
    pub layout: LayoutConfig,
    pub topology: TopologyConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            board_id: BoardId::DI_WHEEL_DRIVE.raw(),
            robot_id: None,
            accept_from: Vec::new(),
            shell_mailbox_capacity: 256,
            timing: TimingConfig::default(),
            layout: LayoutConfig::default(),
            topology: TopologyConfig::default(),
        }
    }
}

/// 时间参数（毫秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    /// RX 单次阻塞上限，也是停止时的响应延迟上限
    pub receive_timeout_ms: u64,
    /// 单帧发送超时
    pub send_timeout_ms: u64,
    /// 周期广播间隔
    pub periodic_interval_ms: u64,
    /// 停止节点时等待线程退出的上限
    pub join_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: 10,
            send_timeout_ms: 5,
            periodic_interval_ms: 100,
            join_timeout_ms: 2000,
        }
    }
}

/// CAN ID 分区位宽，所有板卡必须一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    pub category_bits: u8,
    pub board_bits: u8,
    pub index_bits: u8,
    pub extended: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let layout = IdLayout::STANDARD;
        Self {
            category_bits: layout.category_bits(),
            board_bits: layout.board_bits(),
            index_bits: layout.index_bits(),
            extended: layout.is_extended(),
        }
    }
}

impl LayoutConfig {
    pub fn to_layout(&self) -> Result<IdLayout, DriverError> {
        IdLayout::new(
            self.category_bits,
            self.board_bits,
            self.index_bits,
            self.extended,
        )
        .map_err(|e| DriverError::Config(e.to_string()))
    }
}

/// 各功能板的 ID（决定命令和校准请求发往哪块板）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopologyConfig {
    pub di_wheel_drive: u8,
    pub power_management: u8,
    pub light_ring: u8,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            di_wheel_drive: BoardId::DI_WHEEL_DRIVE.raw(),
            power_management: BoardId::POWER_MANAGEMENT.raw(),
            light_ring: BoardId::LIGHT_RING.raw(),
        }
    }
}

impl TopologyConfig {
    pub fn di_wheel_drive(&self) -> BoardId {
        BoardId(self.di_wheel_drive)
    }

    pub fn power_management(&self) -> BoardId {
        BoardId(self.power_management)
    }

    pub fn light_ring(&self) -> BoardId {
        BoardId(self.light_ring)
    }
}

impl NodeConfig {
    /// 指定板卡 ID，其余取默认值
    pub fn for_board(board: BoardId) -> Self {
        Self {
            board_id: board.raw(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, DriverError> {
        let config: NodeConfig =
            toml::from_str(content).map_err(|e| DriverError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DriverError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, DriverError> {
        toml::to_string(self).map_err(|e| DriverError::Config(e.to_string()))
    }

    /// 检查配置的一致性
    ///
    /// - 布局能放进帧 ID，且索引字段能容纳所有板卡 ID（shell 帧）
    /// - 所有板卡 ID 非零且能放进板卡字段
    /// - 时间参数非零
    pub fn validate(&self) -> Result<(), DriverError> {
        let layout = self.layout.to_layout()?;
        let max_board = layout.max_board();

        let mut boards = vec![
            ("board_id", self.board_id),
            ("topology.di_wheel_drive", self.topology.di_wheel_drive),
            ("topology.power_management", self.topology.power_management),
            ("topology.light_ring", self.topology.light_ring),
        ];
        boards.extend(self.accept_from.iter().map(|&id| ("accept_from", id)));
        for (field, id) in boards {
            if id == 0 || id > max_board {
                return Err(DriverError::Config(format!(
                    "{} = {} is outside 1..={}",
                    field, id, max_board
                )));
            }
        }

        let timing = &self.timing;
        for (field, value) in [
            ("timing.receive_timeout_ms", timing.receive_timeout_ms),
            ("timing.periodic_interval_ms", timing.periodic_interval_ms),
            ("timing.join_timeout_ms", timing.join_timeout_ms),
        ] {
            if value == 0 {
                return Err(DriverError::Config(format!("{} must be non-zero", field)));
            }
        }

        if self.shell_mailbox_capacity == 0 {
            return Err(DriverError::Config(
                "shell_mailbox_capacity must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn board(&self) -> BoardId {
        BoardId(self.board_id)
    }

    /// 是否缓存该板的传感器报告
    pub fn accepts_reports_from(&self, board: BoardId) -> bool {
        self.accept_from.is_empty() || self.accept_from.contains(&board.raw())
    }

    /// 线程运行参数
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            receive_timeout: Duration::from_millis(self.timing.receive_timeout_ms),
            send_timeout: Duration::from_millis(self.timing.send_timeout_ms),
            periodic_interval: Duration::from_millis(self.timing.periodic_interval_ms),
            join_timeout: Duration::from_millis(self.timing.join_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = NodeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.layout.to_layout().unwrap(), IdLayout::STANDARD);
        assert_eq!(config.topology.power_management(), BoardId::POWER_MANAGEMENT);
        assert_eq!(config.pipeline().receive_timeout, Duration::from_millis(10));
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = NodeConfig::from_toml_str(
            r#"
            board_id = 2
            robot_id = 7
            accept_from = [1]

            [timing]
            periodic_interval_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.board(), BoardId::POWER_MANAGEMENT);
        assert_eq!(config.robot_id, Some(7));
        assert_eq!(config.timing.periodic_interval_ms, 50);
        assert_eq!(config.timing.receive_timeout_ms, 10);
        assert!(config.accepts_reports_from(BoardId(1)));
        assert!(!config.accepts_reports_from(BoardId(3)));
    }

    #[test]
    fn test_empty_accept_list_accepts_everyone() {
        let config = NodeConfig::default();
        assert!(config.accepts_reports_from(BoardId(5)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = NodeConfig::from_toml_str("board = 1");
        assert!(matches!(result, Err(DriverError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_broadcast_board_id() {
        let config = NodeConfig::for_board(BoardId::BROADCAST);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("board_id"), "{}", err);
    }

    #[test]
    fn test_validate_rejects_board_outside_layout() {
        // 默认 3 位板卡字段，最大 7
        let config = NodeConfig::for_board(BoardId(8));
        assert!(config.validate().is_err());

        let mut config = NodeConfig::for_board(BoardId(1));
        config.accept_from = vec![9];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_layout() {
        let mut config = NodeConfig::default();
        config.layout.index_bits = 4;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("11-bit"), "{}", err);

        config.layout.extended = true;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_index_narrower_than_board() {
        let mut config = NodeConfig::for_board(BoardId(20));
        config.layout = LayoutConfig {
            category_bits: 8,
            board_bits: 8,
            index_bits: 3,
            extended: true,
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("board field"), "{}", err);

        config.layout.index_bits = 8;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_category_wider_than_a_byte() {
        let mut config = NodeConfig::default();
        config.layout = LayoutConfig {
            category_bits: 9,
            board_bits: 8,
            index_bits: 8,
            extended: true,
        };
        assert!(matches!(config.validate(), Err(DriverError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let mut config = NodeConfig::default();
        config.timing.periodic_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.shell_mailbox_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = NodeConfig::for_board(BoardId::LIGHT_RING);
        config.robot_id = Some(3);
        config.accept_from = vec![1, 2];
        let text = config.to_toml_string().unwrap();
        assert_eq!(NodeConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "board_id = 3\n").unwrap();
        assert_eq!(NodeConfig::load(&path).unwrap().board(), BoardId::LIGHT_RING);

        let missing = NodeConfig::load(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(DriverError::Config(_))));
    }
}
