//! 全局参数与节点连接

use std::path::PathBuf;

use amiro_driver::{AmiroNode, NodeBuilder, NodeConfig, ShutdownSignal};
use amiro_protocol::BoardId;
use anyhow::{Context, Result};
use clap::Args;
use tracing::{debug, info};

/// 没有配置文件时 CLI 使用的板卡 ID（不与三块固定板冲突）
pub const CLI_BOARD_ID: u8 = 7;

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// 节点配置文件（TOML）
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// CAN 接口
    #[arg(short, long, global = true, default_value = "can0")]
    pub iface: String,

    /// 本节点的板卡 ID（覆盖配置）
    #[arg(short, long, global = true)]
    pub board: Option<u8>,
}

impl GlobalArgs {
    pub fn node_config(&self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => NodeConfig::for_board(BoardId(CLI_BOARD_ID)),
        };
        if let Some(board) = self.board {
            config.board_id = board;
        }
        config.validate()?;
        debug!("Using node config: {:?}", config);
        Ok(config)
    }

    /// 按全局参数启动节点
    pub fn start(&self, builder: NodeBuilder) -> Result<AmiroNode> {
        let config = self.node_config()?;
        let node = start_on_iface(builder.config(config), &self.iface)?;
        info!("Connected to {} as {}", self.iface, node.board());
        Ok(node)
    }
}

#[cfg(target_os = "linux")]
fn start_on_iface(builder: NodeBuilder, iface: &str) -> Result<AmiroNode> {
    builder
        .start_socketcan(iface)
        .with_context(|| format!("failed to open CAN interface {}", iface))
}

#[cfg(not(target_os = "linux"))]
fn start_on_iface(_builder: NodeBuilder, iface: &str) -> Result<AmiroNode> {
    anyhow::bail!("CAN interface {} unavailable: SocketCAN requires Linux", iface)
}

/// Ctrl-C 请求关机（与总线上的关机广播走同一个信号）
pub fn install_ctrlc(signal: ShutdownSignal) -> Result<()> {
    ctrlc::set_handler(move || signal.request()).context("failed to install Ctrl-C handler")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(config: Option<PathBuf>, board: Option<u8>) -> GlobalArgs {
        GlobalArgs {
            config,
            iface: "can0".to_string(),
            board,
        }
    }

    #[test]
    fn test_default_board_id() {
        let config = args(None, None).node_config().unwrap();
        assert_eq!(config.board(), BoardId(CLI_BOARD_ID));
    }

    #[test]
    fn test_board_override_and_validation() {
        assert_eq!(args(None, Some(5)).node_config().unwrap().board(), BoardId(5));
        assert!(args(None, Some(0)).node_config().is_err());
    }

    #[test]
    fn test_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "board_id = 6\naccept_from = [1]\n").unwrap();

        let config = args(Some(path), None).node_config().unwrap();
        assert_eq!(config.board(), BoardId(6));
        assert_eq!(config.accept_from, vec![1]);

        assert!(args(Some(dir.path().join("missing.toml")), None).node_config().is_err());
    }
}
