//! 总线监视
//!
//! 不启动节点，直接从适配器读帧，逐帧输出原始数据和解码结果。

use std::fmt;
use std::io::Write;
use std::time::Duration;

use amiro_can::{AmiroFrame, CanAdapter, CanError};
use amiro_driver::ShutdownSupervisor;
use amiro_protocol::FrameCodec;
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tracing::warn;

use crate::connection::{GlobalArgs, install_ctrlc};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// 收到这么多帧后退出（0 表示一直运行）
    #[arg(short = 'n', long, default_value_t = 0)]
    pub count: u64,

    /// 每帧输出一行 JSON
    #[arg(long)]
    pub json: bool,
}

impl MonitorCommand {
    pub fn execute(&self, global: &GlobalArgs) -> Result<()> {
        let config = global.node_config()?;
        let codec = FrameCodec::new(config.layout.to_layout()?);
        let supervisor = ShutdownSupervisor::new();
        install_ctrlc(supervisor.signal())?;

        let mut adapter = open_adapter(&global.iface)?;
        let stdout = std::io::stdout();
        let seen = monitor_frames(
            &mut adapter,
            &codec,
            self.count,
            self.json,
            &supervisor,
            &mut stdout.lock(),
        )?;
        eprintln!("{} frames", seen);
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn open_adapter(iface: &str) -> Result<amiro_can::SocketCanAdapter> {
    Ok(amiro_can::SocketCanAdapter::new(iface)?)
}

#[cfg(not(target_os = "linux"))]
fn open_adapter(iface: &str) -> Result<amiro_can::LoopbackAdapter> {
    anyhow::bail!("CAN interface {} unavailable: SocketCAN requires Linux", iface)
}

/// 读帧并写出，直到收满 `count` 帧（0 = 不限）或收到停止请求
pub fn monitor_frames(
    adapter: &mut impl CanAdapter,
    codec: &FrameCodec,
    count: u64,
    json: bool,
    stop: &ShutdownSupervisor,
    out: &mut impl Write,
) -> Result<u64> {
    let mut seen = 0;
    while !stop.is_requested() && (count == 0 || seen < count) {
        let frame = match adapter.receive_timeout(POLL_INTERVAL) {
            Ok(frame) => frame,
            Err(CanError::Timeout) => continue,
            Err(CanError::BusOff) => {
                warn!("Monitor: bus off, restarting controller");
                adapter.restart()?;
                continue;
            },
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!("Monitor: receive error: {}", e);
                continue;
            },
        };

        let record = FrameRecord::new(codec, &frame);
        if json {
            serde_json::to_writer(&mut *out, &record)?;
            writeln!(out)?;
        } else {
            writeln!(out, "{}", record)?;
        }
        seen += 1;
    }
    out.flush()?;
    Ok(seen)
}

/// 一帧的输出记录
#[derive(Debug, Serialize)]
pub struct FrameRecord {
    pub timestamp_us: u64,
    pub id: String,
    pub extended: bool,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FrameRecord {
    pub fn new(codec: &FrameCodec, frame: &AmiroFrame) -> Self {
        let (board, message, error) = match codec.decode(frame) {
            Ok(envelope) => (
                Some(envelope.board.raw()),
                Some(format!("{:?}", envelope.message)),
                None,
            ),
            Err(e) => (None, None, Some(e.to_string())),
        };
        Self {
            timestamp_us: frame.timestamp_us,
            id: format!("0x{:03X}", frame.id),
            extended: frame.is_extended,
            data: hex::encode(frame.data_slice()),
            board,
            message,
            error,
        }
    }
}

impl fmt::Display for FrameRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>12} {:>10} {:<16}",
            self.timestamp_us, self.id, self.data
        )?;
        match (&self.board, &self.message, &self.error) {
            (Some(board), Some(message), _) => write!(f, "  board {} {}", board, message),
            (_, _, Some(error)) => write!(f, "  !! {}", error),
            _ => Ok(()),
        }
    }
}
