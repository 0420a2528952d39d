//! SocketCAN CAN 适配器实现
//!
//! 基于 Linux SocketCAN 子系统。波特率等配置由系统工具（`ip link`）完成，
//! 不在应用层设置。总线关闭后的重启通过 netlink 完成，需要 `CAP_NET_ADMIN`。

pub mod split;

pub use split::{SocketCanRxAdapter, SocketCanTxAdapter};

use std::time::Duration;

use socketcan::{
    CanError as SocketCanError, CanFrame, CanInterface, CanSocket, EmbeddedFrame, ExtendedId,
    Frame, Socket, SocketOptions, StandardId,
};
use tracing::{error, trace, warn};

use crate::{
    AmiroFrame, CanAdapter, CanDeviceError, CanDeviceErrorKind, CanError, SplittableAdapter,
};

/// SocketCAN 适配器
///
/// # 示例
///
/// ```no_run
/// use amiro_can::{AmiroFrame, CanAdapter, SocketCanAdapter};
///
/// let mut adapter = SocketCanAdapter::new("can0").unwrap();
/// adapter.send(AmiroFrame::new_standard(0x123, &[1, 2, 3, 4])).unwrap();
/// let rx_frame = adapter.receive().unwrap();
/// ```
#[derive(Debug)]
pub struct SocketCanAdapter {
    socket: CanSocket,
    /// 接口名称（如 "can0"）
    interface: String,
    /// 读超时时间（用于 receive 方法）
    read_timeout: Duration,
}

impl SocketCanAdapter {
    /// 打开 CAN 接口
    ///
    /// 保留内核默认的 `CAN_RAW_LOOPBACK`，同一主机上的其他 socket 能看到本板发送的帧；
    /// `CAN_RAW_RECV_OWN_MSGS` 默认关闭，本 socket 不会收到自己的帧。
    pub fn new(interface: impl Into<String>) -> Result<Self, CanError> {
        let interface = interface.into();

        let socket = CanSocket::open(&interface).map_err(|e| {
            CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::NotFound,
                format!("Failed to open CAN interface '{}': {}", interface, e),
            ))
        })?;

        // 接收错误帧，用于检测 bus-off
        if let Err(e) = socket.set_error_filter_accept_all() {
            warn!("Failed to enable error frames on '{}': {}", interface, e);
        }

        let read_timeout = Duration::from_millis(10);
        socket.set_read_timeout(read_timeout).map_err(CanError::Io)?;

        trace!("SocketCAN interface '{}' opened", interface);

        Ok(Self {
            socket,
            interface,
            read_timeout,
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), CanError> {
        self.socket.set_read_timeout(timeout).map_err(CanError::Io)?;
        self.read_timeout = timeout;
        Ok(())
    }
}

/// AmiroFrame -> socketcan::CanFrame
pub(crate) fn to_can_frame(frame: &AmiroFrame) -> Result<CanFrame, CanError> {
    let data = frame.data_slice();
    let can_frame = if frame.is_extended {
        ExtendedId::new(frame.id).and_then(|id| CanFrame::new(id, data))
    } else {
        StandardId::new(frame.id as u16).and_then(|id| CanFrame::new(id, data))
    };
    can_frame.ok_or_else(|| {
        CanError::Device(CanDeviceError::new(
            CanDeviceErrorKind::InvalidFrame,
            format!("Failed to create frame with ID 0x{:X}", frame.id),
        ))
    })
}

/// 读取一帧数据帧
///
/// - 错误帧：bus-off → `CanError::BusOff`，其他错误帧记录后跳过
/// - 远程帧：跳过
/// - 读超时 → `CanError::Timeout`
pub(crate) fn read_data_frame(socket: &CanSocket) -> Result<AmiroFrame, CanError> {
    loop {
        let can_frame = socket.read_frame().map_err(|e| match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => CanError::Timeout,
            _ => CanError::Io(e),
        })?;

        if let CanFrame::Error(error_frame) = can_frame {
            match SocketCanError::from(error_frame) {
                SocketCanError::BusOff => {
                    error!("CAN Bus Off error detected");
                    return Err(CanError::BusOff);
                },
                other => {
                    warn!("CAN Error Frame received: {}, ignoring", other);
                    continue;
                },
            }
        }

        if can_frame.is_remote_frame() {
            trace!("Ignoring remote frame 0x{:X}", can_frame.raw_id());
            continue;
        }

        let mut data = [0u8; 8];
        let payload = can_frame.data();
        let len = payload.len().min(8);
        data[..len].copy_from_slice(&payload[..len]);

        return Ok(AmiroFrame {
            id: can_frame.raw_id(),
            data,
            len: len as u8,
            is_extended: can_frame.is_extended(),
            timestamp_us: 0,
        });
    }
}

/// 通过 netlink 重启接口（bus-off 恢复）
pub(crate) fn restart_interface(interface: &str) -> Result<(), CanError> {
    let iface = CanInterface::open(interface).map_err(|e| {
        CanError::Device(CanDeviceError::new(
            CanDeviceErrorKind::NotFound,
            format!("Failed to open netlink interface '{}': {:?}", interface, e),
        ))
    })?;
    iface.restart().map_err(|e| {
        CanError::Device(CanDeviceError::new(
            CanDeviceErrorKind::Backend,
            format!("Failed to restart '{}': {:?}", interface, e),
        ))
    })?;
    warn!("SocketCAN interface '{}' restarted", interface);
    Ok(())
}

impl SplittableAdapter for SocketCanAdapter {
    type RxAdapter = SocketCanRxAdapter;
    type TxAdapter = SocketCanTxAdapter;

    /// 分离为独立的 RX 和 TX 适配器
    ///
    /// 两个半部通过 `dup()` 共享同一个打开文件描述，
    /// 因此只能用 `SO_RCVTIMEO` / `SO_SNDTIMEO` 控制超时，不能切换非阻塞模式。
    fn split(self) -> Result<(Self::RxAdapter, Self::TxAdapter), CanError> {
        let rx = SocketCanRxAdapter::new(&self.socket, &self.interface, self.read_timeout)?;
        let tx = SocketCanTxAdapter::new(&self.socket, &self.interface)?;
        trace!("SocketCanAdapter split into RX and TX adapters ({})", self.interface);
        Ok((rx, tx))
    }
}

impl CanAdapter for SocketCanAdapter {
    fn send(&mut self, frame: AmiroFrame) -> Result<(), CanError> {
        let can_frame = to_can_frame(&frame)?;
        self.socket.write_frame(&can_frame).map_err(CanError::Io)?;
        trace!("Sent CAN frame: ID=0x{:X}, len={}", frame.id, frame.len);
        Ok(())
    }

    fn receive(&mut self) -> Result<AmiroFrame, CanError> {
        let frame = read_data_frame(&self.socket)?;
        trace!("Received CAN frame: ID=0x{:X}, len={}", frame.id, frame.len);
        Ok(frame)
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        if let Err(e) = self.set_read_timeout(timeout) {
            warn!("Failed to set receive timeout: {}", e);
        }
    }

    fn receive_timeout(&mut self, timeout: Duration) -> Result<AmiroFrame, CanError> {
        let old_timeout = self.read_timeout;
        self.set_read_timeout(timeout)?;
        let result = self.receive();
        let _ = self.set_read_timeout(old_timeout);
        result
    }

    fn send_timeout(&mut self, frame: AmiroFrame, timeout: Duration) -> Result<(), CanError> {
        self.socket.set_write_timeout(timeout).map_err(CanError::Io)?;
        self.send(frame)
    }

    fn restart(&mut self) -> Result<(), CanError> {
        restart_interface(&self.interface)
    }
}
