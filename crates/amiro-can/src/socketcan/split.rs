//! SocketCAN 适配器分离实现
//!
//! RX 和 TX 各持有一份复制出的文件描述符（`dup()`），可以在不同线程中并发使用。

use std::os::fd::AsFd;
use std::time::Duration;

use socketcan::{CanSocket, Socket};
use tracing::{trace, warn};

use super::{read_data_frame, restart_interface, to_can_frame};
use crate::{AmiroFrame, CanError, RxAdapter, TxAdapter};

/// 复制底层文件描述符，得到共享同一打开文件描述的新 socket
fn clone_socket(socket: &CanSocket) -> std::io::Result<CanSocket> {
    socket.as_fd().try_clone_to_owned().map(CanSocket::from)
}

/// 只读适配器（用于接收线程）
pub struct SocketCanRxAdapter {
    socket: CanSocket,
    interface: String,
    read_timeout: Duration,
}

impl SocketCanRxAdapter {
    pub fn new(socket: &CanSocket, interface: &str, read_timeout: Duration) -> Result<Self, CanError> {
        let rx_socket = clone_socket(socket).map_err(|e| {
            CanError::Io(std::io::Error::other(format!(
                "Failed to clone SocketCAN socket for RX: {}",
                e
            )))
        })?;
        rx_socket.set_read_timeout(read_timeout).map_err(CanError::Io)?;

        Ok(Self {
            socket: rx_socket,
            interface: interface.to_string(),
            read_timeout,
        })
    }
}

impl RxAdapter for SocketCanRxAdapter {
    fn receive_timeout(&mut self, timeout: Duration) -> Result<AmiroFrame, CanError> {
        if timeout != self.read_timeout {
            // 零超时在 SO_RCVTIMEO 中表示无限阻塞，这里取 1µs
            let effective = timeout.max(Duration::from_micros(1));
            self.socket.set_read_timeout(effective).map_err(CanError::Io)?;
            self.read_timeout = timeout;
        }
        let frame = read_data_frame(&self.socket)?;
        trace!("RX: CAN frame ID=0x{:X}, len={}", frame.id, frame.len);
        Ok(frame)
    }

    fn restart(&mut self) -> Result<(), CanError> {
        restart_interface(&self.interface)
    }
}

/// 只写适配器（所有发送共享，外层加锁）
pub struct SocketCanTxAdapter {
    socket: CanSocket,
    interface: String,
    write_timeout: Option<Duration>,
}

impl SocketCanTxAdapter {
    pub fn new(socket: &CanSocket, interface: &str) -> Result<Self, CanError> {
        let tx_socket = clone_socket(socket).map_err(|e| {
            CanError::Io(std::io::Error::other(format!(
                "Failed to clone SocketCAN socket for TX: {}",
                e
            )))
        })?;

        Ok(Self {
            socket: tx_socket,
            interface: interface.to_string(),
            write_timeout: None,
        })
    }
}

impl TxAdapter for SocketCanTxAdapter {
    fn send_timeout(&mut self, frame: AmiroFrame, timeout: Duration) -> Result<(), CanError> {
        if self.write_timeout != Some(timeout) {
            let effective = timeout.max(Duration::from_micros(1));
            self.socket.set_write_timeout(effective).map_err(CanError::Io)?;
            self.write_timeout = Some(timeout);
        }

        let can_frame = to_can_frame(&frame)?;
        self.socket.write_frame(&can_frame).map_err(|e| match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => CanError::Timeout,
            // 控制器 bus-off 时内核返回 ENETDOWN
            _ if e.raw_os_error() == Some(libc::ENETDOWN) => {
                warn!("TX: interface '{}' is down (bus-off?)", self.interface);
                CanError::BusOff
            },
            _ => CanError::Io(e),
        })?;

        trace!("TX: CAN frame ID=0x{:X}, len={}", frame.id, frame.len);
        Ok(())
    }

    fn restart(&mut self) -> Result<(), CanError> {
        restart_interface(&self.interface)
    }
}
