//! 进程内虚拟 CAN 总线
//!
//! 多个端点共享一条总线：任一端点发送的帧按发送顺序投递给其他所有端点
//! （不回环给发送者，与 SocketCAN 默认关闭 `CAN_RAW_RECV_OWN_MSGS` 的行为一致）。
//!
//! 每个端点有一个有界接收队列，队列满时丢弃新帧并计数，模拟控制器 FIFO 溢出。
//! `inject_bus_off()` 用于故障注入：总线关闭后所有收发返回 `CanError::BusOff`，
//! 直到某个端点调用 `restart()`。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::{
    AmiroFrame, BusState, BusStatus, CanAdapter, CanDeviceError, CanDeviceErrorKind, CanError,
    RxAdapter, SplittableAdapter, TxAdapter,
};

/// 默认每个端点的接收队列深度
pub const DEFAULT_ENDPOINT_CAPACITY: usize = 1024;

struct Endpoint {
    id: usize,
    queue: Sender<AmiroFrame>,
}

struct BusInner {
    endpoints: Mutex<Vec<Endpoint>>,
    next_id: AtomicUsize,
    capacity: usize,
    epoch: Instant,
    bus_off: AtomicBool,
    tx_errors: AtomicU32,
    frames_delivered: AtomicU64,
    frames_dropped: AtomicU64,
    restarts: AtomicU64,
}

impl BusInner {
    /// 投递一帧给除发送者外的所有端点
    ///
    /// 持有端点表锁完成整次投递，保证同一发送者的帧在每个接收者处保持顺序。
    fn deliver(&self, from: usize, mut frame: AmiroFrame) -> Result<(), CanError> {
        if self.bus_off.load(Ordering::Acquire) {
            self.tx_errors.fetch_add(1, Ordering::Relaxed);
            return Err(CanError::BusOff);
        }

        frame.timestamp_us = self.epoch.elapsed().as_micros() as u64;

        let mut endpoints = self.endpoints.lock();
        endpoints.retain(|endpoint| {
            if endpoint.id == from {
                return true;
            }
            match endpoint.queue.try_send(frame) {
                Ok(()) => {
                    self.frames_delivered.fetch_add(1, Ordering::Relaxed);
                    true
                },
                Err(TrySendError::Full(_)) => {
                    self.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Loopback bus: endpoint {} queue full, dropping frame 0x{:X}",
                        endpoint.id, frame.id
                    );
                    true
                },
                // 接收端已释放，移除该端点
                Err(TrySendError::Disconnected(_)) => false,
            }
        });

        trace!("Loopback bus: frame 0x{:X} from endpoint {}", frame.id, from);
        Ok(())
    }

    fn status(&self) -> BusStatus {
        BusStatus {
            state: if self.bus_off.load(Ordering::Acquire) {
                BusState::BusOff
            } else {
                BusState::ErrorActive
            },
            tx_errors: self.tx_errors.load(Ordering::Relaxed),
            rx_errors: 0,
        }
    }

    fn restart(&self) {
        if self.bus_off.swap(false, Ordering::AcqRel) {
            self.restarts.fetch_add(1, Ordering::Relaxed);
            trace!("Loopback bus: restarted after bus-off");
        }
    }

    fn receive(&self, queue: &Receiver<AmiroFrame>, timeout: Duration) -> Result<AmiroFrame, CanError> {
        if self.bus_off.load(Ordering::Acquire) {
            return Err(CanError::BusOff);
        }
        match queue.recv_timeout(timeout) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => Err(CanError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::NoDevice,
                "loopback endpoint detached",
            ))),
        }
    }
}

/// 进程内虚拟总线（句柄可克隆，共享同一条总线）
#[derive(Clone)]
pub struct LoopbackBus {
    inner: Arc<BusInner>,
}

impl Default for LoopbackBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ENDPOINT_CAPACITY)
    }

    /// 指定每个端点的接收队列深度
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                endpoints: Mutex::new(Vec::new()),
                next_id: AtomicUsize::new(0),
                capacity: capacity.max(1),
                epoch: Instant::now(),
                bus_off: AtomicBool::new(false),
                tx_errors: AtomicU32::new(0),
                frames_delivered: AtomicU64::new(0),
                frames_dropped: AtomicU64::new(0),
                restarts: AtomicU64::new(0),
            }),
        }
    }

    /// 接入一个新端点（相当于一块板卡的 CAN 控制器）
    pub fn attach(&self) -> LoopbackAdapter {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = bounded(self.inner.capacity);
        self.inner.endpoints.lock().push(Endpoint { id, queue: tx });
        trace!("Loopback bus: endpoint {} attached", id);
        LoopbackAdapter {
            id,
            queue: rx,
            bus: self.inner.clone(),
            receive_timeout: Duration::from_millis(10),
        }
    }

    /// 故障注入：总线进入 bus-off 状态
    pub fn inject_bus_off(&self) {
        warn!("Loopback bus: bus-off injected");
        self.inner.bus_off.store(true, Ordering::Release);
    }

    pub fn is_bus_off(&self) -> bool {
        self.inner.bus_off.load(Ordering::Acquire)
    }

    pub fn restarts(&self) -> u64 {
        self.inner.restarts.load(Ordering::Relaxed)
    }

    pub fn frames_delivered(&self) -> u64 {
        self.inner.frames_delivered.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.inner.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn endpoint_count(&self) -> usize {
        self.inner.endpoints.lock().len()
    }
}

/// 总线上的一个端点
pub struct LoopbackAdapter {
    id: usize,
    queue: Receiver<AmiroFrame>,
    bus: Arc<BusInner>,
    receive_timeout: Duration,
}

impl LoopbackAdapter {
    pub fn endpoint_id(&self) -> usize {
        self.id
    }
}

impl CanAdapter for LoopbackAdapter {
    fn send(&mut self, frame: AmiroFrame) -> Result<(), CanError> {
        self.bus.deliver(self.id, frame)
    }

    fn receive(&mut self) -> Result<AmiroFrame, CanError> {
        self.bus.receive(&self.queue, self.receive_timeout)
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        self.receive_timeout = timeout;
    }

    fn receive_timeout(&mut self, timeout: Duration) -> Result<AmiroFrame, CanError> {
        self.bus.receive(&self.queue, timeout)
    }

    fn status(&self) -> Result<BusStatus, CanError> {
        Ok(self.bus.status())
    }

    fn restart(&mut self) -> Result<(), CanError> {
        self.bus.restart();
        Ok(())
    }
}

impl SplittableAdapter for LoopbackAdapter {
    type RxAdapter = LoopbackRxAdapter;
    type TxAdapter = LoopbackTxAdapter;

    fn split(self) -> Result<(Self::RxAdapter, Self::TxAdapter), CanError> {
        let rx = LoopbackRxAdapter {
            queue: self.queue,
            bus: self.bus.clone(),
        };
        let tx = LoopbackTxAdapter {
            id: self.id,
            bus: self.bus,
        };
        Ok((rx, tx))
    }
}

/// 端点的接收半部
pub struct LoopbackRxAdapter {
    queue: Receiver<AmiroFrame>,
    bus: Arc<BusInner>,
}

impl RxAdapter for LoopbackRxAdapter {
    fn receive_timeout(&mut self, timeout: Duration) -> Result<AmiroFrame, CanError> {
        self.bus.receive(&self.queue, timeout)
    }

    fn status(&self) -> Result<BusStatus, CanError> {
        Ok(self.bus.status())
    }

    fn restart(&mut self) -> Result<(), CanError> {
        self.bus.restart();
        Ok(())
    }
}

/// 端点的发送半部
pub struct LoopbackTxAdapter {
    id: usize,
    bus: Arc<BusInner>,
}

impl TxAdapter for LoopbackTxAdapter {
    /// 投递不会阻塞，超时参数不起作用
    fn send_timeout(&mut self, frame: AmiroFrame, _timeout: Duration) -> Result<(), CanError> {
        self.bus.deliver(self.id, frame)
    }

    fn restart(&mut self) -> Result<(), CanError> {
        self.bus.restart();
        Ok(())
    }
}
