//! 线程循环
//!
//! - `rx_loop`: 接收 → 解码 → 分发
//! - `periodic_loop`: 按固定间隔调用板卡的周期发布器
//!
//! 两个循环都是协作式退出：每次唤醒检查 `is_running`，
//! 最长退出延迟分别为接收超时和广播间隔。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use amiro_can::{CanError, RxAdapter};
use crossbeam_channel::{Receiver, select, tick};
use tracing::{error, trace, warn};

use crate::dispatch::Dispatcher;
use crate::metrics::NodeMetrics;
use crate::transmitter::{PeriodicPublisher, Transmitter};

/// 线程运行参数
///
/// # Example
///
/// ```
/// use amiro_driver::PipelineConfig;
/// use std::time::Duration;
///
/// let config = PipelineConfig {
///     receive_timeout: Duration::from_millis(5),
///     ..PipelineConfig::default()
/// };
/// assert_eq!(config.periodic_interval, Duration::from_millis(100));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// 单次接收的阻塞上限
    pub receive_timeout: Duration,
    /// 单帧发送超时
    pub send_timeout: Duration,
    /// 周期广播间隔
    pub periodic_interval: Duration,
    /// 停止时等待线程退出的上限
    pub join_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_millis(10),
            send_timeout: Duration::from_millis(5),
            periodic_interval: Duration::from_millis(100),
            join_timeout: Duration::from_millis(2000),
        }
    }
}

/// 接收循环
///
/// 错误处理：
/// - `Timeout`: 正常（总线空闲），计数后继续
/// - `BusOff`: 重启控制器后继续
/// - 致命错误（设备消失、未启动）：清除 `is_running` 并退出
/// - 其他错误：记录后继续
pub fn rx_loop(
    mut rx: impl RxAdapter,
    dispatcher: Dispatcher,
    config: PipelineConfig,
    is_running: Arc<AtomicBool>,
    metrics: Arc<NodeMetrics>,
) {
    loop {
        // Acquire: If we see false, we must see all cleanup writes from other threads
        if !is_running.load(Ordering::Acquire) {
            trace!("RX thread: is_running flag is false, exiting");
            break;
        }

        let frame = match rx.receive_timeout(config.receive_timeout) {
            Ok(frame) => {
                metrics.rx_frames_total.fetch_add(1, Ordering::Relaxed);
                frame
            },
            Err(CanError::Timeout) => {
                metrics.rx_timeouts.fetch_add(1, Ordering::Relaxed);
                continue;
            },
            Err(CanError::BusOff) => {
                warn!("RX thread: bus off, restarting controller");
                match rx.restart() {
                    Ok(()) => {
                        metrics.bus_restarts.fetch_add(1, Ordering::Relaxed);
                    },
                    Err(e) => {
                        error!("RX thread: controller restart failed: {}", e);
                        if e.is_fatal() {
                            is_running.store(false, Ordering::Release);
                            break;
                        }
                        // 避免在控制器恢复前空转
                        thread::sleep(config.receive_timeout);
                    },
                }
                continue;
            },
            Err(e) => {
                error!("RX thread: CAN receive error: {}", e);
                if e.is_fatal() {
                    error!("RX thread: Fatal error detected, setting is_running = false");
                    // Release: All writes before this are visible to threads that see the false value
                    is_running.store(false, Ordering::Release);
                    break;
                }
                continue;
            },
        };

        let disposition = dispatcher.dispatch(&frame);
        trace!("RX thread: frame 0x{:X} -> {:?}", frame.id, disposition);
    }

    trace!("RX thread: loop exited");
}

/// 周期广播循环
///
/// `stop` 通道断开（发送端被丢弃）时立即退出，不必等到下一个节拍。
/// 发布失败只记录和计数，下一个周期照常执行。
pub fn periodic_loop(
    transmitter: Arc<Transmitter>,
    publisher: Arc<dyn PeriodicPublisher>,
    interval: Duration,
    stop: Receiver<()>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<NodeMetrics>,
) {
    let ticker = tick(interval);

    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("TX thread: is_running flag is false, exiting");
            break;
        }

        select! {
            recv(ticker) -> _ => {},
            recv(stop) -> _ => {
                trace!("TX thread: stop requested");
                break;
            },
        }

        if !is_running.load(Ordering::Acquire) {
            break;
        }

        metrics.periodic_cycles.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = publisher.publish(&transmitter) {
            metrics.periodic_errors.fetch_add(1, Ordering::Relaxed);
            warn!("TX thread: periodic publish failed: {}", e);
        }
    }

    trace!("TX thread: loop exited");
}
