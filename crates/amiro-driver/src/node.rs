//! 节点：一块板上的接收线程 + 周期发送线程 + 对外 API

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, spawn};
use std::time::Duration;

use amiro_can::SplittableAdapter;
use amiro_protocol::{
    Axes3, BoardId, CalibrationGroup, KinematicVelocity, NUM_FLOOR_SENSORS, NUM_RING_SENSORS,
    Position, PowerStatus,
};
use crossbeam_channel::{Sender, bounded};
use tracing::{error, info};

use crate::config::NodeConfig;
use crate::dispatch::{Dispatcher, FrameHandler};
use crate::error::DriverError;
use crate::metrics::{MetricsSnapshot, NodeMetrics};
use crate::pipeline::{PipelineConfig, periodic_loop, rx_loop};
use crate::shell::{Console, RemoteShellPort, ShellRelay};
use crate::shutdown::ShutdownSignal;
use crate::state::{BoardState, CalibrationState, NetworkState};
use crate::transmitter::{PeriodicPublisher, Transmitter};

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程代为 join，超时后它继续等待，进程退出时回收
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 启动节点所需的全部部件（由 `NodeBuilder` 组装）
pub(crate) struct NodeParts {
    pub config: NodeConfig,
    pub publisher: Option<Arc<dyn PeriodicPublisher>>,
    pub handler: Option<Arc<dyn FrameHandler>>,
    pub console: Option<Box<dyn Console>>,
    pub local_shell: Option<Box<dyn Console>>,
    pub shutdown: ShutdownSignal,
}

/// 运行中的 AMiRo 节点
///
/// 丢弃时停止并等待两个线程退出（最多 `join_timeout`）。
pub struct AmiroNode {
    config: NodeConfig,
    pipeline: PipelineConfig,
    transmitter: Arc<Transmitter>,
    state: Arc<NetworkState>,
    shell: Arc<ShellRelay>,
    shutdown: ShutdownSignal,
    metrics: Arc<NodeMetrics>,
    is_running: Arc<AtomicBool>,
    /// 丢弃即通知周期线程退出
    periodic_stop: Option<Sender<()>>,
    rx_thread: Option<JoinHandle<()>>,
    periodic_thread: Option<JoinHandle<()>>,
}

impl AmiroNode {
    pub(crate) fn start<C>(parts: NodeParts, can: C) -> Result<Self, DriverError>
    where
        C: SplittableAdapter,
        C::RxAdapter: Send + 'static,
        C::TxAdapter: Send + 'static,
    {
        let NodeParts {
            config,
            publisher,
            handler,
            console,
            local_shell,
            shutdown,
        } = parts;

        config.validate()?;
        let codec = amiro_protocol::FrameCodec::new(config.layout.to_layout()?);
        let pipeline = config.pipeline();
        let board = config.board();

        let (rx, tx) = can.split()?;

        let metrics = Arc::new(NodeMetrics::new());
        let transmitter = Arc::new(Transmitter::new(
            tx,
            codec,
            board,
            config.topology,
            pipeline.send_timeout,
            metrics.clone(),
        ));
        let state = Arc::new(NetworkState::new(codec.layout().board_count()));
        let shell = Arc::new(ShellRelay::new(
            board,
            transmitter.clone(),
            config.shell_mailbox_capacity,
            metrics.clone(),
        ));
        if let Some(console) = console {
            shell.set_console(console);
        }
        if let Some(local_shell) = local_shell {
            shell.set_local_shell(local_shell);
        }

        let dispatcher = Dispatcher::new(
            &config,
            codec,
            state.clone(),
            shutdown.clone(),
            shell.clone(),
            transmitter.clone(),
            handler,
            metrics.clone(),
        );

        let is_running = Arc::new(AtomicBool::new(true));

        let rx_thread = {
            let is_running = is_running.clone();
            let metrics = metrics.clone();
            thread::Builder::new()
                .name(format!("amiro-rx-{}", board.raw()))
                .spawn(move || rx_loop(rx, dispatcher, pipeline, is_running, metrics))
                .map_err(|e| DriverError::IoThread(format!("failed to spawn RX thread: {}", e)))?
        };

        let (periodic_stop, periodic_thread) = match publisher {
            Some(publisher) => {
                let (stop_tx, stop_rx) = bounded::<()>(0);
                let transmitter = transmitter.clone();
                let thread_running = is_running.clone();
                let metrics = metrics.clone();
                let spawned = thread::Builder::new()
                    .name(format!("amiro-tx-{}", board.raw()))
                    .spawn(move || {
                        periodic_loop(
                            transmitter,
                            publisher,
                            pipeline.periodic_interval,
                            stop_rx,
                            thread_running,
                            metrics,
                        )
                    });
                match spawned {
                    Ok(handle) => (Some(stop_tx), Some(handle)),
                    Err(e) => {
                        // RX 线程会在一个接收超时内自行退出
                        is_running.store(false, Ordering::Release);
                        return Err(DriverError::IoThread(format!(
                            "failed to spawn TX thread: {}",
                            e
                        )));
                    },
                }
            },
            None => (None, None),
        };

        info!(
            "AMiRo node {} started (layout {:?}, periodic: {})",
            board,
            codec.layout(),
            periodic_thread.is_some()
        );

        Ok(Self {
            config,
            pipeline,
            transmitter,
            state,
            shell,
            shutdown,
            metrics,
            is_running,
            periodic_stop,
            rx_thread: Some(rx_thread),
            periodic_thread,
        })
    }

    pub fn board(&self) -> BoardId {
        self.config.board()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// 发送角色（可在任意线程调用）
    pub fn transmitter(&self) -> &Arc<Transmitter> {
        &self.transmitter
    }

    pub fn state(&self) -> &Arc<NetworkState> {
        &self.state
    }

    pub fn shell(&self) -> &Arc<ShellRelay> {
        &self.shell
    }

    /// 本板 shell 面向总线的端口
    pub fn remote_shell(&self) -> RemoteShellPort {
        self.shell.remote_port()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.is_requested()
    }

    /// 接收线程是否仍在运行（致命错误后为 `false`）
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// 返回 (rx_alive, periodic_alive)；没有周期线程时第二项为 `true`
    pub fn check_health(&self) -> (bool, bool) {
        let rx_alive = self
            .rx_thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false);
        let periodic_alive = self
            .periodic_thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(self.periodic_stop.is_none() && self.rx_thread.is_some());
        (rx_alive, periodic_alive)
    }

    pub fn is_healthy(&self) -> bool {
        let (rx_alive, periodic_alive) = self.check_health();
        rx_alive && periodic_alive
    }

    // ===== 缓存访问（不阻塞）=====

    pub fn board_state(&self, board: BoardId) -> Option<&BoardState> {
        self.state.board(board)
    }

    fn topology_board(&self, board: BoardId) -> Result<&BoardState, DriverError> {
        self.state
            .board(board)
            .ok_or_else(|| DriverError::InvalidInput(format!("{} is not addressable", board)))
    }

    pub fn proximity_ring_value(&self, index: usize) -> Result<u16, DriverError> {
        self.topology_board(self.config.topology.power_management())?
            .proximity_ring(index)
            .ok_or_else(|| {
                DriverError::InvalidInput(format!(
                    "ring sensor index {} out of range 0..{}",
                    index, NUM_RING_SENSORS
                ))
            })
    }

    pub fn proximity_ring_values(&self) -> Result<[u16; NUM_RING_SENSORS], DriverError> {
        Ok(self
            .topology_board(self.config.topology.power_management())?
            .proximity_ring_values())
    }

    pub fn proximity_floor_value(&self, index: usize) -> Result<u16, DriverError> {
        self.topology_board(self.config.topology.di_wheel_drive())?
            .proximity_floor(index)
            .ok_or_else(|| {
                DriverError::InvalidInput(format!(
                    "floor sensor index {} out of range 0..{}",
                    index, NUM_FLOOR_SENSORS
                ))
            })
    }

    pub fn proximity_floor_values(&self) -> Result<[u16; NUM_FLOOR_SENSORS], DriverError> {
        Ok(self
            .topology_board(self.config.topology.di_wheel_drive())?
            .proximity_floor_values())
    }

    pub fn actual_speed(&self) -> Result<KinematicVelocity, DriverError> {
        Ok(self
            .topology_board(self.config.topology.di_wheel_drive())?
            .actual_speed())
    }

    pub fn odometry(&self) -> Result<Position, DriverError> {
        Ok(self
            .topology_board(self.config.topology.di_wheel_drive())?
            .odometry())
    }

    pub fn power_status(&self) -> Result<PowerStatus, DriverError> {
        Ok(self
            .topology_board(self.config.topology.power_management())?
            .power_status())
    }

    pub fn magnetometer(&self) -> Result<Axes3, DriverError> {
        Ok(self
            .topology_board(self.config.topology.di_wheel_drive())?
            .magnetometer())
    }

    pub fn gyroscope(&self) -> Result<Axes3, DriverError> {
        Ok(self
            .topology_board(self.config.topology.di_wheel_drive())?
            .gyroscope())
    }

    pub fn robot_id(&self) -> Option<u8> {
        self.state.robot_id()
    }

    pub fn calibration_status(&self, group: CalibrationGroup) -> CalibrationState {
        self.state.calibration_status(group)
    }

    /// 请求 PowerManagement 重新校准环形接近传感器
    pub fn calibrate_proximity_ring_values(&self) -> Result<(), DriverError> {
        self.request_calibration(CalibrationGroup::Ring)
    }

    /// 请求 DiWheelDrive 重新校准地面接近传感器
    pub fn calibrate_proximity_floor_values(&self) -> Result<(), DriverError> {
        self.request_calibration(CalibrationGroup::Floor)
    }

    fn request_calibration(&self, group: CalibrationGroup) -> Result<(), DriverError> {
        let owner = self.transmitter.calibration_owner(group);
        if owner == self.board() {
            return Err(DriverError::InvalidInput(format!(
                "{:?} sensors belong to this board, calibrate them locally",
                group
            )));
        }

        let previous = self.state.calibration_status(group);
        self.state.set_calibration(group, CalibrationState::Pending);
        if let Err(e) = self.transmitter.request_calibration(group) {
            self.state.set_calibration(group, previous);
            return Err(e);
        }
        Ok(())
    }

    /// 停止两个线程并等待退出（可重复调用）
    pub fn stop(&mut self) {
        // Release: 之前的写入对看到 false 的线程可见
        self.is_running.store(false, Ordering::Release);
        // 断开停止通道，周期线程立即醒来
        self.periodic_stop.take();

        let join_timeout = self.pipeline.join_timeout;

        if let Some(handle) = self.rx_thread.take()
            && let Err(_e) = handle.join_timeout(join_timeout)
        {
            error!(
                "RX thread panicked or failed to shut down within {:?}",
                join_timeout
            );
        }

        if let Some(handle) = self.periodic_thread.take()
            && let Err(_e) = handle.join_timeout(join_timeout)
        {
            error!(
                "TX thread panicked or failed to shut down within {:?}",
                join_timeout
            );
        }
    }
}

impl Drop for AmiroNode {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AmiroNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmiroNode")
            .field("board", &self.board())
            .field("running", &self.is_running())
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
