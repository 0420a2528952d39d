//! 发送角色
//!
//! 所有发送（应用线程的即时调用、周期广播线程）共用一把发送锁。
//! 多帧数据（shell 文本）在一次加锁内连续发出，不会与其他发送交错。

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use amiro_can::{AmiroFrame, CanError, TxAdapter};
use amiro_protocol::{
    Addressing, BoardId, CalibrationGroup, CalibrationStatus, Color, FrameCodec,
    KinematicConstants, KinematicVelocity, Message, NUM_LEDS, Position, ProtocolError,
    ShellChunk, TargetPosition,
};
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{error, trace, warn};

use crate::config::TopologyConfig;
use crate::error::DriverError;
use crate::metrics::NodeMetrics;

/// 板卡周期广播的能力接口
///
/// 周期线程每个节拍调用一次 `publish`；返回错误只会被记录，下一个节拍照常调用。
pub trait PeriodicPublisher: Send + Sync {
    fn publish(&self, tx: &Transmitter) -> Result<(), DriverError>;
}

/// 本板最近一次发出的意图
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutboundIntent {
    pub target_speed: Option<KinematicVelocity>,
    pub target_position: Option<TargetPosition>,
    pub odometry: Option<Position>,
    pub light_colors: [Option<Color>; NUM_LEDS],
    pub brightness: Option<u8>,
    pub kinematic_constants: Option<KinematicConstants>,
    /// 是否已广播过关机
    pub shutdown_broadcast: bool,
    /// 经 shell 帧发出的字节总数
    pub shell_bytes_sent: u64,
}

type FrameBatch = SmallVec<[AmiroFrame; 4]>;

/// 发送角色
pub struct Transmitter {
    /// 发送锁
    tx: Mutex<Box<dyn TxAdapter + Send>>,
    codec: FrameCodec,
    local: BoardId,
    topology: TopologyConfig,
    send_timeout: Duration,
    intent: Mutex<OutboundIntent>,
    metrics: Arc<NodeMetrics>,
}

impl Transmitter {
    pub fn new(
        tx: impl TxAdapter + Send + 'static,
        codec: FrameCodec,
        local: BoardId,
        topology: TopologyConfig,
        send_timeout: Duration,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        Self {
            tx: Mutex::new(Box::new(tx)),
            codec,
            local,
            topology,
            send_timeout,
            intent: Mutex::new(OutboundIntent::default()),
            metrics,
        }
    }

    pub fn local_board(&self) -> BoardId {
        self.local
    }

    pub fn topology(&self) -> &TopologyConfig {
        &self.topology
    }

    /// 当前意图的快照
    pub fn intent(&self) -> OutboundIntent {
        self.intent.lock().clone()
    }

    /// 发送一条消息，`board` 按类别的寻址方式解释
    pub fn send_message(&self, board: BoardId, message: &Message) -> Result<(), DriverError> {
        let frame = self.encode(board, message)?;
        self.send_frames(&[frame])
    }

    /// 发布本板的传感器报告
    pub fn publish(&self, message: &Message) -> Result<(), DriverError> {
        let category = message.category();
        if category.addressing() != Addressing::Sender {
            return Err(DriverError::InvalidInput(format!(
                "{:?} is not a sensor report",
                category
            )));
        }
        self.send_message(self.local, message)
    }

    pub fn set_target_speed(&self, velocity: KinematicVelocity) -> Result<(), DriverError> {
        let message = Message::TargetSpeed(velocity);
        let frame = self.encode(self.topology.di_wheel_drive(), &message)?;
        self.intent.lock().target_speed = Some(velocity);
        self.send_frames(&[frame])
    }

    pub fn set_odometry(&self, position: Position) -> Result<(), DriverError> {
        let message = Message::SetOdometry(position);
        let frame = self.encode(self.topology.di_wheel_drive(), &message)?;
        self.intent.lock().odometry = Some(position);
        self.send_frames(&[frame])
    }

    pub fn set_light_color(&self, index: u8, color: Color) -> Result<(), DriverError> {
        let message = Message::LightColor { index, color };
        let frame = self.encode(self.topology.light_ring(), &message)?;
        if let Some(slot) = self.intent.lock().light_colors.get_mut(index as usize) {
            *slot = Some(color);
        }
        self.send_frames(&[frame])
    }

    pub fn set_light_brightness(&self, percent: u8) -> Result<(), DriverError> {
        let message = Message::LightBrightness(percent);
        let frame = self.encode(self.topology.light_ring(), &message)?;
        self.intent.lock().brightness = Some(percent);
        self.send_frames(&[frame])
    }

    pub fn set_target_position(
        &self,
        position: Position,
        deadline: Duration,
    ) -> Result<(), DriverError> {
        let deadline_ms = u16::try_from(deadline.as_millis()).map_err(|_| {
            warn!("TX: target position deadline {:?} exceeds u16 milliseconds", deadline);
            DriverError::Protocol(ProtocolError::OutOfRange {
                field: "deadline_ms",
                value: deadline.as_millis().min(i64::MAX as u128) as i64,
            })
        })?;
        let target = TargetPosition {
            position,
            deadline_ms,
        };
        let message = Message::TargetPosition(target);
        let frame = self.encode(self.topology.di_wheel_drive(), &message)?;
        self.intent.lock().target_position = Some(target);
        self.send_frames(&[frame])
    }

    pub fn set_kinematic_constants(&self, ed: f32, eb: f32) -> Result<(), DriverError> {
        let constants = KinematicConstants { ed, eb };
        let message = Message::KinematicConstants(constants);
        let frame = self.encode(self.topology.di_wheel_drive(), &message)?;
        self.intent.lock().kinematic_constants = Some(constants);
        self.send_frames(&[frame])
    }

    /// 广播关机（带魔数）
    pub fn broadcast_shutdown(&self) -> Result<(), DriverError> {
        let frame = self.encode(BoardId::BROADCAST, &Message::Shutdown)?;
        self.intent.lock().shutdown_broadcast = true;
        self.send_frames(&[frame])
    }

    pub fn broadcast_robot_id(&self, robot_id: u8) -> Result<(), DriverError> {
        self.send_message(BoardId::BROADCAST, &Message::RobotId(robot_id))
    }

    /// 把控制台输入发给 `to` 板的 shell
    pub fn query_shell(&self, to: BoardId, text: &[u8]) -> Result<(), DriverError> {
        self.send_shell(to, text, |from, chunk| Message::ShellQuery { from, chunk })
    }

    /// 把本板 shell 的输出发回控制台所在的 `to` 板
    pub fn reply_shell(&self, to: BoardId, text: &[u8]) -> Result<(), DriverError> {
        self.send_shell(to, text, |from, chunk| Message::ShellReply { from, chunk })
    }

    /// 让 `console_owner` 板把控制台切换到 `target`（0 = 本地）
    pub fn switch_shell(&self, console_owner: BoardId, target: BoardId) -> Result<(), DriverError> {
        self.send_message(console_owner, &Message::ShellSwitch { target })
    }

    /// 请求传感器所属板重新校准基线
    pub fn request_calibration(&self, group: CalibrationGroup) -> Result<(), DriverError> {
        let owner = self.calibration_owner(group);
        let message = Message::Calibrate {
            group,
            requester: self.local,
        };
        self.send_message(owner, &message)
    }

    pub fn report_calibration(
        &self,
        to: BoardId,
        group: CalibrationGroup,
        status: CalibrationStatus,
    ) -> Result<(), DriverError> {
        self.send_message(to, &Message::CalibrationDone { group, status })
    }

    /// 哪块板持有该组接近传感器
    pub fn calibration_owner(&self, group: CalibrationGroup) -> BoardId {
        match group {
            CalibrationGroup::Ring => self.topology.power_management(),
            CalibrationGroup::Floor => self.topology.di_wheel_drive(),
        }
    }

    /// 重发最近一次的速度和灯光设置
    ///
    /// 命令是幂等的状态，周期重发可以弥补偶发的丢帧。
    pub fn rebroadcast_intent(&self) -> Result<(), DriverError> {
        let intent = self.intent();
        let mut frames = FrameBatch::new();
        if let Some(velocity) = intent.target_speed {
            frames.push(self.encode(
                self.topology.di_wheel_drive(),
                &Message::TargetSpeed(velocity),
            )?);
        }
        if let Some(percent) = intent.brightness {
            frames.push(self.encode(self.topology.light_ring(), &Message::LightBrightness(percent))?);
        }
        for (index, color) in intent.light_colors.iter().enumerate() {
            if let Some(color) = color {
                let message = Message::LightColor {
                    index: index as u8,
                    color: *color,
                };
                frames.push(self.encode(self.topology.light_ring(), &message)?);
            }
        }
        if frames.is_empty() {
            return Ok(());
        }
        self.send_frames(&frames)
    }

    fn send_shell(
        &self,
        to: BoardId,
        text: &[u8],
        make: impl Fn(BoardId, ShellChunk) -> Message,
    ) -> Result<(), DriverError> {
        if to.is_broadcast() || to == self.local {
            return Err(DriverError::InvalidInput(format!(
                "shell peer must be a remote board, got {}",
                to
            )));
        }
        let frames = ShellChunk::split(text)
            .map(|chunk| self.encode(to, &make(self.local, chunk)))
            .collect::<Result<Vec<_>, _>>()?;
        if frames.is_empty() {
            return Ok(());
        }

        self.send_frames(&frames)?;
        self.intent.lock().shell_bytes_sent += text.len() as u64;
        Ok(())
    }

    /// 编码；调用方传入的非法值（越界、地址错误）记录警告后返回错误
    fn encode(&self, board: BoardId, message: &Message) -> Result<AmiroFrame, DriverError> {
        self.codec.encode(board, message).map_err(|e| {
            warn!("TX: rejecting {:?} for {}: {}", message.category(), board, e);
            DriverError::Protocol(e)
        })
    }

    /// 在一次加锁内按顺序发送
    fn send_frames(&self, frames: &[AmiroFrame]) -> Result<(), DriverError> {
        let mut tx = self.tx.lock();
        for frame in frames {
            self.send_locked(&mut **tx, *frame)?;
        }
        Ok(())
    }

    fn send_locked(&self, tx: &mut dyn TxAdapter, frame: AmiroFrame) -> Result<(), DriverError> {
        match tx.send_timeout(frame, self.send_timeout) {
            Ok(()) => {
                self.metrics.tx_frames_total.fetch_add(1, Ordering::Relaxed);
                trace!("TX: frame 0x{:X} sent, len={}", frame.id, frame.len);
                Ok(())
            },
            Err(CanError::Timeout) => {
                self.metrics.tx_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!("TX: send timeout for frame 0x{:X}", frame.id);
                Err(CanError::Timeout.into())
            },
            Err(CanError::BusOff) => {
                self.metrics.tx_errors.fetch_add(1, Ordering::Relaxed);
                warn!("TX: bus off, restarting controller");
                match tx.restart() {
                    Ok(()) => {
                        self.metrics.bus_restarts.fetch_add(1, Ordering::Relaxed);
                    },
                    Err(e) => error!("TX: controller restart failed: {}", e),
                }
                Err(CanError::BusOff.into())
            },
            Err(e) => {
                self.metrics.tx_errors.fetch_add(1, Ordering::Relaxed);
                error!("TX: send failed for frame 0x{:X}: {}", frame.id, e);
                Err(e.into())
            },
        }
    }
}

impl std::fmt::Debug for Transmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transmitter")
            .field("local", &self.local)
            .field("codec", &self.codec)
            .field("send_timeout", &self.send_timeout)
            .finish_non_exhaustive()
    }
}

/// 周期重发意图（用于只发命令、不产生报告的控制板）
#[derive(Debug, Default, Clone, Copy)]
pub struct IntentRebroadcast;

impl PeriodicPublisher for IntentRebroadcast {
    fn publish(&self, tx: &Transmitter) -> Result<(), DriverError> {
        tx.rebroadcast_intent()
    }
}
