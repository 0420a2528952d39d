//! 分布式状态缓存
//!
//! 接收线程是唯一写者，应用线程随时读取。每个字段独立原子更新：
//! 传感器槽位用 `AtomicU16`，结构化字段用 `ArcSwap`（读到的总是某次完整写入的值），
//! 不同字段之间不保证一致的快照。

use std::array;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::time::Instant;

use amiro_protocol::{
    Axes3, BoardId, CalibrationGroup, CalibrationStatus, KinematicVelocity, Message,
    NUM_FLOOR_SENSORS, NUM_RING_SENSORS, Position, PowerStatus,
};
use arc_swap::ArcSwap;

/// 单块远端板的缓存
#[derive(Debug)]
pub struct BoardState {
    proximity_ring: [AtomicU16; NUM_RING_SENSORS],
    proximity_floor: [AtomicU16; NUM_FLOOR_SENSORS],
    actual_speed: ArcSwap<KinematicVelocity>,
    odometry: ArcSwap<Position>,
    power_status: ArcSwap<PowerStatus>,
    magnetometer: ArcSwap<Axes3>,
    gyroscope: ArcSwap<Axes3>,
    /// 最近一次报告的时间（相对节点启动，µs；0 表示从未收到）
    last_seen_us: AtomicU64,
}

impl Default for BoardState {
    fn default() -> Self {
        Self {
            proximity_ring: array::from_fn(|_| AtomicU16::new(0)),
            proximity_floor: array::from_fn(|_| AtomicU16::new(0)),
            actual_speed: ArcSwap::from_pointee(KinematicVelocity::default()),
            odometry: ArcSwap::from_pointee(Position::default()),
            power_status: ArcSwap::from_pointee(PowerStatus::default()),
            magnetometer: ArcSwap::from_pointee(Axes3::default()),
            gyroscope: ArcSwap::from_pointee(Axes3::default()),
            last_seen_us: AtomicU64::new(0),
        }
    }
}

impl BoardState {
    pub fn proximity_ring(&self, index: usize) -> Option<u16> {
        self.proximity_ring
            .get(index)
            .map(|slot| slot.load(Ordering::Acquire))
    }

    pub fn proximity_ring_values(&self) -> [u16; NUM_RING_SENSORS] {
        array::from_fn(|i| self.proximity_ring[i].load(Ordering::Acquire))
    }

    pub fn proximity_floor(&self, index: usize) -> Option<u16> {
        self.proximity_floor
            .get(index)
            .map(|slot| slot.load(Ordering::Acquire))
    }

    pub fn proximity_floor_values(&self) -> [u16; NUM_FLOOR_SENSORS] {
        array::from_fn(|i| self.proximity_floor[i].load(Ordering::Acquire))
    }

    pub fn actual_speed(&self) -> KinematicVelocity {
        **self.actual_speed.load()
    }

    pub fn odometry(&self) -> Position {
        **self.odometry.load()
    }

    pub fn power_status(&self) -> PowerStatus {
        **self.power_status.load()
    }

    pub fn magnetometer(&self) -> Axes3 {
        **self.magnetometer.load()
    }

    pub fn gyroscope(&self) -> Axes3 {
        **self.gyroscope.load()
    }

    pub fn last_seen_us(&self) -> u64 {
        self.last_seen_us.load(Ordering::Relaxed)
    }

    /// 写入一条传感器报告，返回是否为报告类消息
    pub(crate) fn apply_report(&self, message: &Message, now_us: u64) -> bool {
        match *message {
            Message::ProximityRing { index, value } => {
                let Some(slot) = self.proximity_ring.get(index as usize) else {
                    return false;
                };
                slot.store(value, Ordering::Release);
            },
            Message::ProximityFloor { index, value } => {
                let Some(slot) = self.proximity_floor.get(index as usize) else {
                    return false;
                };
                slot.store(value, Ordering::Release);
            },
            Message::ActualSpeed(speed) => self.actual_speed.store(speed.into()),
            Message::Odometry(position) => self.odometry.store(position.into()),
            Message::PowerStatus(status) => self.power_status.store(status.into()),
            Message::Magnetometer(axes) => self.magnetometer.store(axes.into()),
            Message::Gyroscope(axes) => self.gyroscope.store(axes.into()),
            _ => return false,
        }
        // 0 保留为“从未收到”
        self.last_seen_us.store(now_us.max(1), Ordering::Relaxed);
        true
    }
}

/// 校准进度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationState {
    #[default]
    Idle,
    /// 已发出请求，等待所属板回复
    Pending,
    Done(CalibrationStatus),
}

/// 机器人编号未知时的原子哨兵值
const NO_ROBOT_ID: u16 = u16::MAX;

/// 全网状态：按板卡 ID 索引的 `BoardState` 表 + 机器人级字段
#[derive(Debug)]
pub struct NetworkState {
    boards: Vec<BoardState>,
    robot_id: AtomicU16,
    calibration: [ArcSwap<CalibrationState>; 2],
    epoch: Instant,
}

impl NetworkState {
    /// `board_count` 为布局可寻址的板卡数（含广播地址 0）
    pub fn new(board_count: usize) -> Self {
        Self {
            boards: (0..board_count).map(|_| BoardState::default()).collect(),
            robot_id: AtomicU16::new(NO_ROBOT_ID),
            calibration: array::from_fn(|_| ArcSwap::from_pointee(CalibrationState::Idle)),
            epoch: Instant::now(),
        }
    }

    /// 广播地址 0 不对应任何板
    pub fn board(&self, board: BoardId) -> Option<&BoardState> {
        if board.is_broadcast() {
            return None;
        }
        self.boards.get(board.raw() as usize)
    }

    pub fn board_count(&self) -> usize {
        self.boards.len()
    }

    pub fn robot_id(&self) -> Option<u8> {
        match self.robot_id.load(Ordering::Acquire) {
            NO_ROBOT_ID => None,
            id => Some(id as u8),
        }
    }

    pub(crate) fn set_robot_id(&self, id: u8) {
        self.robot_id.store(id as u16, Ordering::Release);
    }

    pub fn calibration_status(&self, group: CalibrationGroup) -> CalibrationState {
        **self.calibration[group as usize].load()
    }

    pub(crate) fn set_calibration(&self, group: CalibrationGroup, state: CalibrationState) {
        self.calibration[group as usize].store(state.into());
    }

    /// 节点启动以来的微秒数
    pub(crate) fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    pub(crate) fn apply_report(&self, board: BoardId, message: &Message) -> bool {
        let now = self.now_us();
        self.board(board)
            .is_some_and(|state| state.apply_report(message, now))
    }
}
