//! 节点运行指标
//!
//! 原子计数器，任何线程都可以无锁读取。

use std::sync::atomic::{AtomicU64, Ordering};

/// 节点实时指标
///
/// ```rust
/// use amiro_driver::NodeMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = NodeMetrics::new();
/// metrics.rx_frames_total.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().rx_frames_total, 1);
/// ```
#[derive(Debug, Default)]
pub struct NodeMetrics {
    /// RX 接收的总帧数
    pub rx_frames_total: AtomicU64,
    /// RX 超时次数（正常现象，总线空闲时会超时）
    pub rx_timeouts: AtomicU64,
    /// 未知类别的帧（前向兼容，只计数）
    pub rx_unknown_category: AtomicU64,
    /// DLC 与类别不符而被丢弃的帧
    pub rx_invalid_length: AtomicU64,
    /// 其他载荷错误（魔数不符、索引越界等）
    pub rx_malformed: AtomicU64,
    /// 合法但与本板无关的帧
    pub rx_ignored: AtomicU64,
    /// 写入 BoardState 的次数
    pub rx_state_updates: AtomicU64,
    /// 交给命令处理器的次数
    pub rx_commands: AtomicU64,
    /// 命令处理器返回错误的次数
    pub rx_command_errors: AtomicU64,
    /// TX 发送成功的帧数
    pub tx_frames_total: AtomicU64,
    /// TX 发送失败次数（不含超时）
    pub tx_errors: AtomicU64,
    /// TX 超时次数
    pub tx_timeouts: AtomicU64,
    /// bus-off 后重启总线的次数
    pub bus_restarts: AtomicU64,
    /// shell 邮箱满而丢弃的数据块
    pub shell_drops: AtomicU64,
    /// 周期广播执行次数
    pub periodic_cycles: AtomicU64,
    /// 周期广播失败次数
    pub periodic_errors: AtomicU64,
}

impl NodeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指标快照（各计数器独立读取，之间可能有微小的时间差）
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rx_frames_total: self.rx_frames_total.load(Ordering::Relaxed),
            rx_timeouts: self.rx_timeouts.load(Ordering::Relaxed),
            rx_unknown_category: self.rx_unknown_category.load(Ordering::Relaxed),
            rx_invalid_length: self.rx_invalid_length.load(Ordering::Relaxed),
            rx_malformed: self.rx_malformed.load(Ordering::Relaxed),
            rx_ignored: self.rx_ignored.load(Ordering::Relaxed),
            rx_state_updates: self.rx_state_updates.load(Ordering::Relaxed),
            rx_commands: self.rx_commands.load(Ordering::Relaxed),
            rx_command_errors: self.rx_command_errors.load(Ordering::Relaxed),
            tx_frames_total: self.tx_frames_total.load(Ordering::Relaxed),
            tx_errors: self.tx_errors.load(Ordering::Relaxed),
            tx_timeouts: self.tx_timeouts.load(Ordering::Relaxed),
            bus_restarts: self.bus_restarts.load(Ordering::Relaxed),
            shell_drops: self.shell_drops.load(Ordering::Relaxed),
            periodic_cycles: self.periodic_cycles.load(Ordering::Relaxed),
            periodic_errors: self.periodic_errors.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        for counter in [
            &self.rx_frames_total,
            &self.rx_timeouts,
            &self.rx_unknown_category,
            &self.rx_invalid_length,
            &self.rx_malformed,
            &self.rx_ignored,
            &self.rx_state_updates,
            &self.rx_commands,
            &self.rx_command_errors,
            &self.tx_frames_total,
            &self.tx_errors,
            &self.tx_timeouts,
            &self.bus_restarts,
            &self.shell_drops,
            &self.periodic_cycles,
            &self.periodic_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub rx_frames_total: u64,
    pub rx_timeouts: u64,
    pub rx_unknown_category: u64,
    pub rx_invalid_length: u64,
    pub rx_malformed: u64,
    pub rx_ignored: u64,
    pub rx_state_updates: u64,
    pub rx_commands: u64,
    pub rx_command_errors: u64,
    pub tx_frames_total: u64,
    pub tx_errors: u64,
    pub tx_timeouts: u64,
    pub bus_restarts: u64,
    pub shell_drops: u64,
    pub periodic_cycles: u64,
    pub periodic_errors: u64,
}

impl MetricsSnapshot {
    /// 被丢弃的入站帧总数（DLC 错误 + 载荷错误）
    pub fn rx_dropped(&self) -> u64 {
        self.rx_invalid_length + self.rx_malformed
    }
}
