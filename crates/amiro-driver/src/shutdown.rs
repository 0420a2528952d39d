//! 关机信号
//!
//! 总线上的关机广播只负责置位；真正的断电流程（保存状态、关闭外设）
//! 由持有 [`ShutdownSupervisor`] 的上层循环执行。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct ShutdownState {
    requested: AtomicBool,
    lock: Mutex<()>,
    wakeup: Condvar,
}

/// 关机请求句柄（接收线程持有，用于置位）
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    state: Arc<ShutdownState>,
}

impl ShutdownSignal {
    /// 置位并唤醒所有等待者；重复调用无副作用
    pub fn request(&self) {
        let _guard = self.state.lock.lock();
        self.state.requested.store(true, Ordering::Release);
        self.state.wakeup.notify_all();
    }

    pub fn is_requested(&self) -> bool {
        self.state.requested.load(Ordering::Acquire)
    }
}

/// 关机标志的所有者
///
/// ```rust
/// use amiro_driver::ShutdownSupervisor;
/// use std::time::Duration;
///
/// let supervisor = ShutdownSupervisor::new();
/// let signal = supervisor.signal();
/// std::thread::spawn(move || signal.request());
/// assert!(supervisor.wait(Duration::from_secs(1)));
/// ```
#[derive(Debug, Default)]
pub struct ShutdownSupervisor {
    state: Arc<ShutdownState>,
}

impl ShutdownSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取置位句柄
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            state: self.state.clone(),
        }
    }

    pub fn is_requested(&self) -> bool {
        self.state.requested.load(Ordering::Acquire)
    }

    /// 等待关机请求，返回是否已请求（超时返回 `false`）
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.state.lock.lock();
        while !self.is_requested() {
            if self.state.wakeup.wait_until(&mut guard, deadline).timed_out() {
                return self.is_requested();
            }
        }
        true
    }

    /// 清除请求（断电流程被取消时使用）
    pub fn clear(&self) {
        self.state.requested.store(false, Ordering::Release);
    }
}
