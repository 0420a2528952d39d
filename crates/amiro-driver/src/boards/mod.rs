//! 板卡配置
//!
//! 每种板卡把发送/接收角色接到自己的外设上：
//!
//! | 板卡 | 周期广播 | 处理的命令 |
//! |---|---|---|
//! | DiWheelDrive | 实际速度、里程计、地面接近、磁力计、陀螺仪 | 目标速度、设置里程计、目标位置、运动学常数、地面校准 |
//! | PowerManagement | 环形接近、电源状态、机器人编号 | 环形校准 |
//! | LightRing | 无 | LED 颜色、亮度 |

mod di_wheel_drive;
mod light_ring;
mod power_management;

pub use di_wheel_drive::DiWheelDrive;
pub use light_ring::LightRing;
pub use power_management::PowerManagement;

use amiro_protocol::{BoardId, CalibrationGroup, CalibrationStatus, Message};
use tracing::{info, warn};

use crate::error::DriverError;
use crate::peripherals::ProximitySensors;
use crate::transmitter::Transmitter;

/// 逐条发布报告；某条失败不影响其余报告，返回第一个错误
fn publish_reports(
    tx: &Transmitter,
    reports: impl IntoIterator<Item = Result<Message, DriverError>>,
) -> Result<(), DriverError> {
    let mut first_error = None;
    for report in reports {
        let result = report.and_then(|message| tx.publish(&message));
        if let Err(e) = result {
            warn!("TX thread: report skipped: {}", e);
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// 读取一组接近传感器的全部报告
fn proximity_reports(
    sensors: &dyn ProximitySensors,
    limit: usize,
    make: fn(u8, u16) -> Message,
) -> impl Iterator<Item = Result<Message, DriverError>> + '_ {
    (0..sensors.count().min(limit)).map(move |index| {
        sensors
            .read(index)
            .map(|value| make(index as u8, value))
    })
}

/// 执行校准并把结果回复给请求方
fn answer_calibration(
    sensors: &dyn ProximitySensors,
    group: CalibrationGroup,
    requester: BoardId,
    tx: &Transmitter,
) -> Result<bool, DriverError> {
    let status = match sensors.calibrate() {
        Ok(()) => {
            info!("{:?} proximity sensors calibrated for {}", group, requester);
            CalibrationStatus::Ok
        },
        Err(e) => {
            warn!("{:?} proximity calibration failed: {}", group, e);
            CalibrationStatus::Failed
        },
    };

    // 请求方就是本板时无需回复
    if requester.is_broadcast() || requester == tx.local_board() {
        return Ok(true);
    }
    tx.report_calibration(requester, group, status)?;
    Ok(true)
}
