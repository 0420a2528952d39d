//! `Message` 与 `AmiroFrame` 之间的编解码
//!
//! 每个类别的载荷布局（大端）：
//!
//! | 类别 | 字节 |
//! |---|---|
//! | ShellQuery / ShellReply | 原始字节 1..=8 |
//! | ShellSwitch | [目标板卡] |
//! | LightColor | [R, G, B] |
//! | LightBrightness | [百分比] |
//! | Shutdown | [魔数 u16] |
//! | RobotId | [id] |
//! | ProximityRing / ProximityFloor | [值 u16] |
//! | ActualSpeed / TargetSpeed | [v i32][w i32] |
//! | Odometry / SetOdometry | [x>>10 i24][y>>10 i24][f_z>>8 i16] |
//! | PowerStatus | [flags][soc][minutes u16][mW u16] |
//! | Magnetometer / Gyroscope | [x i16][y i16][z i16] |
//! | TargetPosition | [x>>10 i16][y>>10 i16][f_z>>8 i16][deadline u16] |
//! | KinematicConstants | [Ed f32][Eb f32] |
//! | Calibrate | [请求方板卡] |
//! | CalibrationDone | [状态] |

use crate::category::{Addressing, Category};
use crate::constants::{
    MAX_BRIGHTNESS, MAX_ORIENTATION_URAD, ORIENTATION_SHIFT, POSITION_SHIFT, SHUTDOWN_MAGIC,
};
use crate::ids::{BoardId, IdLayout};
use crate::messages::*;
use crate::{
    AmiroFrame, ProtocolError, bytes_to_i16_be, bytes_to_i24_be, bytes_to_i32_be,
    bytes_to_u16_be, i16_to_bytes_be, i24_to_bytes_be, i32_to_bytes_be, u16_to_bytes_be,
};

/// 按类别区分的消息（载荷的和类型）
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    /// 控制台持有者 -> 目标板卡的 shell 输入
    ShellQuery { from: BoardId, chunk: ShellChunk },
    /// 目标板卡 -> 控制台持有者的 shell 输出
    ShellReply { from: BoardId, chunk: ShellChunk },
    /// 切换当前连接的 shell（0 = 本地）
    ShellSwitch { target: BoardId },
    LightColor { index: u8, color: Color },
    LightBrightness(u8),
    Shutdown,
    RobotId(u8),
    ProximityRing { index: u8, value: u16 },
    ProximityFloor { index: u8, value: u16 },
    ActualSpeed(KinematicVelocity),
    TargetSpeed(KinematicVelocity),
    Odometry(Position),
    SetOdometry(Position),
    PowerStatus(PowerStatus),
    Magnetometer(Axes3),
    Gyroscope(Axes3),
    TargetPosition(TargetPosition),
    KinematicConstants(KinematicConstants),
    Calibrate {
        group: CalibrationGroup,
        requester: BoardId,
    },
    CalibrationDone {
        group: CalibrationGroup,
        status: CalibrationStatus,
    },
}

impl Message {
    pub fn category(&self) -> Category {
        match self {
            Message::ShellQuery { .. } => Category::ShellQuery,
            Message::ShellReply { .. } => Category::ShellReply,
            Message::ShellSwitch { .. } => Category::ShellSwitch,
            Message::LightColor { .. } => Category::LightColor,
            Message::LightBrightness(_) => Category::LightBrightness,
            Message::Shutdown => Category::Shutdown,
            Message::RobotId(_) => Category::RobotId,
            Message::ProximityRing { .. } => Category::ProximityRing,
            Message::ProximityFloor { .. } => Category::ProximityFloor,
            Message::ActualSpeed(_) => Category::ActualSpeed,
            Message::TargetSpeed(_) => Category::TargetSpeed,
            Message::Odometry(_) => Category::Odometry,
            Message::SetOdometry(_) => Category::SetOdometry,
            Message::PowerStatus(_) => Category::PowerStatus,
            Message::Magnetometer(_) => Category::Magnetometer,
            Message::Gyroscope(_) => Category::Gyroscope,
            Message::TargetPosition(_) => Category::TargetPosition,
            Message::KinematicConstants(_) => Category::KinematicConstants,
            Message::Calibrate { .. } => Category::Calibrate,
            Message::CalibrationDone { .. } => Category::CalibrationDone,
        }
    }

    /// ID 中的索引字段
    pub fn index(&self) -> u8 {
        match self {
            Message::ShellQuery { from, .. } | Message::ShellReply { from, .. } => from.raw(),
            Message::LightColor { index, .. }
            | Message::ProximityRing { index, .. }
            | Message::ProximityFloor { index, .. } => *index,
            Message::Calibrate { group, .. } | Message::CalibrationDone { group, .. } => {
                u8::from(*group)
            },
            _ => 0,
        }
    }
}

/// 解码结果：(类别, 板卡, 索引, 值) 中类别和索引由 `message` 导出
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    /// ID 中的板卡字段，含义由类别的寻址方式决定
    pub board: BoardId,
    pub message: Message,
}

impl Envelope {
    pub fn new(board: BoardId, message: Message) -> Self {
        Self { board, message }
    }

    pub fn category(&self) -> Category {
        self.message.category()
    }

    pub fn index(&self) -> u8 {
        self.message.index()
    }
}

/// 帧编解码器
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec {
    layout: IdLayout,
}

impl FrameCodec {
    pub fn new(layout: IdLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &IdLayout {
        &self.layout
    }

    /// 编码一条消息
    ///
    /// 值超出类别声明范围时返回错误，不做静默截断。
    pub fn encode(&self, board: BoardId, message: &Message) -> Result<AmiroFrame, ProtocolError> {
        let category = message.category();
        if category.addressing() == Addressing::Broadcast && !board.is_broadcast() {
            return Err(ProtocolError::InvalidAddress {
                category,
                board: board.raw(),
            });
        }

        let index = message.index();
        let max = category.max_index().min(self.layout.max_index());
        if index > max {
            return Err(ProtocolError::IndexOutOfRange {
                category,
                index,
                max,
            });
        }

        let mut buf = [0u8; 8];
        let len = encode_payload(message, &mut buf)?;
        let id = self.layout.compose(category.code(), board, index)?;

        Ok(if self.layout.is_extended() {
            AmiroFrame::new_extended(id, &buf[..len])
        } else {
            AmiroFrame::new_standard(id as u16, &buf[..len])
        })
    }

    /// 解码一帧
    ///
    /// - 帧格式与布局不符、保留位非零、类别未知 -> `UnknownCategory`
    /// - DLC 不符 -> `InvalidLength`
    /// - 关机魔数不符 -> `InvalidMagic`
    pub fn decode(&self, frame: &AmiroFrame) -> Result<Envelope, ProtocolError> {
        let unknown = ProtocolError::UnknownCategory { id: frame.id };
        if frame.is_extended != self.layout.is_extended() {
            return Err(unknown);
        }
        let fields = self.layout.split(frame.id).ok_or(unknown.clone())?;
        let category = Category::try_from(fields.category_code).map_err(|_| unknown)?;

        let expected = category.dlc();
        if !expected.accepts(frame.len) {
            return Err(ProtocolError::InvalidLength {
                category,
                expected,
                actual: frame.len as usize,
            });
        }

        if fields.index > category.max_index() {
            return Err(ProtocolError::IndexOutOfRange {
                category,
                index: fields.index,
                max: category.max_index(),
            });
        }

        let message = decode_payload(category, fields.index, frame.data_slice())?;
        Ok(Envelope::new(fields.board, message))
    }
}

fn check_orientation(f_z_urad: i32) -> Result<(), ProtocolError> {
    if !(0..=MAX_ORIENTATION_URAD).contains(&f_z_urad) {
        return Err(ProtocolError::OutOfRange {
            field: "f_z_urad",
            value: f_z_urad as i64,
        });
    }
    Ok(())
}

/// 朝向 ÷256 并限制在 i16 范围内
fn encode_orientation(f_z_urad: i32) -> Result<[u8; 2], ProtocolError> {
    check_orientation(f_z_urad)?;
    let scaled = (f_z_urad >> ORIENTATION_SHIFT).clamp(i16::MIN as i32, i16::MAX as i32);
    Ok(i16_to_bytes_be(scaled as i16))
}

/// 解码后同样校验范围，越界朝向不能进入状态缓存
fn decode_orientation(bytes: [u8; 2]) -> Result<i32, ProtocolError> {
    let f_z_urad = (bytes_to_i16_be(bytes) as i32) << ORIENTATION_SHIFT;
    check_orientation(f_z_urad)?;
    Ok(f_z_urad)
}

/// 目标位置的 x/y 只有 16 位（÷1024 后约 ±33 m）
fn encode_short_position(field: &'static str, value_um: i32) -> Result<[u8; 2], ProtocolError> {
    let scaled = value_um >> POSITION_SHIFT;
    let short = i16::try_from(scaled).map_err(|_| ProtocolError::OutOfRange {
        field,
        value: value_um as i64,
    })?;
    Ok(i16_to_bytes_be(short))
}

fn encode_odometry(position: &Position, buf: &mut [u8; 8]) -> Result<usize, ProtocolError> {
    let f_z = encode_orientation(position.f_z_urad)?;
    // i32 右移 10 位后最多 22 位，一定放得进 24 位字段
    buf[0..3].copy_from_slice(&i24_to_bytes_be(position.x_um >> POSITION_SHIFT));
    buf[3..6].copy_from_slice(&i24_to_bytes_be(position.y_um >> POSITION_SHIFT));
    buf[6..8].copy_from_slice(&f_z);
    Ok(8)
}

fn decode_odometry(data: &[u8]) -> Result<Position, ProtocolError> {
    Ok(Position {
        x_um: bytes_to_i24_be([data[0], data[1], data[2]]) << POSITION_SHIFT,
        y_um: bytes_to_i24_be([data[3], data[4], data[5]]) << POSITION_SHIFT,
        f_z_urad: decode_orientation([data[6], data[7]])?,
    })
}

fn encode_velocity(velocity: &KinematicVelocity, buf: &mut [u8; 8]) -> usize {
    buf[0..4].copy_from_slice(&i32_to_bytes_be(velocity.v_um_s));
    buf[4..8].copy_from_slice(&i32_to_bytes_be(velocity.w_urad_s));
    8
}

fn decode_velocity(data: &[u8]) -> KinematicVelocity {
    KinematicVelocity {
        v_um_s: bytes_to_i32_be([data[0], data[1], data[2], data[3]]),
        w_urad_s: bytes_to_i32_be([data[4], data[5], data[6], data[7]]),
    }
}

fn encode_axes(axes: &Axes3, buf: &mut [u8; 8]) -> usize {
    buf[0..2].copy_from_slice(&i16_to_bytes_be(axes.x));
    buf[2..4].copy_from_slice(&i16_to_bytes_be(axes.y));
    buf[4..6].copy_from_slice(&i16_to_bytes_be(axes.z));
    6
}

fn decode_axes(data: &[u8]) -> Axes3 {
    Axes3 {
        x: bytes_to_i16_be([data[0], data[1]]),
        y: bytes_to_i16_be([data[2], data[3]]),
        z: bytes_to_i16_be([data[4], data[5]]),
    }
}

/// 写入载荷，返回 DLC
fn encode_payload(message: &Message, buf: &mut [u8; 8]) -> Result<usize, ProtocolError> {
    let len = match message {
        Message::ShellQuery { chunk, .. } | Message::ShellReply { chunk, .. } => {
            let bytes = chunk.as_bytes();
            buf[..bytes.len()].copy_from_slice(bytes);
            bytes.len()
        },
        Message::ShellSwitch { target } => {
            buf[0] = target.raw();
            1
        },
        Message::LightColor { color, .. } => {
            buf[0] = color.r;
            buf[1] = color.g;
            buf[2] = color.b;
            3
        },
        Message::LightBrightness(percent) => {
            if *percent > MAX_BRIGHTNESS {
                return Err(ProtocolError::OutOfRange {
                    field: "brightness",
                    value: *percent as i64,
                });
            }
            buf[0] = *percent;
            1
        },
        Message::Shutdown => {
            buf[0..2].copy_from_slice(&u16_to_bytes_be(SHUTDOWN_MAGIC));
            2
        },
        Message::RobotId(id) => {
            buf[0] = *id;
            1
        },
        Message::ProximityRing { value, .. } | Message::ProximityFloor { value, .. } => {
            buf[0..2].copy_from_slice(&u16_to_bytes_be(*value));
            2
        },
        Message::ActualSpeed(velocity) | Message::TargetSpeed(velocity) => {
            encode_velocity(velocity, buf)
        },
        Message::Odometry(position) | Message::SetOdometry(position) => {
            encode_odometry(position, buf)?
        },
        Message::PowerStatus(status) => {
            buf[0] = status.flags.to_byte();
            buf[1] = status.state_of_charge;
            buf[2..4].copy_from_slice(&u16_to_bytes_be(status.minutes_remaining));
            buf[4..6].copy_from_slice(&u16_to_bytes_be(status.power_consumption_mw));
            6
        },
        Message::Magnetometer(axes) | Message::Gyroscope(axes) => encode_axes(axes, buf),
        Message::TargetPosition(target) => {
            let position = &target.position;
            let f_z = encode_orientation(position.f_z_urad)?;
            buf[0..2].copy_from_slice(&encode_short_position("x_um", position.x_um)?);
            buf[2..4].copy_from_slice(&encode_short_position("y_um", position.y_um)?);
            buf[4..6].copy_from_slice(&f_z);
            buf[6..8].copy_from_slice(&u16_to_bytes_be(target.deadline_ms));
            8
        },
        Message::KinematicConstants(constants) => {
            buf[0..4].copy_from_slice(&constants.ed.to_bits().to_be_bytes());
            buf[4..8].copy_from_slice(&constants.eb.to_bits().to_be_bytes());
            8
        },
        Message::Calibrate { requester, .. } => {
            buf[0] = requester.raw();
            1
        },
        Message::CalibrationDone { status, .. } => {
            buf[0] = u8::from(*status);
            1
        },
    };
    Ok(len)
}

/// 解析载荷（DLC 已由调用方校验）
fn decode_payload(category: Category, index: u8, data: &[u8]) -> Result<Message, ProtocolError> {
    let message = match category {
        Category::ShellQuery => Message::ShellQuery {
            from: BoardId(index),
            chunk: ShellChunk::new(data)?,
        },
        Category::ShellReply => Message::ShellReply {
            from: BoardId(index),
            chunk: ShellChunk::new(data)?,
        },
        Category::ShellSwitch => Message::ShellSwitch {
            target: BoardId(data[0]),
        },
        Category::LightColor => Message::LightColor {
            index,
            color: Color::rgb(data[0], data[1], data[2]),
        },
        Category::LightBrightness => {
            if data[0] > MAX_BRIGHTNESS {
                return Err(ProtocolError::InvalidValue {
                    field: "brightness",
                    value: data[0],
                });
            }
            Message::LightBrightness(data[0])
        },
        Category::Shutdown => {
            let magic = bytes_to_u16_be([data[0], data[1]]);
            if magic != SHUTDOWN_MAGIC {
                return Err(ProtocolError::InvalidMagic { actual: magic });
            }
            Message::Shutdown
        },
        Category::RobotId => Message::RobotId(data[0]),
        Category::ProximityRing => Message::ProximityRing {
            index,
            value: bytes_to_u16_be([data[0], data[1]]),
        },
        Category::ProximityFloor => Message::ProximityFloor {
            index,
            value: bytes_to_u16_be([data[0], data[1]]),
        },
        Category::ActualSpeed => Message::ActualSpeed(decode_velocity(data)),
        Category::TargetSpeed => Message::TargetSpeed(decode_velocity(data)),
        Category::Odometry => Message::Odometry(decode_odometry(data)?),
        Category::SetOdometry => Message::SetOdometry(decode_odometry(data)?),
        Category::PowerStatus => Message::PowerStatus(PowerStatus {
            flags: ChargingFlags::from_byte(data[0]),
            state_of_charge: data[1],
            minutes_remaining: bytes_to_u16_be([data[2], data[3]]),
            power_consumption_mw: bytes_to_u16_be([data[4], data[5]]),
        }),
        Category::Magnetometer => Message::Magnetometer(decode_axes(data)),
        Category::Gyroscope => Message::Gyroscope(decode_axes(data)),
        Category::TargetPosition => Message::TargetPosition(TargetPosition {
            position: Position {
                x_um: (bytes_to_i16_be([data[0], data[1]]) as i32) << POSITION_SHIFT,
                y_um: (bytes_to_i16_be([data[2], data[3]]) as i32) << POSITION_SHIFT,
                f_z_urad: decode_orientation([data[4], data[5]])?,
            },
            deadline_ms: bytes_to_u16_be([data[6], data[7]]),
        }),
        Category::KinematicConstants => Message::KinematicConstants(KinematicConstants {
            ed: f32::from_bits(u32::from_be_bytes([data[0], data[1], data[2], data[3]])),
            eb: f32::from_bits(u32::from_be_bytes([data[4], data[5], data[6], data[7]])),
        }),
        Category::Calibrate => Message::Calibrate {
            group: calibration_group(index)?,
            requester: BoardId(data[0]),
        },
        Category::CalibrationDone => Message::CalibrationDone {
            group: calibration_group(index)?,
            status: CalibrationStatus::try_from(data[0]).map_err(|_| {
                ProtocolError::InvalidValue {
                    field: "calibration_status",
                    value: data[0],
                }
            })?,
        },
    };
    Ok(message)
}

fn calibration_group(index: u8) -> Result<CalibrationGroup, ProtocolError> {
    CalibrationGroup::try_from(index).map_err(|_| ProtocolError::InvalidValue {
        field: "calibration_group",
        value: index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> FrameCodec {
        FrameCodec::default()
    }

    #[test]
    fn test_odometry_scale() {
        let message = Message::Odometry(Position::new(1024, -2048, 0));
        let frame = codec().encode(BoardId::DI_WHEEL_DRIVE, &message).unwrap();

        // 载荷中的数值为 (1, -2)
        assert_eq!(bytes_to_i24_be([frame.data[0], frame.data[1], frame.data[2]]), 1);
        assert_eq!(bytes_to_i24_be([frame.data[3], frame.data[4], frame.data[5]]), -2);

        let decoded = codec().decode(&frame).unwrap();
        assert_eq!(decoded.message, message);
        assert_eq!(decoded.board, BoardId::DI_WHEEL_DRIVE);
    }

    #[test]
    fn test_odometry_truncates_below_scale() {
        let frame = codec()
            .encode(BoardId::DI_WHEEL_DRIVE, &Message::Odometry(Position::new(1500, 0, 1000)))
            .unwrap();
        let decoded = codec().decode(&frame).unwrap();
        assert_eq!(decoded.message, Message::Odometry(Position::new(1024, 0, 768)));
    }

    #[test]
    fn test_orientation_out_of_range_is_rejected() {
        for f_z in [-1, MAX_ORIENTATION_URAD + 1, i32::MAX] {
            let err = codec()
                .encode(BoardId::DI_WHEEL_DRIVE, &Message::SetOdometry(Position::new(0, 0, f_z)))
                .unwrap_err();
            assert!(matches!(err, ProtocolError::OutOfRange { field: "f_z_urad", .. }));
        }
    }

    #[test]
    fn test_decode_rejects_out_of_range_orientation() {
        let c = codec();
        let id = |category: Category, board: BoardId| {
            IdLayout::STANDARD.compose(category.code(), board, 0).unwrap() as u16
        };
        // -1 << 8 = -256
        let negative = AmiroFrame::new_standard(
            id(Category::SetOdometry, BoardId::BROADCAST),
            &[0, 0, 0, 0, 0, 0, 0xFF, 0xFF],
        );
        assert!(matches!(
            c.decode(&negative),
            Err(ProtocolError::OutOfRange { field: "f_z_urad", value: -256 })
        ));

        // i16::MAX << 8 超过 2π
        let too_large = AmiroFrame::new_standard(
            id(Category::Odometry, BoardId::DI_WHEEL_DRIVE),
            &[0, 0, 0, 0, 0, 0, 0x7F, 0xFF],
        );
        assert!(matches!(
            c.decode(&too_large),
            Err(ProtocolError::OutOfRange { field: "f_z_urad", .. })
        ));

        let target = AmiroFrame::new_standard(
            id(Category::TargetPosition, BoardId::BROADCAST),
            &[0, 0, 0, 0, 0x80, 0x00, 0, 100],
        );
        assert!(matches!(
            c.decode(&target),
            Err(ProtocolError::OutOfRange { field: "f_z_urad", .. })
        ));
    }

    #[test]
    fn test_orientation_upper_bound_fits_i16() {
        let message = Message::Odometry(Position::new(0, 0, MAX_ORIENTATION_URAD));
        let frame = codec().encode(BoardId::DI_WHEEL_DRIVE, &message).unwrap();
        let raw = bytes_to_i16_be([frame.data[6], frame.data[7]]);
        assert_eq!(raw as i32, MAX_ORIENTATION_URAD >> ORIENTATION_SHIFT);
    }

    #[test]
    fn test_shutdown_frame_layout() {
        let frame = codec().encode(BoardId::BROADCAST, &Message::Shutdown).unwrap();
        assert_eq!(frame.id, (Category::Shutdown.code() as u32) << 6);
        assert_eq!(frame.data_slice(), &[0xAA, 0x55]);
    }

    #[test]
    fn test_shutdown_wrong_magic() {
        let id = IdLayout::STANDARD.compose(Category::Shutdown.code(), BoardId(0), 0).unwrap();
        let frame = AmiroFrame::new_standard(id as u16, &[0x55, 0xAA]);
        assert_eq!(
            codec().decode(&frame).unwrap_err(),
            ProtocolError::InvalidMagic { actual: 0x55AA }
        );
    }

    #[test]
    fn test_broadcast_category_requires_broadcast_board() {
        let err = codec().encode(BoardId::LIGHT_RING, &Message::Shutdown).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidAddress { .. }));
    }

    #[test]
    fn test_wrong_dlc_is_protocol_error() {
        let id = IdLayout::STANDARD
            .compose(Category::ActualSpeed.code(), BoardId::DI_WHEEL_DRIVE, 0)
            .unwrap();
        let frame = AmiroFrame::new_standard(id as u16, &[0; 7]);
        let err = codec().decode(&frame).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidLength { category: Category::ActualSpeed, actual: 7, .. }
        ));
    }

    #[test]
    fn test_unknown_category() {
        // 0x1F 没有对应类别
        let id = IdLayout::STANDARD.compose(0x1F, BoardId(1), 0).unwrap();
        let frame = AmiroFrame::new_standard(id as u16, &[0; 8]);
        assert_eq!(
            codec().decode(&frame).unwrap_err(),
            ProtocolError::UnknownCategory { id }
        );
    }

    #[test]
    fn test_extended_frame_on_standard_layout_is_foreign() {
        let frame = AmiroFrame::new_extended(0x0000_0100, &[0; 2]);
        assert!(matches!(
            codec().decode(&frame),
            Err(ProtocolError::UnknownCategory { .. })
        ));
    }

    #[test]
    fn test_light_color_index_range() {
        let ok = Message::LightColor {
            index: 7,
            color: Color::RED,
        };
        assert!(codec().encode(BoardId::LIGHT_RING, &ok).is_ok());

        let bad = Message::LightColor {
            index: 8,
            color: Color::RED,
        };
        assert!(matches!(
            codec().encode(BoardId::LIGHT_RING, &bad),
            Err(ProtocolError::IndexOutOfRange { index: 8, max: 7, .. })
        ));
    }

    #[test]
    fn test_brightness_range() {
        assert!(codec().encode(BoardId::LIGHT_RING, &Message::LightBrightness(100)).is_ok());
        assert!(codec().encode(BoardId::LIGHT_RING, &Message::LightBrightness(101)).is_err());
    }

    #[test]
    fn test_target_position_range() {
        let far = TargetPosition {
            position: Position::new(40_000_000, 0, 0),
            deadline_ms: 1000,
        };
        assert!(matches!(
            codec().encode(BoardId::DI_WHEEL_DRIVE, &Message::TargetPosition(far)),
            Err(ProtocolError::OutOfRange { field: "x_um", .. })
        ));
    }

    #[test]
    fn test_shell_query_carries_source_in_index() {
        let message = Message::ShellQuery {
            from: BoardId::DI_WHEEL_DRIVE,
            chunk: ShellChunk::new(b"ls\r").unwrap(),
        };
        let frame = codec().encode(BoardId::POWER_MANAGEMENT, &message).unwrap();
        assert_eq!(frame.len, 3);

        let envelope = codec().decode(&frame).unwrap();
        assert_eq!(envelope.board, BoardId::POWER_MANAGEMENT);
        assert_eq!(envelope.index(), 1);
        assert_eq!(envelope.message, message);
    }

    #[test]
    fn test_calibration_done_rejects_unknown_status() {
        let id = IdLayout::STANDARD
            .compose(Category::CalibrationDone.code(), BoardId(1), 0)
            .unwrap();
        let frame = AmiroFrame::new_standard(id as u16, &[7]);
        assert!(matches!(
            codec().decode(&frame),
            Err(ProtocolError::InvalidValue { field: "calibration_status", value: 7 })
        ));
    }

    #[test]
    fn test_extended_layout_roundtrip() {
        let codec = FrameCodec::new(IdLayout::EXTENDED);
        let message = Message::ProximityRing {
            index: 5,
            value: 0xBEEF,
        };
        let frame = codec.encode(BoardId(200), &message).unwrap();
        assert!(frame.is_extended);
        let envelope = codec.decode(&frame).unwrap();
        assert_eq!(envelope, Envelope::new(BoardId(200), message));
    }
}
