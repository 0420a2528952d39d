//! 协议常量定义

/// 关机广播的魔数（2 字节，大端）
pub const SHUTDOWN_MAGIC: u16 = 0xAA55;

/// 里程计 x/y 发送前右移的位数（÷1024）
pub const POSITION_SHIFT: u32 = 10;

/// 朝向 f_z 发送前右移的位数（÷256）
pub const ORIENTATION_SHIFT: u32 = 8;

/// 合法朝向上限：2π × 10⁶ 微弧度
pub const MAX_ORIENTATION_URAD: i32 = 6_283_185;

/// 环形接近传感器数量（PowerManagement）
pub const NUM_RING_SENSORS: usize = 8;

/// 地面接近传感器数量（DiWheelDrive）
pub const NUM_FLOOR_SENSORS: usize = 4;

/// LightRing 上的 LED 数量
pub const NUM_LEDS: usize = 8;

/// 亮度上限（百分比）
pub const MAX_BRIGHTNESS: u8 = 100;

/// 单帧最多携带的 shell 字节数
pub const SHELL_CHUNK_MAX: usize = 8;

/// 标准帧 ID 位宽
pub const STANDARD_ID_BITS: u32 = 11;

/// 扩展帧 ID 位宽
pub const EXTENDED_ID_BITS: u32 = 29;
