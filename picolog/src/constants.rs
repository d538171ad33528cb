//! 常量定义
//!
//! 线缆格式的各种常量和位域布局

/// 完整二进制帧同步字节 - 用于定位帧边界
pub const SYNC_MAGIC: u16 = 0xFAAF;
/// 完整二进制帧头大小 (SYNC + Len + Thread + Id + Timestamp)
pub const FRAME_HEADER_SIZE: usize = 2 + 1 + 1 + 4 + 8;
/// 单帧最大大小
pub const MAX_FRAME_SIZE: usize = 256;
/// 单帧最大负载
pub const MAX_FRAME_PAYLOAD: usize = MAX_FRAME_SIZE - FRAME_HEADER_SIZE;

/// 微型帧头大小（32 位打包）
pub const MICRO_HEADER_SIZE: usize = 4;
/// 微型格式变长负载的最大长度（单个长度字节）
pub const MICRO_MAX_VAR_PAYLOAD: usize = 255;
/// 微型格式线程号位宽为 4，超出的线程号截断到低 4 位
pub const MICRO_THREAD_MASK: u8 = 0x0F;
/// 微型格式时间档位: 0=ns, 1=us, 2=ms, 3=s
pub const MICRO_SCALE_MASK: u8 = 0x03;
/// 微型格式时间值上限 (10 bit, 0-999)
pub const MICRO_TIME_MAX: u16 = 999;

/// 保留 ID：线程名广播记录，扫描器拒绝生成此 ID 的用户站点
pub const THREAD_NAME_MSG_ID: u32 = 0xFFFF_FF00;
/// 线程名缓冲长度（对齐 pthread 的 16 字节惯例）
pub const THREAD_NAME_LEN: usize = 16;

/// 文本格式单行最大长度
pub const MAX_TEXT_LINE: usize = 256;
