//! picolog - 嵌入式精简结构化日志运行时
//!
//! 特性：
//! - 编译期站点 ID：`crc32("文件:行号")` 在编译期折叠为常量
//! - 线上只传 ID + 原始负载字节，消息文本留在构建期元数据里
//! - 三种序列化格式：完整二进制 / 微型二进制 / 文本
//! - 无锁环形缓冲作为无背压的发射端传输缓冲
//!
//! 完整二进制帧格式：
//! ```text
//! ┌──────┬─────────────┬───────────┬───────┬──────────────┬──────────┐
//! │ SYNC │ payload_len │ thread_id │ id    │ timestamp_ns │ payload  │
//! │ 2B   │ 1B          │ 1B        │ 4B LE │ 8B LE        │ N bytes  │
//! └──────┴─────────────┴───────────┴───────┴──────────────┴──────────┘
//! ```
//!
//! 微型二进制帧格式（32 位打包头）：
//! ```text
//! ┌──────────────┬───────────┬────────────┬────────────┬───────────┐
//! │ truncated_id │ thread_id │ time_scale │ time_value │ [payload] │
//! │ bit 0-15     │ bit 16-19 │ bit 20-21  │ bit 22-31  │           │
//! └──────────────┴───────────┴────────────┴────────────┴───────────┘
//! ```
//! 变长站点（数组）在负载前多一个长度字节；时间是相对上一帧的增量，
//! 按 ns/us/ms/s 四档取最小可表示单位，999 s 饱和。

pub mod constants;
pub mod crc;
pub mod hooks;
pub mod level;
pub mod logger;
pub mod payload;
pub mod ring;
pub mod serialize;
pub mod transport;

mod macros;

#[doc(hidden)]
pub use macros::__emit_array;

#[cfg(test)]
mod testutil;

pub use constants::{MAX_FRAME_PAYLOAD, THREAD_NAME_MSG_ID};
pub use crc::crc32;
pub use logger::{
    emit, get_level, get_serialize_format, request_thread_name_broadcast, set_level,
    set_serialize_format, SerializeFn, SerializeFormat,
};
pub use payload::Payload;
pub use ring::{LockFreeRingBuffer, ReadRegion, RingOverflow, RingReader};
