//! 内建序列化格式
//!
//! 三种格式共享同一个序列化契约 `(id, payload, is_fixed_size)`。
//! 完整/微型二进制在写出前做线程名广播检查，文本格式不做。

use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::constants::{
    FRAME_HEADER_SIZE, MAX_FRAME_PAYLOAD, MAX_TEXT_LINE, MICRO_HEADER_SIZE, MICRO_MAX_VAR_PAYLOAD,
    MICRO_SCALE_MASK, MICRO_THREAD_MASK, MICRO_TIME_MAX, SYNC_MAGIC,
};
use crate::hooks;
use crate::logger::{send_thread_name_if_needed, thread_idx};

/// 微型格式的进程级上一帧时间戳。并发发射下增量是近似值。
static LAST_TIMESTAMP_NS: AtomicU64 = AtomicU64::new(0);

/// 纳秒转秒，整数部分单独除避免 f64 精度损失
pub fn nano_to_seconds(ns: u64) -> f64 {
    const TO_NANO: u64 = 1_000_000_000;
    let sec = ns / TO_NANO;
    sec as f64 + (ns - sec * TO_NANO) as f64 / TO_NANO as f64
}

/// 增量纳秒转 (档位, 值)。档位: 0=ns, 1=us, 2=ms, 3=s；值 0-999，999 s 饱和。
pub fn convert_nanoseconds(ns: u64) -> (u8, u16) {
    let mut scale = 0u8;
    let mut value = ns;

    if value >= 1000 {
        value /= 1000;
        scale = 1; // 微秒

        if value >= 1000 {
            value /= 1000;
            scale = 2; // 毫秒

            if value >= 1000 {
                value /= 1000;
                scale = 3; // 秒

                if value > MICRO_TIME_MAX as u64 {
                    value = MICRO_TIME_MAX as u64;
                }
            }
        }
    }

    (scale, value as u16)
}

/// (档位, 值) 还原为纳秒
pub fn micro_delta_ns(scale: u8, value: u16) -> u64 {
    let mut ns = value as u64;
    let mut s = scale;
    while s > 0 {
        ns *= 1000;
        s -= 1;
    }
    ns
}

/// 打包微型帧头
pub fn pack_micro_header(id: u32, thread_id: u8, scale: u8, value: u16) -> u32 {
    (id & 0xFFFF)
        | (((thread_id & MICRO_THREAD_MASK) as u32) << 16)
        | (((scale & MICRO_SCALE_MASK) as u32) << 20)
        | (((value & 0x3FF) as u32) << 22)
}

/// 解包微型帧头: (截断 ID, 线程号, 档位, 值)
pub fn unpack_micro_header(header: u32) -> (u16, u8, u8, u16) {
    (
        (header & 0xFFFF) as u16,
        ((header >> 16) & 0x0F) as u8,
        ((header >> 20) & 0x03) as u8,
        ((header >> 22) & 0x3FF) as u16,
    )
}

/// 完整二进制格式：帧构建在栈缓冲里，单次写出
pub(crate) fn full_binary(id: u32, payload: &[u8], _is_fixed_size: bool) {
    send_thread_name_if_needed();

    let len = payload.len().min(MAX_FRAME_PAYLOAD);
    let mut frame = [0u8; crate::constants::MAX_FRAME_SIZE];
    frame[0..2].copy_from_slice(&SYNC_MAGIC.to_le_bytes());
    frame[2] = len as u8;
    frame[3] = thread_idx() as u8;
    frame[4..8].copy_from_slice(&id.to_le_bytes());
    frame[8..16].copy_from_slice(&hooks::time_now_ns().to_le_bytes());
    frame[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len].copy_from_slice(&payload[..len]);

    hooks::raw_write(&frame[..FRAME_HEADER_SIZE + len]);
}

/// 微型二进制格式：增量时间戳 + 截断 ID
pub(crate) fn micro_binary(id: u32, payload: &[u8], is_fixed_size: bool) {
    send_thread_name_if_needed();

    let now = hooks::time_now_ns();
    let prev = LAST_TIMESTAMP_NS.swap(now, Ordering::AcqRel);
    // 首次发射以及取时间与交换之间被其他线程插队时，增量按 0 处理
    let elapsed = if prev != 0 && now > prev { now - prev } else { 0 };
    let (scale, value) = convert_nanoseconds(elapsed);

    let header = pack_micro_header(id, thread_idx() as u8, scale, value);

    let mut frame = [0u8; MICRO_HEADER_SIZE + 1 + MICRO_MAX_VAR_PAYLOAD];
    frame[0..4].copy_from_slice(&header.to_le_bytes());
    let mut offset = MICRO_HEADER_SIZE;

    let len = if is_fixed_size {
        payload.len().min(MAX_FRAME_PAYLOAD)
    } else {
        payload.len().min(MICRO_MAX_VAR_PAYLOAD)
    };
    if !is_fixed_size {
        // 变长站点在负载前带一个长度字节
        frame[offset] = len as u8;
        offset += 1;
    }
    frame[offset..offset + len].copy_from_slice(&payload[..len]);

    hooks::raw_write(&frame[..offset + len]);
}

/// 定长截断写入器，文本格式用
struct StackWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl fmt::Write for StackWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let n = s.len().min(self.buf.len() - self.len);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

/// 文本格式：`$秒.6位小数,ID 8位十六进制,线程号[,负载hex]\n`
pub(crate) fn text(id: u32, payload: &[u8], _is_fixed_size: bool) {
    let mut buf = [0u8; MAX_TEXT_LINE];
    let mut w = StackWriter {
        buf: &mut buf,
        len: 0,
    };

    let secs = nano_to_seconds(hooks::time_now_ns());
    let _ = write!(w, "${:.6},{:08X},{}", secs, id, thread_idx());
    if !payload.is_empty() {
        let _ = w.write_str(",");
        for b in payload {
            let _ = write!(w, "{:02x}", b);
        }
    }
    let _ = w.write_str("\n");

    let len = w.len;
    hooks::raw_write(&buf[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{MAX_FRAME_SIZE, THREAD_NAME_MSG_ID};
    use crate::logger::{emit, set_serialize_format, SerializeFormat};
    use crate::testutil::{install_capture, settle_thread_state, take_captured, TEST_LOCK};

    #[test]
    fn test_convert_nanoseconds_boundaries() {
        assert_eq!(convert_nanoseconds(0), (0, 0));
        assert_eq!(convert_nanoseconds(999), (0, 999));
        assert_eq!(convert_nanoseconds(1_000), (1, 1));
        assert_eq!(convert_nanoseconds(1_000_000), (2, 1));
        assert_eq!(convert_nanoseconds(1_000_000_000), (3, 1));
        assert_eq!(convert_nanoseconds(999_000_000_000), (3, 999));
        // 999 s 之上饱和
        assert_eq!(convert_nanoseconds(1_500_000_000_000), (3, 999));
        assert_eq!(convert_nanoseconds(u64::MAX), (3, 999));
    }

    #[test]
    fn test_micro_header_roundtrip() {
        let header = pack_micro_header(0xDEADBEEF, 5, 2, 345);
        assert_eq!(unpack_micro_header(header), (0xBEEF, 5, 2, 345));

        // 线程号截断到 4 位，16 折回 0
        let header = pack_micro_header(0x1234, 16, 0, 0);
        assert_eq!(unpack_micro_header(header), (0x1234, 0, 0, 0));
    }

    #[test]
    fn test_micro_delta_ns() {
        assert_eq!(micro_delta_ns(0, 42), 42);
        assert_eq!(micro_delta_ns(1, 42), 42_000);
        assert_eq!(micro_delta_ns(2, 42), 42_000_000);
        assert_eq!(micro_delta_ns(3, 999), 999_000_000_000);
    }

    #[test]
    fn test_nano_to_seconds() {
        assert_eq!(nano_to_seconds(0), 0.0);
        assert_eq!(nano_to_seconds(1_500_000_000), 1.5);
        assert_eq!(
            format!("{:.6}", nano_to_seconds(15_328_834_560_464_000)),
            "15328834.560464"
        );
    }

    #[test]
    fn test_full_binary_frame_layout() {
        let _guard = TEST_LOCK.lock().unwrap();
        crate::hooks::set_time_source(|| 0x0102_0304_0506_0708);
        install_capture();
        set_serialize_format(SerializeFormat::FullBinary);
        settle_thread_state();

        emit(0xCAFEBABE, &[0xAA, 0xBB, 0xCC], true);

        let out = take_captured();
        assert_eq!(out.len(), 16 + 3);
        assert_eq!(&out[0..2], &[0xAF, 0xFA]);
        assert_eq!(out[2], 3);
        assert_eq!(
            u32::from_le_bytes(out[4..8].try_into().unwrap()),
            0xCAFEBABE
        );
        assert_eq!(
            u64::from_le_bytes(out[8..16].try_into().unwrap()),
            0x0102_0304_0506_0708
        );
        assert_eq!(&out[16..], &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_full_binary_truncates_payload() {
        let _guard = TEST_LOCK.lock().unwrap();
        install_capture();
        set_serialize_format(SerializeFormat::FullBinary);
        settle_thread_state();

        let big = [0x55u8; 300];
        emit(1, &big, true);

        let out = take_captured();
        assert_eq!(out.len(), MAX_FRAME_SIZE);
        assert_eq!(out[2], MAX_FRAME_PAYLOAD as u8);
    }

    #[test]
    fn test_full_binary_zero_payload() {
        let _guard = TEST_LOCK.lock().unwrap();
        install_capture();
        set_serialize_format(SerializeFormat::FullBinary);
        settle_thread_state();

        emit(7, &[], true);

        let out = take_captured();
        assert_eq!(out.len(), FRAME_HEADER_SIZE);
        assert_eq!(out[2], 0);
    }

    #[test]
    fn test_micro_binary_variable_length_prefix() {
        let _guard = TEST_LOCK.lock().unwrap();
        install_capture();
        set_serialize_format(SerializeFormat::MicroBinary);
        settle_thread_state();

        emit(0x1234, &[1, 2, 3, 4, 5], false);
        let out = take_captured();
        assert_eq!(out.len(), 4 + 1 + 5);
        assert_eq!(out[4], 5);
        assert_eq!(&out[5..], &[1, 2, 3, 4, 5]);

        emit(0x1234, &[9, 9], true);
        let out = take_captured();
        assert_eq!(out.len(), 4 + 2);
        assert_eq!(&out[4..], &[9, 9]);
    }

    #[test]
    fn test_text_line_shape() {
        let _guard = TEST_LOCK.lock().unwrap();
        crate::hooks::set_time_source(|| 15_328_834_560_464_000);
        install_capture();
        set_serialize_format(SerializeFormat::Text);

        emit(0x0BADF00D, &[], true);
        let out = String::from_utf8(take_captured()).unwrap();
        assert!(out.starts_with("$15328834.560464,0BADF00D,"));
        assert!(out.ends_with('\n'));

        emit(0x0BADF00D, &[0xDE, 0xAD], true);
        let out = String::from_utf8(take_captured()).unwrap();
        assert!(out.trim_end().ends_with(",dead"), "line: {}", out);
    }

    #[test]
    fn test_thread_name_broadcast_precedes_record() {
        let _guard = TEST_LOCK.lock().unwrap();
        crate::hooks::set_thread_name_source(|buf| {
            buf[..4].copy_from_slice(b"main");
            4
        });
        install_capture();
        set_serialize_format(SerializeFormat::FullBinary);
        settle_thread_state();
        crate::logger::request_thread_name_broadcast();

        emit(0x11223344, &[], true);
        let out = take_captured();

        // 两帧：线程名 + 本记录
        assert_eq!(out.len(), 16 + 4 + 16);
        assert_eq!(
            u32::from_le_bytes(out[4..8].try_into().unwrap()),
            THREAD_NAME_MSG_ID
        );
        assert_eq!(&out[16..20], b"main");
        assert_eq!(
            u32::from_le_bytes(out[20 + 4..20 + 8].try_into().unwrap()),
            0x11223344
        );

        // 没有新的广播请求就不再重发
        emit(0x11223344, &[], true);
        let out = take_captured();
        assert_eq!(out.len(), 16);
    }
}
