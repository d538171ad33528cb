//! 站点宏家族
//!
//! 与 C 端宏保持同一套名字和参数顺序，扫描器用一套语法同时覆盖
//! `LOG(...)` 和 `LOG!(...)` 两种拼写。站点 ID 是
//! `crc32("文件:行号")` 的编译期常量；等级门限在编码负载之前判断。
//! `name` / `msg` 参数只为扫描器存在，运行时不携带。

/// 站点 ID：当前调用位置的 `crc32("file:line")` 常量
#[doc(hidden)]
#[macro_export]
macro_rules! __site_id {
    () => {
        $crate::crc::crc32(::core::concat!(::core::file!(), ":", ::core::line!()).as_bytes())
    };
}

/// 纯消息站点
#[macro_export]
macro_rules! LOG {
    ($level:expr, $msg:expr) => {{
        const __PICOLOG_ID: u32 = $crate::__site_id!();
        let _: &str = $msg;
        if ($level) >= $crate::get_level() {
            $crate::emit(__PICOLOG_ID, &[], true);
        }
    }};
}

/// 纯消息站点，显式 ID
#[macro_export]
macro_rules! LOG_ID {
    ($id:expr, $level:expr, $msg:expr) => {{
        const __PICOLOG_ID: u32 = $id;
        let _: &str = $msg;
        if ($level) >= $crate::get_level() {
            $crate::emit(__PICOLOG_ID, &[], true);
        }
    }};
}

/// 记录一个定长值
#[macro_export]
macro_rules! RECORD_VALUE {
    ($level:expr, $name:expr, $ty:ty, $value:expr) => {{
        const __PICOLOG_ID: u32 = $crate::__site_id!();
        let _: &str = $name;
        if ($level) >= $crate::get_level() {
            let __v: &$ty = &$value;
            let mut __buf = [0u8; <$ty as $crate::Payload>::SIZE];
            $crate::Payload::encode(__v, &mut __buf);
            $crate::emit(__PICOLOG_ID, &__buf, true);
        }
    }};
}

/// 记录一个定长值，显式 ID
#[macro_export]
macro_rules! RECORD_VALUE_ID {
    ($id:expr, $level:expr, $name:expr, $ty:ty, $value:expr) => {{
        const __PICOLOG_ID: u32 = $id;
        let _: &str = $name;
        if ($level) >= $crate::get_level() {
            let __v: &$ty = &$value;
            let mut __buf = [0u8; <$ty as $crate::Payload>::SIZE];
            $crate::Payload::encode(__v, &mut __buf);
            $crate::emit(__PICOLOG_ID, &__buf, true);
        }
    }};
}

/// 记录一个定长值并带消息模板（`${NAME}` 由解码端替换）
#[macro_export]
macro_rules! RECORD_AND_LOG_VALUE {
    ($level:expr, $name:expr, $ty:ty, $value:expr, $msg:expr) => {{
        const __PICOLOG_ID: u32 = $crate::__site_id!();
        let _: (&str, &str) = ($name, $msg);
        if ($level) >= $crate::get_level() {
            let __v: &$ty = &$value;
            let mut __buf = [0u8; <$ty as $crate::Payload>::SIZE];
            $crate::Payload::encode(__v, &mut __buf);
            $crate::emit(__PICOLOG_ID, &__buf, true);
        }
    }};
}

/// 记录一个变长数组
#[macro_export]
macro_rules! RECORD_VALUE_ARRAY {
    ($level:expr, $name:expr, $ty:ty, $values:expr, $count:expr) => {{
        const __PICOLOG_ID: u32 = $crate::__site_id!();
        let _: &str = $name;
        if ($level) >= $crate::get_level() {
            $crate::__emit_array::<$ty>(__PICOLOG_ID, &$values[..], $count);
        }
    }};
}

/// 记录一个变长数组并带消息模板
#[macro_export]
macro_rules! RECORD_AND_LOG_VALUE_ARRAY {
    ($level:expr, $name:expr, $ty:ty, $values:expr, $count:expr, $msg:expr) => {{
        const __PICOLOG_ID: u32 = $crate::__site_id!();
        let _: (&str, &str) = ($name, $msg);
        if ($level) >= $crate::get_level() {
            $crate::__emit_array::<$ty>(__PICOLOG_ID, &$values[..], $count);
        }
    }};
}

/// 区间入口（配合 EXIT! 在跟踪可视化里形成切片）
#[macro_export]
macro_rules! ENTER {
    ($level:expr, $name:expr) => {{
        const __PICOLOG_ID: u32 = $crate::__site_id!();
        let _: &str = $name;
        if ($level) >= $crate::get_level() {
            $crate::emit(__PICOLOG_ID, &[], true);
        }
    }};
}

/// 区间出口
#[macro_export]
macro_rules! EXIT {
    ($level:expr, $name:expr) => {{
        const __PICOLOG_ID: u32 = $crate::__site_id!();
        let _: &str = $name;
        if ($level) >= $crate::get_level() {
            $crate::emit(__PICOLOG_ID, &[], true);
        }
    }};
}

/// 数组宏的编码出口：逐元素编码进栈缓冲，超出单帧负载上限的元素丢弃
#[doc(hidden)]
pub fn __emit_array<T: crate::Payload>(id: u32, values: &[T], count: usize) {
    let mut buf = [0u8; crate::constants::MAX_FRAME_PAYLOAD];
    let mut len = 0usize;
    for v in values.iter().take(count) {
        if len + T::SIZE > buf.len() {
            break;
        }
        v.encode(&mut buf[len..len + T::SIZE]);
        len += T::SIZE;
    }
    crate::emit(id, &buf[..len], false);
}

#[cfg(test)]
mod tests {
    use crate::level::{DEBUG, INFO};
    use crate::logger::{set_level, set_serialize_format, SerializeFormat};
    use crate::testutil::{install_capture, settle_thread_state, take_captured, TEST_LOCK};

    #[test]
    fn test_log_macro_emits_frame_with_site_id() {
        let _guard = TEST_LOCK.lock().unwrap();
        install_capture();
        set_serialize_format(SerializeFormat::FullBinary);
        set_level(INFO);
        settle_thread_state();

        let expected = crate::crc32(format!("{}:{}", file!(), line!() + 1).as_bytes());
        LOG!(INFO, "macro smoke test");

        let out = take_captured();
        assert_eq!(out.len(), 16);
        assert_eq!(u32::from_le_bytes(out[4..8].try_into().unwrap()), expected);
    }

    #[test]
    fn test_level_gate_suppresses_emission() {
        let _guard = TEST_LOCK.lock().unwrap();
        install_capture();
        set_serialize_format(SerializeFormat::FullBinary);
        set_level(INFO);
        settle_thread_state();

        LOG!(DEBUG, "should be gated");
        assert!(take_captured().is_empty());

        set_level(DEBUG);
        LOG!(DEBUG, "now visible");
        assert_eq!(take_captured().len(), 16);
        set_level(INFO);
    }

    #[test]
    fn test_record_value_payload() {
        let _guard = TEST_LOCK.lock().unwrap();
        install_capture();
        set_serialize_format(SerializeFormat::FullBinary);
        set_level(INFO);
        settle_thread_state();

        let i: u64 = 4;
        RECORD_AND_LOG_VALUE!(INFO, "LOOP_COUNT", u64, i, "task: ${LOOP_COUNT}");

        let out = take_captured();
        assert_eq!(out.len(), 16 + 8);
        assert_eq!(out[2], 8);
        assert_eq!(u64::from_le_bytes(out[16..24].try_into().unwrap()), 4);
    }

    #[test]
    fn test_record_value_array_is_variable_length() {
        let _guard = TEST_LOCK.lock().unwrap();
        install_capture();
        set_serialize_format(SerializeFormat::MicroBinary);
        set_level(INFO);
        settle_thread_state();

        let values = [1u16, 2, 3];
        RECORD_VALUE_ARRAY!(INFO, "vals", u16, values, 3);

        let out = take_captured();
        // 微型格式变长站点带长度字节
        assert_eq!(out.len(), 4 + 1 + 6);
        assert_eq!(out[4], 6);
        assert_eq!(&out[5..], &[1, 0, 2, 0, 3, 0]);
    }

    #[test]
    fn test_explicit_id_macro() {
        let _guard = TEST_LOCK.lock().unwrap();
        install_capture();
        set_serialize_format(SerializeFormat::FullBinary);
        set_level(INFO);
        settle_thread_state();

        LOG_ID!(0xDEADBEEF, INFO, "hello world trunc, explicit ID");
        let out = take_captured();
        assert_eq!(
            u32::from_le_bytes(out[4..8].try_into().unwrap()),
            0xDEADBEEF
        );
    }
}
