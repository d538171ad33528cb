//! 发射端核心
//!
//! 进程级状态（等级阈值、当前序列化格式、线程计数、广播计数）全部是
//! 原子变量，首次使用时惰性初始化，进程生存期内不销毁。
//! 线程本地只有两个字段：线程号缓存和广播计数快照。

use std::cell::Cell;
use std::mem;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU8, AtomicUsize, Ordering};

use crate::constants::{THREAD_NAME_LEN, THREAD_NAME_MSG_ID};
use crate::hooks;
use crate::level;
use crate::serialize;

/// 序列化回调: (站点 ID, 负载, 是否定长)
pub type SerializeFn = fn(u32, &[u8], bool);

/// 当前序列化格式。内建格式用标签分发，避免动态方法表。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializeFormat {
    FullBinary,
    MicroBinary,
    Text,
    Custom(SerializeFn),
}

const TAG_FULL: u8 = 0;
const TAG_MICRO: u8 = 1;
const TAG_TEXT: u8 = 2;
const TAG_CUSTOM: u8 = 3;

static LEVEL: AtomicI32 = AtomicI32::new(level::INFO);
static FORMAT_TAG: AtomicU8 = AtomicU8::new(TAG_TEXT);
static CUSTOM_FN: AtomicUsize = AtomicUsize::new(0);
static THREAD_COUNT: AtomicU32 = AtomicU32::new(0);
static BROADCAST_COUNT: AtomicU32 = AtomicU32::new(0);

#[derive(Clone, Copy)]
struct ThreadState {
    idx: i32,
    broadcast_seen: u32,
}

thread_local! {
    static THREAD_STATE: Cell<ThreadState> = const {
        Cell::new(ThreadState { idx: -1, broadcast_seen: 0 })
    };
}

/// 设置进程级等级阈值
pub fn set_level(lvl: i32) {
    LEVEL.store(lvl, Ordering::Relaxed);
}

/// 读取进程级等级阈值
pub fn get_level() -> i32 {
    LEVEL.load(Ordering::Relaxed)
}

/// 安装序列化格式
pub fn set_serialize_format(format: SerializeFormat) {
    let tag = match format {
        SerializeFormat::FullBinary => TAG_FULL,
        SerializeFormat::MicroBinary => TAG_MICRO,
        SerializeFormat::Text => TAG_TEXT,
        SerializeFormat::Custom(f) => {
            // 先发布函数指针再发布标签
            CUSTOM_FN.store(f as usize, Ordering::Release);
            TAG_CUSTOM
        }
    };
    FORMAT_TAG.store(tag, Ordering::Release);
}

/// 读取当前序列化格式
pub fn get_serialize_format() -> SerializeFormat {
    match FORMAT_TAG.load(Ordering::Acquire) {
        TAG_FULL => SerializeFormat::FullBinary,
        TAG_MICRO => SerializeFormat::MicroBinary,
        TAG_CUSTOM => match CUSTOM_FN.load(Ordering::Acquire) {
            0 => SerializeFormat::Text,
            p => SerializeFormat::Custom(unsafe { mem::transmute::<usize, SerializeFn>(p) }),
        },
        _ => SerializeFormat::Text,
    }
}

/// 请求所有线程在下一次发射前广播自己的线程名
pub fn request_thread_name_broadcast() {
    BROADCAST_COUNT.fetch_add(1, Ordering::Release);
}

/// 当前线程的密集线程号，首次发射时从全局计数器领取
pub(crate) fn thread_idx() -> u32 {
    THREAD_STATE.with(|s| {
        let mut st = s.get();
        if st.idx < 0 {
            st.idx = THREAD_COUNT.fetch_add(1, Ordering::Relaxed) as i32;
            s.set(st);
        }
        st.idx as u32
    })
}

/// 快照落后于全局广播计数时，先发一条线程名记录再发本记录。
/// 先更新快照再发射，线程名记录自身不会再次触发广播。
pub(crate) fn send_thread_name_if_needed() {
    let global = BROADCAST_COUNT.load(Ordering::Acquire);
    let pending = THREAD_STATE.with(|s| {
        let mut st = s.get();
        if st.broadcast_seen != global {
            st.broadcast_seen = global;
            s.set(st);
            true
        } else {
            false
        }
    });

    if pending {
        let mut name_buf = [0u8; THREAD_NAME_LEN];
        let n = hooks::thread_name(&mut name_buf);
        dispatch(THREAD_NAME_MSG_ID, &name_buf[..n], false);
    }
}

fn dispatch(id: u32, payload: &[u8], is_fixed_size: bool) {
    match FORMAT_TAG.load(Ordering::Acquire) {
        TAG_FULL => serialize::full_binary(id, payload, is_fixed_size),
        TAG_MICRO => serialize::micro_binary(id, payload, is_fixed_size),
        TAG_CUSTOM => match CUSTOM_FN.load(Ordering::Acquire) {
            0 => serialize::text(id, payload, is_fixed_size),
            p => (unsafe { mem::transmute::<usize, SerializeFn>(p) })(id, payload, is_fixed_size),
        },
        _ => serialize::text(id, payload, is_fixed_size),
    }
}

/// 站点发射入口。等级门限由宏负责，这里直接交给当前序列化格式。
pub fn emit(id: u32, payload: &[u8], is_fixed_size: bool) {
    dispatch(id, payload, is_fixed_size);
}
