//! 平台钩子
//!
//! 时间源、线程名查询、底层写出三个钩子都有默认实现并可替换。
//! 钩子是普通函数指针，以 usize 形式存在原子变量里；0 表示未安装，
//! 读取时回落到默认实现。

use std::io::Write;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// 单调纳秒时间源
pub type TimeFn = fn() -> u64;
/// 线程名查询：填充缓冲，返回写入的字节数
pub type ThreadNameFn = fn(&mut [u8]) -> usize;
/// 底层写出：一次调用写出一帧
pub type WriteFn = fn(&[u8]);

static TIME_HOOK: AtomicUsize = AtomicUsize::new(0);
static THREAD_NAME_HOOK: AtomicUsize = AtomicUsize::new(0);
static WRITE_HOOK: AtomicUsize = AtomicUsize::new(0);

/// 替换时间源。默认实现是挂钟纳秒；嵌入式目标应装入单调时钟。
pub fn set_time_source(f: TimeFn) {
    TIME_HOOK.store(f as usize, Ordering::Release);
}

/// 替换线程名查询
pub fn set_thread_name_source(f: ThreadNameFn) {
    THREAD_NAME_HOOK.store(f as usize, Ordering::Release);
}

/// 替换底层写出。默认写到标准输出。
pub fn set_write(f: WriteFn) {
    WRITE_HOOK.store(f as usize, Ordering::Release);
}

pub(crate) fn time_now_ns() -> u64 {
    match TIME_HOOK.load(Ordering::Acquire) {
        0 => default_time_ns(),
        p => (unsafe { mem::transmute::<usize, TimeFn>(p) })(),
    }
}

pub(crate) fn thread_name(buf: &mut [u8]) -> usize {
    match THREAD_NAME_HOOK.load(Ordering::Acquire) {
        0 => default_thread_name(buf),
        p => (unsafe { mem::transmute::<usize, ThreadNameFn>(p) })(buf),
    }
}

pub(crate) fn raw_write(frame: &[u8]) {
    match WRITE_HOOK.load(Ordering::Acquire) {
        0 => default_write(frame),
        p => (unsafe { mem::transmute::<usize, WriteFn>(p) })(frame),
    }
}

fn default_time_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn default_thread_name(buf: &mut [u8]) -> usize {
    let thread = std::thread::current();
    let name = thread.name().unwrap_or("");
    let n = name.len().min(buf.len());
    buf[..n].copy_from_slice(&name.as_bytes()[..n]);
    n
}

fn default_write(frame: &[u8]) {
    // 发射端不重试，传输失败只在钩子内部可见
    let _ = std::io::stdout().lock().write_all(frame);
}
