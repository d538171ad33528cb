//! 测试辅助：全局钩子和序列化格式是进程级状态，
//! 动它们的测试共用一把锁并把输出捕获到内存。

use std::sync::Mutex;

use crate::hooks;

pub(crate) static TEST_LOCK: Mutex<()> = Mutex::new(());

static SINK: Mutex<Vec<u8>> = Mutex::new(Vec::new());

fn capture(frame: &[u8]) {
    SINK.lock().unwrap().extend_from_slice(frame);
}

pub(crate) fn install_capture() {
    hooks::set_write(capture);
    SINK.lock().unwrap().clear();
}

pub(crate) fn take_captured() -> Vec<u8> {
    std::mem::take(&mut *SINK.lock().unwrap())
}

/// 消化本线程可能欠下的线程名广播并清空捕获，
/// 之后的发射帧数才是确定的。
pub(crate) fn settle_thread_state() {
    crate::logger::emit(0, &[], true);
    SINK.lock().unwrap().clear();
}
