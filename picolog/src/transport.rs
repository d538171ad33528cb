//! 环形缓冲传输
//!
//! 把写出钩子接到进程级环形缓冲上，发射路径变成无阻塞入队；
//! 排空线程负责把字节搬到真正的出口（文件、串口、套接字）。
//! 对应嵌入式端「静态缓冲 + 后台排空任务」的组织方式。

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use crate::hooks;
use crate::ring::{LockFreeRingBuffer, RingReader};

static RING: OnceLock<LockFreeRingBuffer> = OnceLock::new();

fn ring_write(frame: &[u8]) {
    if let Some(ring) = RING.get() {
        ring.write(frame);
    }
}

/// 初始化进程级环形缓冲并安装为写出钩子。容量必须是 2 的幂。
/// 重复调用保留第一次的缓冲。
pub fn install(capacity: u32) -> &'static LockFreeRingBuffer {
    let ring = RING.get_or_init(|| LockFreeRingBuffer::new(capacity, None));
    hooks::set_write(ring_write);
    ring
}

/// 已安装的进程级缓冲
pub fn buffer() -> Option<&'static LockFreeRingBuffer> {
    RING.get()
}

/// 排空线程句柄
pub struct DrainHandle {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl DrainHandle {
    /// 停止排空线程，最后一轮把剩余数据搬完
    pub fn stop(self) {
        self.stop.store(true, Ordering::Release);
        let _ = self.handle.join();
    }
}

/// 启动排空线程，按 `poll_interval` 轮询缓冲并写到 `out`。
/// 溢出时读者自动重置，丢失的字节不再补偿。
pub fn spawn_drain<W: Write + Send + 'static>(mut out: W, poll_interval: Duration) -> DrainHandle {
    assert!(RING.get().is_some(), "transport::install must run first");
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);

    let handle = thread::spawn(move || {
        let ring = match RING.get() {
            Some(r) => r,
            None => return,
        };
        let mut reader = RingReader::with_sleep_hook(
            ring,
            Some(Box::new(|| thread::sleep(Duration::from_micros(1)))),
        );
        let mut chunk = vec![0u8; ring.capacity() as usize];

        loop {
            let stopping = stop_flag.load(Ordering::Acquire);
            match reader.read_into(&mut chunk) {
                Ok(0) => {
                    if stopping {
                        break;
                    }
                    thread::sleep(poll_interval);
                }
                Ok(n) => {
                    if out.write_all(&chunk[..n]).is_err() {
                        break;
                    }
                }
                // 溢出：读者已重置，下一轮从最新数据继续
                Err(_) => {}
            }
        }
        let _ = out.flush();
    });

    DrainHandle { stop, handle }
}
