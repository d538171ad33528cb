//! 无锁环形缓冲
//!
//! 发射端在受限平台上的无背压传输缓冲：
//! - 任意长度写入，多个写者并发
//! - 多个读者各自维护私有消费位置，不修改缓冲
//! - 读对齐到写边界；写满不阻塞，读者检测到溢出后跳到当前写入总量
//!
//! 写计数器故意用 32 位（测试回绕逻辑，也兼容没有 64 位原子的目标），
//! 读者把它重建成 64 位的私有 read_tail。容量必须是 2 的幂，
//! 计数器回绕时掩码取偏移仍然正确。
//!
//! `peek` 返回的区域随时可能被后续回绕覆盖，读者消费完要再查一次
//! 溢出来确认数据仍然有效；写入中途的读也可能看到半条记录，
//! 只有头部声明长度完全落在窗口内的帧才能使用。

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};

const MASK_LOWER_32BITS: u64 = 0xFFFF_FFFF;
const OVERFLOW_32BITS: u64 = MASK_LOWER_32BITS + 1;

/// 写入完成回调。没有大小信息：可能还有更早的写尚未落盘。
pub type DataCallback = Box<dyn Fn() + Send + Sync>;
/// 溢出回调: (积压字节数, 缓冲容量)
pub type OverflowCallback = Box<dyn Fn(u64, u64) + Send>;
/// 读者自旋时的让出钩子
pub type SleepHook = Box<dyn Fn() + Send>;

/// 读者检测到的溢出，积压字节数是丢失上界
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingOverflow {
    pub pending_bytes: u64,
}

pub struct LockFreeRingBuffer {
    buffer: Box<[UnsafeCell<u8>]>,
    size: u32,
    total_write: AtomicU32,
    active_writers: AtomicU32,
    data_callback: Option<DataCallback>,
}

// 字节区域通过原子协议共享；溢出时的数据竞争是契约明确承认的
unsafe impl Send for LockFreeRingBuffer {}
unsafe impl Sync for LockFreeRingBuffer {}

impl LockFreeRingBuffer {
    /// 创建环形缓冲。容量必须是 2 的幂。
    pub fn new(size: u32, data_callback: Option<DataCallback>) -> Self {
        assert!(size > 0, "ring size must be non-zero");
        assert!(size.is_power_of_two(), "ring size must be a power of two");
        let buffer: Box<[UnsafeCell<u8>]> =
            (0..size).map(|_| UnsafeCell::new(0u8)).collect();
        Self {
            buffer,
            size,
            total_write: AtomicU32::new(0),
            active_writers: AtomicU32::new(0),
            data_callback,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.size
    }

    /// 无锁写入，长度必须小于容量。多个写者可并发调用。
    pub fn write(&self, data: &[u8]) {
        let data_len = data.len() as u32;
        assert!(data_len < self.size, "write larger than ring capacity");

        // 标记有写在途
        self.active_writers.fetch_add(1, Ordering::SeqCst);

        // fetch_add 领取本次写的独占区间；计数器回绕后掩码取偏移依然对齐
        let start = self.total_write.fetch_add(data_len, Ordering::SeqCst);
        let offset = (start & (self.size - 1)) as usize;
        let until_end = self.size as usize - offset;

        let base = self.buffer.as_ptr() as *mut u8;
        unsafe {
            if until_end < data.len() {
                // 跨过缓冲末尾，拆成两段拷贝
                ptr::copy_nonoverlapping(data.as_ptr(), base.add(offset), until_end);
                ptr::copy_nonoverlapping(
                    data.as_ptr().add(until_end),
                    base,
                    data.len() - until_end,
                );
            } else {
                ptr::copy_nonoverlapping(data.as_ptr(), base.add(offset), data.len());
            }
        }

        self.active_writers.fetch_sub(1, Ordering::SeqCst);

        if let Some(cb) = &self.data_callback {
            cb();
        }
    }
}

/// `peek` 的结果：未读区域，跨缓冲末尾时拆成两段
#[derive(Debug, Clone, Copy)]
pub struct ReadRegion {
    pub ptr1: *const u8,
    pub len1: usize,
    pub ptr2: *const u8,
    pub len2: usize,
}

impl ReadRegion {
    pub const fn empty() -> Self {
        Self {
            ptr1: ptr::null(),
            len1: 0,
            ptr2: ptr::null(),
            len2: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len1 + self.len2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 拷贝最多 `dest.len()` 字节，返回拷贝数
    pub fn copy_to(&self, dest: &mut [u8]) -> usize {
        let copy1 = self.len1.min(dest.len());
        unsafe {
            ptr::copy_nonoverlapping(self.ptr1, dest.as_mut_ptr(), copy1);
        }
        let copy2 = self.len2.min(dest.len() - copy1);
        unsafe {
            ptr::copy_nonoverlapping(self.ptr2, dest.as_mut_ptr().add(copy1), copy2);
        }
        copy1 + copy2
    }

    /// 前进 `offset` 字节后的剩余区域；越界返回空区域
    pub fn advanced(&self, offset: usize) -> ReadRegion {
        if offset > self.len() {
            return ReadRegion::empty();
        }

        if offset < self.len1 {
            return ReadRegion {
                ptr1: unsafe { self.ptr1.add(offset) },
                len1: self.len1 - offset,
                ptr2: self.ptr2,
                len2: self.len2,
            };
        }

        let offset = offset - self.len1;
        ReadRegion {
            ptr1: if self.len2 - offset > 0 {
                unsafe { self.ptr2.add(offset) }
            } else {
                ptr::null()
            },
            len1: self.len2 - offset,
            ptr2: ptr::null(),
            len2: 0,
        }
    }
}

/// 环形缓冲读者。各读者独立，互不影响。
pub struct RingReader<'a> {
    buffer: &'a LockFreeRingBuffer,
    sleep_hook: Option<SleepHook>,
    overflow_hook: Option<OverflowCallback>,
    read_tail: u64,
}

impl<'a> RingReader<'a> {
    pub fn new(buffer: &'a LockFreeRingBuffer) -> Self {
        Self::with_sleep_hook(buffer, None)
    }

    /// 带让出钩子的读者；钩子在等待在途写完成的自旋里调用
    pub fn with_sleep_hook(buffer: &'a LockFreeRingBuffer, sleep_hook: Option<SleepHook>) -> Self {
        let mut reader = Self {
            buffer,
            sleep_hook,
            overflow_hook: None,
            read_tail: 0,
        };
        reader.read_tail = reader.write_total();
        reader
    }

    /// 安装溢出回调
    pub fn set_overflow_hook(&mut self, hook: OverflowCallback) {
        self.overflow_hook = Some(hook);
    }

    /// 读到一致的写入总量：反复采样直到没有在途写且计数未变，
    /// 然后用 read_tail 的高 32 位拼接回绕
    fn write_total(&self) -> u64 {
        loop {
            let sample = self.buffer.total_write.load(Ordering::SeqCst);
            if self.buffer.active_writers.load(Ordering::SeqCst) == 0
                && self.buffer.total_write.load(Ordering::SeqCst) == sample
            {
                let tail_lower = self.read_tail & MASK_LOWER_32BITS;
                let mut tail_upper = self.read_tail & !MASK_LOWER_32BITS;
                if (sample as u64) < tail_lower {
                    // 低 32 位回绕了一圈
                    tail_upper += OVERFLOW_32BITS;
                }
                return tail_upper + sample as u64;
            }
            if let Some(sleep) = &self.sleep_hook {
                sleep();
            }
        }
    }

    /// 未读字节数；溢出时重置到当前写入总量并触发回调
    fn pending_or_reset(&mut self) -> Result<u64, RingOverflow> {
        let total = self.write_total();
        // read_tail 被 mark_read 推过头时按 0 积压处理
        let pending = total.saturating_sub(self.read_tail);
        if pending > self.buffer.size as u64 {
            if let Some(hook) = &self.overflow_hook {
                hook(pending, self.buffer.size as u64);
            }
            self.read_tail = total;
            return Err(RingOverflow {
                pending_bytes: pending,
            });
        }
        Ok(pending)
    }

    /// 未读区域。区域内的字节可能被后续回绕覆盖，
    /// 消费后用 `mark_read` 的返回值确认仍然有效。
    pub fn peek(&mut self) -> Result<ReadRegion, RingOverflow> {
        let pending = self.pending_or_reset()?;

        let offset = (self.read_tail & (self.buffer.size as u64 - 1)) as usize;
        let base = self.buffer.buffer.as_ptr() as *const u8;
        let until_end = self.buffer.size as usize - offset;

        let mut region = ReadRegion::empty();
        region.ptr1 = unsafe { base.add(offset) };
        if (until_end as u64) < pending {
            region.len1 = until_end;
            region.ptr2 = base;
            region.len2 = pending as usize - until_end;
        } else {
            region.len1 = pending as usize;
        }

        Ok(region)
    }

    /// 前进读位置。过量前进是允许的，后续 peek 只是看到更多新数据。
    /// 返回 false 表示这段时间里发生了溢出，刚消费的数据不可信。
    pub fn mark_read(&mut self, num_bytes: u64) -> bool {
        if self.pending_or_reset().is_err() {
            return false;
        }
        self.read_tail += num_bytes;
        true
    }

    /// peek + 拷贝 + mark_read 的组合
    pub fn read_into(&mut self, dest: &mut [u8]) -> Result<usize, RingOverflow> {
        if dest.is_empty() {
            return Ok(0);
        }
        let region = self.peek()?;
        let copied = region.copy_to(dest);
        if !self.mark_read(copied as u64) {
            return Err(RingOverflow {
                pending_bytes: copied as u64,
            });
        }
        Ok(copied)
    }
}
