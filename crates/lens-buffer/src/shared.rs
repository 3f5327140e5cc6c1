use std::sync::Arc;

use bytes::BytesMut;
use spin::Mutex;

use crate::pool::{BufferPool, BufferSource, PoolConfig, PoolStats};

/// `SharedBufferPool` 是跨 worker 共享同一 [`BufferPool`] 的显式句柄。
///
/// # 设计背景（Why）
/// - [`BufferPool`] 自身不加锁；当调用方确实需要多个编码器共用一批缓冲时，
///   应当在调用点看得见锁的存在，而不是由池在内部悄悄同步。
/// - 采用 `spin::Mutex`：临界区只有一次 `Vec` 的 push/pop，自旋开销远小于陷入内核。
///
/// # 契约说明（What）
/// - `clone` 得到的句柄指向同一个池；
/// - 每次 `acquire`/`release` 只在调用期间持锁，借出的缓冲在归还前由持有者独占。
#[derive(Clone, Debug, Default)]
pub struct SharedBufferPool {
    inner: Arc<Mutex<BufferPool>>,
}

impl SharedBufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PoolConfig) -> Self {
        Self::from_pool(BufferPool::with_config(config))
    }

    /// 接管一个已有的池实例。
    pub fn from_pool(pool: BufferPool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pool)),
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats()
    }

    pub fn shrink_to_fit(&self) -> usize {
        self.inner.lock().shrink_to_fit()
    }
}

impl BufferSource for SharedBufferPool {
    fn acquire(&mut self, min_capacity: usize) -> BytesMut {
        self.inner.lock().acquire(min_capacity)
    }

    fn release(&mut self, buffer: BytesMut) {
        self.inner.lock().release(buffer)
    }
}
