use bytes::BytesMut;
use serde::{Deserialize, Serialize};

/// 缓冲池的容量策略。
///
/// # 契约说明（What）
/// - `initial_capacity`：空闲链表为空时新分配缓冲的最小容量；
/// - `max_idle_buffers`：空闲链表最多保留的缓冲数量，超出部分在 `release` 时丢弃；
/// - `max_retained_capacity`：单个缓冲允许回收的容量上限，避免一次超大编码长期占住内存。
///
/// # 设计取舍（Trade-offs）
/// - 默认值面向“大量小消息”的场景：256 字节起步、最多 16 个闲置缓冲、单块上限 1 MiB；
/// - 结构体派生 `serde`，可直接嵌入上层配置文件。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    pub initial_capacity: usize,
    pub max_idle_buffers: usize,
    pub max_retained_capacity: usize,
}

impl PoolConfig {
    pub const DEFAULT_INITIAL_CAPACITY: usize = 256;
    pub const DEFAULT_MAX_IDLE_BUFFERS: usize = 16;
    pub const DEFAULT_MAX_RETAINED_CAPACITY: usize = 1024 * 1024;
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_capacity: Self::DEFAULT_INITIAL_CAPACITY,
            max_idle_buffers: Self::DEFAULT_MAX_IDLE_BUFFERS,
            max_retained_capacity: Self::DEFAULT_MAX_RETAINED_CAPACITY,
        }
    }
}

/// 池的累计统计快照。
///
/// - `fresh_allocations`：因空闲链表为空而新分配的次数；
/// - `reuses`：直接复用闲置缓冲（无需扩容）的次数；
/// - `growths`：复用闲置缓冲但需要倍增扩容的次数；
/// - `discards`：`release` 时因超出上限而被丢弃的次数；
/// - `idle_buffers` / `idle_bytes`：当前空闲链表的规模。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub fresh_allocations: u64,
    pub reuses: u64,
    pub growths: u64,
    pub discards: u64,
    pub idle_buffers: usize,
    pub idle_bytes: usize,
}

/// 编码器获取暂存缓冲的抽象入口。
///
/// # 设计初衷（Why）
/// - 编码器只关心“借一块、还一块”，不应绑定具体的池实现或加锁策略；
/// - 调用方可以给每个 worker 一个独占的 [`BufferPool`]，也可以显式选择 [`crate::SharedBufferPool`]。
///
/// # 契约定义（What）
/// - `acquire` 返回的缓冲 `len() == 0` 且 `capacity() >= min_capacity`；
/// - 借出的缓冲在 `release` 之前由借用方独占；
/// - `release` 之后调用方不得再持有该缓冲的任何别名。
pub trait BufferSource {
    /// 租借一块至少具备 `min_capacity` 可写空间的缓冲。
    fn acquire(&mut self, min_capacity: usize) -> BytesMut;

    /// 归还缓冲；实现可选择保留容量或直接丢弃。
    fn release(&mut self, buffer: BytesMut);
}

/// `BufferPool` 以空闲链表复用 `BytesMut`，减少编码热路径上的堆分配。
///
/// # 核心机制（How）
/// - 租借时优先挑选容量已足够的闲置缓冲；都不够时取出最大的一块按倍增策略扩容；
///   空闲链表为空才向堆申请新缓冲；
/// - 归还时先 `clear` 再入链表，容量保留、逻辑长度归零；
/// - 所有方法都要求 `&mut self`：池本身不做同步，多 worker 共享需由调用方显式加锁。
///
/// # 契约说明（What）
/// - **后置条件**：`acquire` 结果满足 [`BufferSource`] 的约束；
/// - **内存上限**：闲置缓冲数量不超过 `max_idle_buffers`，单块容量不超过 `max_retained_capacity`。
#[derive(Debug, Default)]
pub struct BufferPool {
    idle: Vec<BytesMut>,
    config: PoolConfig,
    stats: PoolStats,
}

impl BufferPool {
    /// 以默认策略创建空池。
    pub fn new() -> Self {
        Self::default()
    }

    /// 以指定策略创建空池。
    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            idle: Vec::new(),
            config,
            stats: PoolStats::default(),
        }
    }

    /// 返回池当前使用的容量策略。
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// 租借缓冲。
    ///
    /// # 执行步骤（How）
    /// 1. 线性查找第一块 `capacity >= min_capacity` 的闲置缓冲，命中即复用；
    /// 2. 未命中但链表非空时，取出容量最大的一块，从其当前容量开始倍增直到覆盖请求；
    /// 3. 链表为空时分配 `max(min_capacity, initial_capacity)` 的新缓冲。
    pub fn acquire(&mut self, min_capacity: usize) -> BytesMut {
        if let Some(index) = self
            .idle
            .iter()
            .position(|buf| buf.capacity() >= min_capacity)
        {
            let mut buf = self.idle.swap_remove(index);
            buf.clear();
            self.stats.reuses += 1;
            return buf;
        }

        let largest = self
            .idle
            .iter()
            .enumerate()
            .max_by_key(|(_, buf)| buf.capacity())
            .map(|(index, _)| index);

        match largest {
            Some(index) => {
                let mut buf = self.idle.swap_remove(index);
                buf.clear();
                let target = doubled_capacity(buf.capacity(), min_capacity);
                buf.reserve(target);
                self.stats.growths += 1;
                buf
            }
            None => {
                self.stats.fresh_allocations += 1;
                BytesMut::with_capacity(min_capacity.max(self.config.initial_capacity))
            }
        }
    }

    /// 归还缓冲：清空逻辑长度、保留容量；超出上限时直接丢弃。
    pub fn release(&mut self, mut buffer: BytesMut) {
        buffer.clear();
        if self.idle.len() >= self.config.max_idle_buffers
            || buffer.capacity() > self.config.max_retained_capacity
        {
            self.stats.discards += 1;
            return;
        }
        self.idle.push(buffer);
    }

    /// 释放全部闲置缓冲，返回归还给分配器的容量总和。
    pub fn shrink_to_fit(&mut self) -> usize {
        let reclaimed = self.idle.iter().map(BytesMut::capacity).sum();
        self.idle.clear();
        reclaimed
    }

    /// 当前闲置缓冲数量。
    pub fn idle_buffers(&self) -> usize {
        self.idle.len()
    }

    /// 读取统计快照。
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle_buffers: self.idle.len(),
            idle_bytes: self.idle.iter().map(BytesMut::capacity).sum(),
            ..self.stats
        }
    }
}

impl BufferSource for BufferPool {
    fn acquire(&mut self, min_capacity: usize) -> BytesMut {
        BufferPool::acquire(self, min_capacity)
    }

    fn release(&mut self, buffer: BytesMut) {
        BufferPool::release(self, buffer)
    }
}

/// 从 `current` 起倍增，直到不小于 `required`。
fn doubled_capacity(current: usize, required: usize) -> usize {
    let mut target = current.max(1);
    while target < required {
        target = match target.checked_mul(2) {
            Some(next) => next,
            None => return required,
        };
    }
    target
}
