//! `lens-buffer` 提供 Lens 编码器使用的暂存缓冲池。
//!
//! # 模块定位（Why）
//! - 编码热路径会反复申请“写满即弃”的暂存区；池化 `bytes::BytesMut` 可以把稳定负载下的堆分配降到接近零。
//! - 本 crate 不理解任何协议细节，只负责容量的租借、增长与回收，便于独立测试与替换。
//!
//! # 设计概要（How）
//! - [`BufferPool`]：调用方独占的池实例，所有方法均要求 `&mut self`，池内部不做任何加锁；
//! - [`SharedBufferPool`]：显式的 `Arc<spin::Mutex<BufferPool>>` 句柄，供需要跨 worker 共享同一池的调用方选用；
//! - [`BufferSource`]：编码器面向的抽象接口，二者均实现该 trait。
//!
//! # 契约说明（What）
//! - `acquire` 返回的缓冲逻辑长度恒为 0，且剩余容量不小于请求值；
//! - `release` 会清空缓冲后再放回空闲链表，后续租借者观察不到任何历史内容；
//! - 超出 `max_idle_buffers` 或 `max_retained_capacity` 的缓冲直接丢弃，用以封顶闲置内存。

mod pool;
mod shared;

pub use pool::{BufferPool, BufferSource, PoolConfig, PoolStats};
pub use shared::SharedBufferPool;
