//! 编码器：把 [`Value`] 树写成 Lens 线格式字节。
//!
//! # 教案式说明
//! - **意图 (Why)**：编码器是热路径，既要避免每次调用都向堆申请暂存空间，
//!   又要在面对极深嵌套时给出确定的 `DepthExceeded`，而不是耗尽线程栈；
//! - **机制 (How)**：
//!   1. 从 [`BufferSource`] 租借暂存缓冲，容量参考上一次输出长度；
//!   2. 以显式的堆上工作栈遍历值树，每个栈帧是容器子元素的迭代器（即“恢复位置”），
//!      栈深就是当前打开的容器数；
//!   3. 成功后把暂存内容复制为独立的 [`Bytes`]，再把缓冲归还池中；
//! - **契约 (What)**：全有或全无。任何错误都会丢弃已写内容，并把本次调用新增的符号回滚，
//!   符号表恢复到调用前的状态；
//! - **取舍 (Trade-offs)**：输出多一次复制，换来调用方永远拿不到指向池内存的别名。

use std::fmt;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use lens_buffer::{BufferPool, BufferSource};
use tracing::debug;

use crate::config::{EngineConfig, SymbolOverflowPolicy};
use crate::diagnostics::Diagnostics;
use crate::error::{ErrorKind, LensError, Phase};
use crate::hooks::{ExtId, ExtensionAdapter};
use crate::symbol::SymbolTable;
use crate::value::{CustomValue, Value};
use crate::wire::{self, Tag};

/// 可复用的编码器，持有缓冲池、配置与可选的扩展适配器。
///
/// # 契约说明（What）
/// - **前置条件**：符号表由调用方持有，同一时刻只允许一个调用写入；
/// - **后置条件**：成功时返回的字节与池内存无别名，符号表只会追加；
///   失败时符号表与调用前逐项相同。
pub struct Encoder<P: BufferSource = BufferPool> {
    pool: P,
    config: EngineConfig,
    adapter: Option<Arc<ExtensionAdapter>>,
    size_hint: usize,
}

impl Encoder<BufferPool> {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// 按配置中的 `pool` 策略创建独占缓冲池。
    pub fn with_config(config: EngineConfig) -> Self {
        let pool = BufferPool::with_config(config.pool);
        Self::with_pool(pool, config)
    }
}

impl Default for Encoder<BufferPool> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: BufferSource> Encoder<P> {
    /// 使用调用方提供的缓冲来源，例如跨 worker 共享的 `SharedBufferPool`。
    pub fn with_pool(pool: P, config: EngineConfig) -> Self {
        Self {
            pool,
            config,
            adapter: None,
            size_hint: 0,
        }
    }

    /// 注册扩展适配器，替换此前的适配器。
    pub fn with_extension_adapter<F>(mut self, adapter: F) -> Self
    where
        F: Fn(&dyn CustomValue) -> Option<(ExtId, Vec<u8>)> + Send + Sync + 'static,
    {
        self.adapter = Some(Arc::new(adapter));
        self
    }

    pub fn set_extension_adapter(&mut self, adapter: Option<Arc<ExtensionAdapter>>) {
        self.adapter = adapter;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut P {
        &mut self.pool
    }

    /// 编码单个值。
    ///
    /// # 执行步骤（How）
    /// 1. 记录符号表检查点并租借暂存缓冲；
    /// 2. 显式栈遍历写出全部字节；
    /// 3. 成功：复制输出、更新容量提示；失败：回滚符号表、补充诊断；
    /// 4. 无论成败都归还暂存缓冲。
    pub fn encode(
        &mut self,
        value: &Value<'_>,
        symbols: &mut SymbolTable,
    ) -> Result<Bytes, LensError> {
        let checkpoint = symbols.checkpoint();
        let mut buf = self.pool.acquire(self.size_hint);

        let outcome = EncodeRun {
            buf: &mut buf,
            symbols: &mut *symbols,
            config: &self.config,
            adapter: self.adapter.as_deref(),
            stack: Vec::new(),
        }
        .run(value);

        let result = match outcome {
            Ok(()) => {
                self.size_hint = buf.len();
                Ok(Bytes::copy_from_slice(&buf))
            }
            Err(err) => {
                symbols.rollback(checkpoint);
                if self.config.debug {
                    debug!(
                        code = err.code(),
                        offset = ?err.offset(),
                        "lens encode aborted: {}",
                        err.message()
                    );
                }
                Err(err)
            }
        };
        self.pool.release(buf);
        result
    }
}

impl<P: BufferSource + fmt::Debug> fmt::Debug for Encoder<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encoder")
            .field("pool", &self.pool)
            .field("config", &self.config)
            .field("has_adapter", &self.adapter.is_some())
            .field("size_hint", &self.size_hint)
            .finish()
    }
}

/// 显式工作栈的帧：尚未写出的子元素迭代器。
enum Frame<'v, 'a> {
    List(std::slice::Iter<'v, Value<'a>>),
    Map(std::slice::Iter<'v, (String, Value<'a>)>),
}

impl Frame<'_, '_> {
    fn tag(&self) -> Tag {
        match self {
            Frame::List(_) => Tag::List,
            Frame::Map(_) => Tag::Map,
        }
    }
}

/// 单次编码调用的可变状态。
struct EncodeRun<'e, 'v, 'a> {
    buf: &'e mut BytesMut,
    symbols: &'e mut SymbolTable,
    config: &'e EngineConfig,
    adapter: Option<&'e ExtensionAdapter>,
    stack: Vec<Frame<'v, 'a>>,
}

impl<'v, 'a> EncodeRun<'_, 'v, 'a> {
    fn run(mut self, root: &'v Value<'a>) -> Result<(), LensError> {
        let mut pending = Some(root);
        loop {
            if let Some(value) = pending.take() {
                self.write_value(value)
                    .map_err(|err| self.fail(err, value_tag(value)))?;
            }
            match self.stack.last_mut() {
                None => return Ok(()),
                Some(Frame::List(items)) => match items.next() {
                    Some(item) => pending = Some(item),
                    None => {
                        self.stack.pop();
                    }
                },
                Some(Frame::Map(entries)) => match entries.next() {
                    Some((key, item)) => {
                        self.write_key(key).map_err(|err| self.fail(err, Tag::SymRef))?;
                        pending = Some(item);
                    }
                    None => {
                        self.stack.pop();
                    }
                },
            }
        }
    }

    /// 写出一个值；容器只写头部并压入新帧，子元素由 `run` 的循环继续处理。
    fn write_value(&mut self, value: &'v Value<'a>) -> Result<(), LensError> {
        match value {
            Value::Null => self.buf.put_u8(Tag::Null.byte()),
            Value::Bool(false) => self.buf.put_u8(Tag::False.byte()),
            Value::Bool(true) => self.buf.put_u8(Tag::True.byte()),
            Value::Int(v) => wire::put_int(self.buf, *v),
            Value::Float(v) => {
                self.buf.put_u8(Tag::Float64.byte());
                self.buf.put_f64_le(*v);
            }
            Value::Str(v) => self.put_blob(Tag::Str, v.as_bytes()),
            Value::Bytes(v) => self.put_blob(Tag::Bytes, v),
            Value::Timestamp(ts) => {
                self.buf.put_u8(Tag::Timestamp.byte());
                self.buf.put_i64_le(ts.as_millis());
            }
            Value::List(items) => {
                self.open_container(Tag::List, items.len())?;
                self.stack.push(Frame::List(items.iter()));
            }
            Value::Map(map) => {
                self.open_container(Tag::Map, map.len())?;
                self.stack.push(Frame::Map(map.iter()));
            }
            Value::Ext(ext) => self.put_ext(ext.id, &ext.payload),
            Value::Custom(custom) => {
                let adapter = self.adapter.ok_or_else(|| {
                    LensError::encode(
                        ErrorKind::UnsupportedType,
                        format!(
                            "no extension adapter for custom value {}",
                            custom.type_name()
                        ),
                    )
                })?;
                let (id, payload) = adapter(custom.as_ref()).ok_or_else(|| {
                    LensError::encode(
                        ErrorKind::UnsupportedType,
                        format!(
                            "extension adapter declined custom value {}",
                            custom.type_name()
                        ),
                    )
                })?;
                self.put_ext(id, &payload);
            }
        }
        Ok(())
    }

    fn open_container(&mut self, tag: Tag, count: usize) -> Result<(), LensError> {
        let depth = self.stack.len() + 1;
        if depth > self.config.max_depth {
            return Err(LensError::encode(
                ErrorKind::DepthExceeded,
                format!(
                    "nesting depth {depth} exceeds configured limit {}",
                    self.config.max_depth
                ),
            ));
        }
        self.buf.put_u8(tag.byte());
        wire::put_varint(self.buf, count as u64);
        Ok(())
    }

    /// 写出映射键：优先驻留为 `SYMREF`，符号表满时按溢出策略处理。
    fn write_key(&mut self, key: &str) -> Result<(), LensError> {
        match self.symbols.intern(key) {
            Ok(id) => {
                self.buf.put_u8(Tag::SymRef.byte());
                wire::put_varint(self.buf, u64::from(id.0));
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::SymbolCapacityReached => {
                match self.config.symbol_overflow {
                    SymbolOverflowPolicy::Inline => {
                        if self.config.debug {
                            debug!(
                                key_len = key.len(),
                                capacity = self.symbols.capacity(),
                                "symbol table full, writing key inline"
                            );
                        }
                        self.put_blob(Tag::Str, key.as_bytes());
                        Ok(())
                    }
                    SymbolOverflowPolicy::Reject => Err(err.with_phase(Phase::Encode)),
                }
            }
            Err(err) => Err(err.with_phase(Phase::Encode)),
        }
    }

    fn put_blob(&mut self, tag: Tag, bytes: &[u8]) {
        self.buf.reserve(1 + wire::varint_len(bytes.len() as u64) + bytes.len());
        self.buf.put_u8(tag.byte());
        wire::put_varint(self.buf, bytes.len() as u64);
        self.buf.put_slice(bytes);
    }

    fn put_ext(&mut self, id: ExtId, payload: &[u8]) {
        self.buf.put_u8(Tag::Ext.byte());
        wire::put_varint(self.buf, u64::from(id));
        wire::put_varint(self.buf, payload.len() as u64);
        self.buf.put_slice(payload);
    }

    /// 补充偏移；调试模式下再附加容器路径与输出片段。
    fn fail(&self, err: LensError, tag: Tag) -> LensError {
        let offset = self.buf.len();
        let err = err.with_offset(offset);
        if !self.config.debug {
            return err;
        }
        let mut path: Vec<Tag> = self.stack.iter().map(Frame::tag).collect();
        path.push(tag);
        err.with_diagnostics(Diagnostics::new(path, offset, &self.buf[..]))
    }
}

/// 值在线上对应的首个标签。
fn value_tag(value: &Value<'_>) -> Tag {
    match value {
        Value::Null => Tag::Null,
        Value::Bool(false) => Tag::False,
        Value::Bool(true) => Tag::True,
        Value::Int(_) => Tag::Int64,
        Value::Float(_) => Tag::Float64,
        Value::Str(_) => Tag::Str,
        Value::Bytes(_) => Tag::Bytes,
        Value::Timestamp(_) => Tag::Timestamp,
        Value::List(_) => Tag::List,
        Value::Map(_) => Tag::Map,
        Value::Ext(_) | Value::Custom(_) => Tag::Ext,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Map;
    use tracing_test::traced_test;

    #[derive(Debug, PartialEq)]
    struct Opaque;

    fn nested_lists(depth: usize) -> Value<'static> {
        let mut value = Value::Null;
        for _ in 0..depth {
            value = Value::List(vec![value]);
        }
        value
    }

    #[test]
    fn depth_limit_is_inclusive() {
        let mut encoder = Encoder::with_config(EngineConfig::default().with_max_depth(3));
        let mut symbols = SymbolTable::new();
        encoder
            .encode(&nested_lists(3), &mut symbols)
            .expect("深度恰好等于上限应当成功");
        let err = encoder
            .encode(&nested_lists(4), &mut symbols)
            .expect_err("超出上限一层");
        assert_eq!(err.kind(), ErrorKind::DepthExceeded);
        assert!(err.is_encode());
    }

    #[test]
    fn custom_without_adapter_is_unsupported() {
        let mut encoder = Encoder::new();
        let mut symbols = SymbolTable::new();
        let err = encoder
            .encode(&Value::custom(Opaque), &mut symbols)
            .expect_err("未注册适配器");
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);
        assert!(err.message().contains("Opaque"), "消息应包含类型名: {err}");
    }

    #[test]
    fn failed_encode_releases_scratch_buffer() {
        let mut encoder = Encoder::new();
        let mut symbols = SymbolTable::new();
        let value = Value::List(vec![Value::Int(1), Value::custom(Opaque)]);
        encoder.encode(&value, &mut symbols).expect_err("未注册适配器");
        assert_eq!(encoder.pool().stats().idle_buffers, 1);
    }

    #[test]
    fn debug_mode_attaches_container_path() {
        let mut encoder = Encoder::with_config(EngineConfig::default().with_debug(true));
        let mut symbols = SymbolTable::new();
        let mut map = Map::new();
        map.insert("items", Value::List(vec![Value::custom(Opaque)]));
        let err = encoder
            .encode(&Value::Map(map), &mut symbols)
            .expect_err("未注册适配器");
        let diag = err.diagnostics().expect("调试模式应附带诊断");
        assert_eq!(diag.path, [Tag::Map, Tag::List, Tag::Ext]);
        assert_eq!(diag.offset, 6);
        assert!(symbols.is_empty(), "失败调用新增的符号应被回滚");
    }

    #[test]
    fn diagnostics_absent_without_debug() {
        let mut encoder = Encoder::with_config(EngineConfig::default().with_debug(false));
        let mut symbols = SymbolTable::new();
        let err = encoder
            .encode(&Value::custom(Opaque), &mut symbols)
            .expect_err("未注册适配器");
        assert!(err.diagnostics().is_none());
        assert_eq!(err.offset(), Some(0));
    }

    #[traced_test]
    #[test]
    fn inline_fallback_is_logged_in_debug_mode() {
        let mut encoder = Encoder::with_config(EngineConfig::default().with_debug(true));
        let mut symbols = SymbolTable::with_capacity(0);
        let mut map = Map::new();
        map.insert("k", 1);
        let bytes = encoder
            .encode(&Value::Map(map), &mut symbols)
            .expect("内联降级不应失败");
        assert_eq!(&bytes[..], &[0x0D, 0x01, 0x08, 0x01, b'k', 0x03, 0x01]);
        assert!(logs_contain("symbol table full, writing key inline"));
    }

    #[traced_test]
    #[test]
    fn aborted_call_is_logged_in_debug_mode() {
        let mut encoder = Encoder::with_config(EngineConfig::default().with_debug(true));
        let mut symbols = SymbolTable::new();
        encoder
            .encode(&Value::custom(Opaque), &mut symbols)
            .expect_err("未注册适配器");
        assert!(logs_contain("lens encode aborted"));
        assert!(logs_contain("lens.unsupported_type"));
    }

    #[traced_test]
    #[test]
    fn silent_without_debug() {
        let mut encoder = Encoder::with_config(EngineConfig::default().with_debug(false));
        let mut symbols = SymbolTable::with_capacity(0);
        let mut map = Map::new();
        map.insert("k", Value::custom(Opaque));
        encoder
            .encode(&Value::Map(map), &mut symbols)
            .expect_err("未注册适配器");
        assert!(!logs_contain("lens encode aborted"));
        assert!(!logs_contain("writing key inline"));
    }
}
