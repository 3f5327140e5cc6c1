//! 解码器：单次前向扫描，把 Lens 线格式字节还原为 [`Value`]。
//!
//! # 教案式说明
//! - **意图 (Why)**：输入来自不可信来源，解码器必须在任何字节序列上都给出确定的错误，
//!   绝不越界读取、绝不因深度或长度声明而无界分配；
//! - **机制 (How)**：
//!   - 以显式栈记录尚未填满的容器（已收集的子元素与剩余个数），读到容器标签即检查深度，
//!     在消费计数字节之前就拒绝过深的嵌套；
//!   - 每个长度或计数都先与剩余字节数比较：字符串、字节与扩展载荷的长度不得超过剩余字节；
//!     列表每个元素至少 1 字节、映射每个条目至少 2 字节，据此拒绝不可能满足的计数；
//!   - 预分配容量额外封顶，计数只是提示而非承诺；
//! - **契约 (What)**：一次调用恰好消费一个顶层值并耗尽整个输入；失败时不会泄露任何部分容器；
//! - **零拷贝 (Trade-offs)**：开启后 `BYTES`/`EXT` 载荷以 `Cow::Borrowed` 别名源缓冲，
//!   借用检查器保证视图不能比源缓冲活得更久；关闭时复制为自有存储。

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::EngineConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{ErrorKind, LensError, Phase};
use crate::hooks::{ExtId, ExtensionHook, TimestampHook};
use crate::symbol::{SymbolId, SymbolTable};
use crate::value::{ExtValue, Map, Timestamp, Value};
use crate::wire::{self, Tag};

/// 依据声明计数预分配时的容量上限。
const PREALLOC_LIMIT: usize = 4096;

/// 可复用的解码器，持有配置与可选的扩展、时间戳钩子。
///
/// 解码只需要 `&self`，同一个解码器可以被多个线程同时使用。
#[derive(Clone, Default)]
pub struct Decoder {
    config: EngineConfig,
    extension_hook: Option<Arc<ExtensionHook>>,
    timestamp_hook: Option<Arc<TimestampHook>>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            extension_hook: None,
            timestamp_hook: None,
        }
    }

    /// 注册扩展钩子：`EXT` 值交给钩子还原，而不是以 [`Value::Ext`] 原样返回。
    pub fn with_extension_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(ExtId, &[u8]) -> Result<Value<'static>, LensError> + Send + Sync + 'static,
    {
        self.extension_hook = Some(Arc::new(hook));
        self
    }

    /// 注册时间戳钩子：`TIMESTAMP` 值交给钩子还原，而不是以 [`Value::Timestamp`] 返回。
    pub fn with_timestamp_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(i64) -> Result<Value<'static>, LensError> + Send + Sync + 'static,
    {
        self.timestamp_hook = Some(Arc::new(hook));
        self
    }

    pub fn set_extension_hook(&mut self, hook: Option<Arc<ExtensionHook>>) {
        self.extension_hook = hook;
    }

    pub fn set_timestamp_hook(&mut self, hook: Option<Arc<TimestampHook>>) {
        self.timestamp_hook = hook;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 解码单个顶层值。
    ///
    /// # 契约说明（What）
    /// - **前置条件**：`symbols` 与编码时使用的符号表内容一致（至少覆盖输入引用的全部索引）；
    /// - **后置条件**：返回值中借用的载荷生命周期与 `input` 绑定；
    /// - **错误**：详见模块文档，失败时不返回任何部分结果。
    ///
    /// 零拷贝视图不能比源缓冲活得更久，以下代码无法通过编译：
    ///
    /// ```compile_fail
    /// use lens_core::{Decoder, EngineConfig, SymbolTable};
    ///
    /// let decoder = Decoder::with_config(EngineConfig::default().with_zero_copy(true));
    /// let symbols = SymbolTable::new();
    /// let view = {
    ///     let source = vec![0x09, 0x01, 0xAB];
    ///     decoder.decode(&source, &symbols).expect("合法输入")
    /// };
    /// println!("{view:?}");
    /// ```
    ///
    /// 在源缓冲存活期间使用视图则完全合法：
    ///
    /// ```
    /// use lens_core::{Decoder, EngineConfig, SymbolTable, Value};
    ///
    /// let decoder = Decoder::with_config(EngineConfig::default().with_zero_copy(true));
    /// let symbols = SymbolTable::new();
    /// let source = vec![0x09, 0x01, 0xAB];
    /// let view = decoder.decode(&source, &symbols).expect("合法输入");
    /// assert_eq!(view.as_bytes(), Some(&[0xAB][..]));
    /// ```
    pub fn decode<'a>(
        &self,
        input: &'a [u8],
        symbols: &SymbolTable,
    ) -> Result<Value<'a>, LensError> {
        let mut run = DecodeRun {
            input,
            pos: 0,
            symbols,
            decoder: self,
            stack: Vec::new(),
            current: None,
        };
        match run.run() {
            Ok(value) => Ok(value),
            Err(err) => {
                let err = run.fail(err);
                if self.config.debug {
                    debug!(
                        code = err.code(),
                        offset = ?err.offset(),
                        "lens decode aborted: {}",
                        err.message()
                    );
                }
                Err(err)
            }
        }
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("config", &self.config)
            .field("has_extension_hook", &self.extension_hook.is_some())
            .field("has_timestamp_hook", &self.timestamp_hook.is_some())
            .finish()
    }
}

/// 尚未填满的容器。
enum Pending<'a> {
    List {
        items: Vec<Value<'a>>,
        remaining: usize,
    },
    Map {
        entries: Vec<(String, Value<'a>)>,
        key: Option<String>,
        remaining: usize,
    },
}

impl Pending<'_> {
    fn tag(&self) -> Tag {
        match self {
            Pending::List { .. } => Tag::List,
            Pending::Map { .. } => Tag::Map,
        }
    }
}

struct DecodeRun<'d, 'a> {
    input: &'a [u8],
    pos: usize,
    symbols: &'d SymbolTable,
    decoder: &'d Decoder,
    stack: Vec<Pending<'a>>,
    /// 最近读取的标签，用于诊断路径。
    current: Option<Tag>,
}

impl<'a> DecodeRun<'_, 'a> {
    fn run(&mut self) -> Result<Value<'a>, LensError> {
        loop {
            if matches!(self.stack.last(), Some(Pending::Map { key: None, .. })) {
                let key = self.read_key()?;
                if let Some(Pending::Map { key: slot, .. }) = self.stack.last_mut() {
                    *slot = Some(key);
                }
            }

            let Some(value) = self.read_value()? else {
                continue;
            };
            if let Some(root) = self.settle(value)? {
                return self.finish(root);
            }
        }
    }

    fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    fn truncated(&self, needed: usize) -> LensError {
        LensError::decode(
            ErrorKind::Truncated,
            format!("need {needed} bytes, {} remain", self.remaining()),
        )
        .with_offset(self.pos)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], LensError> {
        if len > self.remaining() {
            return Err(self.truncated(len));
        }
        let input = self.input;
        let slice = &input[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn fixed<const N: usize>(&mut self) -> Result<[u8; N], LensError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_tag(&mut self) -> Result<Tag, LensError> {
        let offset = self.pos;
        let [byte] = self.fixed::<1>()?;
        let tag = Tag::from_byte(byte).ok_or_else(|| {
            LensError::decode(ErrorKind::InvalidTag, format!("unknown tag byte 0x{byte:02x}"))
                .with_offset(offset)
        })?;
        self.current = Some(tag);
        Ok(tag)
    }

    fn varint(&mut self) -> Result<u64, LensError> {
        let start = self.pos;
        match wire::read_varint(&self.input[start..]) {
            Ok((value, used)) => {
                self.pos += used;
                Ok(value)
            }
            Err(err) => {
                let relative = err.offset().unwrap_or(0);
                Err(err.with_offset(start + relative))
            }
        }
    }

    /// 读取长度前缀，并确认剩余字节足以容纳。
    fn length(&mut self) -> Result<usize, LensError> {
        let declared = self.varint()?;
        match usize::try_from(declared) {
            Ok(len) if len <= self.remaining() => Ok(len),
            _ => Err(LensError::decode(
                ErrorKind::Truncated,
                format!(
                    "declared length {declared} exceeds {} remaining bytes",
                    self.remaining()
                ),
            )
            .with_offset(self.pos)),
        }
    }

    fn utf8(&mut self) -> Result<String, LensError> {
        let len = self.length()?;
        let start = self.pos;
        let raw = self.take(len)?;
        std::str::from_utf8(raw).map(str::to_owned).map_err(|err| {
            LensError::decode(ErrorKind::Malformed, format!("invalid utf-8 in string: {err}"))
                .with_offset(start + err.valid_up_to())
        })
    }

    fn payload(&mut self) -> Result<Cow<'a, [u8]>, LensError> {
        let len = self.length()?;
        let raw = self.take(len)?;
        Ok(if self.decoder.config.zero_copy {
            Cow::Borrowed(raw)
        } else {
            Cow::Owned(raw.to_vec())
        })
    }

    /// 读取映射键：只接受 `STR` 与 `SYMREF`。
    fn read_key(&mut self) -> Result<String, LensError> {
        let offset = self.pos;
        match self.read_tag()? {
            Tag::Str => self.utf8(),
            Tag::SymRef => {
                let index = self.varint()?;
                let id = u32::try_from(index).map(SymbolId).map_err(|_| {
                    LensError::decode(
                        ErrorKind::UnknownSymbol,
                        format!("symbol index {index} out of range"),
                    )
                    .with_offset(offset)
                })?;
                self.symbols
                    .resolve(id)
                    .map(str::to_owned)
                    .map_err(|err| err.with_phase(Phase::Decode).with_offset(offset))
            }
            other => Err(LensError::decode(
                ErrorKind::Malformed,
                format!("tag {other} cannot be used as a map key"),
            )
            .with_offset(offset)),
        }
    }

    /// 读取一个值；打开非空容器时返回 `None`，其子元素由后续循环填充。
    fn read_value(&mut self) -> Result<Option<Value<'a>>, LensError> {
        let offset = self.pos;
        let tag = self.read_tag()?;
        let value = match tag {
            Tag::Null => Value::Null,
            Tag::False => Value::Bool(false),
            Tag::True => Value::Bool(true),
            Tag::Int8 => Value::Int(i64::from(i8::from_le_bytes(self.fixed()?))),
            Tag::Int16 => Value::Int(i64::from(i16::from_le_bytes(self.fixed()?))),
            Tag::Int32 => Value::Int(i64::from(i32::from_le_bytes(self.fixed()?))),
            Tag::Int64 => Value::Int(i64::from_le_bytes(self.fixed()?)),
            Tag::Float64 => Value::Float(f64::from_le_bytes(self.fixed()?)),
            Tag::Str => Value::Str(self.utf8()?),
            Tag::Bytes => Value::Bytes(self.payload()?),
            Tag::SymRef => {
                return Err(LensError::decode(
                    ErrorKind::Malformed,
                    "symbol reference outside map key position",
                )
                .with_offset(offset));
            }
            Tag::Timestamp => {
                let millis = i64::from_le_bytes(self.fixed()?);
                match self.decoder.timestamp_hook.as_deref() {
                    Some(hook) => hook(millis).map_err(|err| self.hook_error(err, offset))?,
                    None => Value::Timestamp(Timestamp::from_millis(millis)),
                }
            }
            Tag::Ext => {
                let raw_id = self.varint()?;
                let id = ExtId::try_from(raw_id).map_err(|_| {
                    LensError::decode(
                        ErrorKind::Malformed,
                        format!("extension id {raw_id} exceeds u32 range"),
                    )
                    .with_offset(offset)
                })?;
                let payload = self.payload()?;
                match self.decoder.extension_hook.as_deref() {
                    Some(hook) => {
                        hook(id, &payload[..]).map_err(|err| self.hook_error(err, offset))?
                    }
                    None => Value::Ext(ExtValue { id, payload }),
                }
            }
            Tag::List | Tag::Map => return self.open_container(tag),
        };
        Ok(Some(value))
    }

    /// 深度检查先于计数读取；空容器直接产出值，非空容器压栈。
    fn open_container(&mut self, tag: Tag) -> Result<Option<Value<'a>>, LensError> {
        let depth = self.stack.len() + 1;
        let max_depth = self.decoder.config.max_depth;
        if depth > max_depth {
            return Err(LensError::decode(
                ErrorKind::DepthExceeded,
                format!("nesting depth {depth} exceeds configured limit {max_depth}"),
            )
            .with_offset(self.pos - 1));
        }

        let declared = self.varint()?;
        let min_bytes_per_item: u64 = if tag == Tag::Map { 2 } else { 1 };
        let count = declared
            .checked_mul(min_bytes_per_item)
            .filter(|&needed| needed <= self.remaining() as u64)
            .and_then(|_| usize::try_from(declared).ok())
            .ok_or_else(|| {
                LensError::decode(
                    ErrorKind::Truncated,
                    format!(
                        "{tag} declares {declared} items but only {} bytes remain",
                        self.remaining()
                    ),
                )
                .with_offset(self.pos)
            })?;

        let capacity = count.min(PREALLOC_LIMIT);
        match (tag, count) {
            (Tag::List, 0) => Ok(Some(Value::List(Vec::new()))),
            (_, 0) => Ok(Some(Value::Map(Map::new()))),
            (Tag::List, _) => {
                self.stack.push(Pending::List {
                    items: Vec::with_capacity(capacity),
                    remaining: count,
                });
                Ok(None)
            }
            _ => {
                self.stack.push(Pending::Map {
                    entries: Vec::with_capacity(capacity),
                    key: None,
                    remaining: count,
                });
                Ok(None)
            }
        }
    }

    /// 把完成的值交给栈顶容器；容器因此填满时逐层收拢。返回 `Some` 表示顶层值已完成。
    fn settle(&mut self, mut value: Value<'a>) -> Result<Option<Value<'a>>, LensError> {
        loop {
            let Some(mut top) = self.stack.pop() else {
                return Ok(Some(value));
            };
            let complete = match &mut top {
                Pending::List { items, remaining } => {
                    items.push(value);
                    *remaining -= 1;
                    *remaining == 0
                }
                Pending::Map {
                    entries,
                    key,
                    remaining,
                } => {
                    let Some(key) = key.take() else {
                        return Err(LensError::decode(
                            ErrorKind::Malformed,
                            "map value without a key",
                        )
                        .with_offset(self.pos));
                    };
                    entries.push((key, value));
                    *remaining -= 1;
                    *remaining == 0
                }
            };
            if !complete {
                self.stack.push(top);
                return Ok(None);
            }
            value = match top {
                Pending::List { items, .. } => Value::List(items),
                Pending::Map { entries, .. } => {
                    self.current = Some(Tag::Map);
                    Value::Map(self.close_map(entries)?)
                }
            };
        }
    }

    fn close_map(&self, entries: Vec<(String, Value<'a>)>) -> Result<Map<'a>, LensError> {
        {
            let mut seen = HashSet::with_capacity(entries.len());
            for (key, _) in &entries {
                if !seen.insert(key.as_str()) {
                    return Err(LensError::decode(
                        ErrorKind::Malformed,
                        format!("duplicate map key {key:?}"),
                    )
                    .with_offset(self.pos));
                }
            }
        }
        Ok(Map::from_unique_entries(entries))
    }

    fn finish(&self, root: Value<'a>) -> Result<Value<'a>, LensError> {
        if self.pos != self.input.len() {
            return Err(LensError::decode(
                ErrorKind::TrailingData,
                format!("{} bytes left after top-level value", self.remaining()),
            )
            .with_offset(self.pos));
        }
        Ok(root)
    }

    fn hook_error(&self, err: LensError, offset: usize) -> LensError {
        let err = err.with_phase(Phase::Decode);
        match err.offset() {
            Some(_) => err,
            None => err.with_offset(offset),
        }
    }

    /// 补齐阶段与偏移；调试模式下附加容器路径与输入片段。
    fn fail(&self, err: LensError) -> LensError {
        let offset = err.offset().unwrap_or(self.pos);
        let err = err.with_phase(Phase::Decode).with_offset(offset);
        if !self.decoder.config.debug {
            return err;
        }
        let mut path: Vec<Tag> = self.stack.iter().map(Pending::tag).collect();
        path.extend(self.current);
        err.with_diagnostics(Diagnostics::new(path, offset, self.input))
    }
}
