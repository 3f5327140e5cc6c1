//! 符号表：跨消息复用的映射键字符串驻留表。
//!
//! # 教案式说明
//! - **意图 (Why)**：大量消息共享同一组键名，驻留后每个键在线上只占一个 `SYMREF` 索引；
//! - **契约 (What)**：
//!   - 索引即首次出现的位置，一经分配永不改变（只追加）；
//!   - 表由调用方持有并显式传入每次调用，引擎内部从不保存或替换它；
//!   - 容量有上限，满后 [`SymbolTable::intern`] 返回 `SymbolCapacityReached`，
//!     是否降级为内联键由编码器的溢出策略决定；
//! - **并发 (Trade-offs)**：不做内部同步，写入需要 `&mut`，多会话并发请各持一张表。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ErrorKind, LensError, Phase};

/// 符号在表中的索引。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

impl SymbolId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 有界、只追加的键字符串表。
#[derive(Clone, Debug)]
pub struct SymbolTable {
    symbols: Vec<Arc<str>>,
    index: HashMap<Arc<str>, u32>,
    capacity: usize,
}

impl SymbolTable {
    pub const DEFAULT_CAPACITY: usize = 4096;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// 创建指定容量上限的空表；上限同时被截断到 `u32` 可寻址范围。
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            symbols: Vec::new(),
            index: HashMap::new(),
            capacity: capacity.min(u32::MAX as usize),
        }
    }

    /// 以给定顺序构建表，常用于解码侧复原一个会话的符号表。
    ///
    /// 容量取默认值与条目数中的较大者；出现重复条目时返回 `Malformed`。
    pub fn from_symbols<I, S>(symbols: I) -> Result<Self, LensError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for symbol in symbols {
            table.push_unique(symbol.as_ref())?;
        }
        Ok(table)
    }

    fn push_unique(&mut self, symbol: &str) -> Result<(), LensError> {
        if self.index.contains_key(symbol) {
            return Err(LensError::new(
                ErrorKind::Malformed,
                format!("duplicate symbol {symbol:?} in table"),
            )
            .with_phase(Phase::Session));
        }
        if self.symbols.len() >= self.capacity {
            self.capacity = self.symbols.len() + 1;
        }
        self.append(symbol);
        Ok(())
    }

    fn append(&mut self, symbol: &str) -> SymbolId {
        let id = self.symbols.len() as u32;
        let shared: Arc<str> = Arc::from(symbol);
        self.index.insert(Arc::clone(&shared), id);
        self.symbols.push(shared);
        SymbolId(id)
    }

    /// 驻留键字符串。
    ///
    /// - 已存在：返回原索引，表不变；
    /// - 不存在且未满：追加并返回新索引；
    /// - 不存在且已满：返回 `SymbolCapacityReached`，表不变。
    pub fn intern(&mut self, key: &str) -> Result<SymbolId, LensError> {
        if let Some(&id) = self.index.get(key) {
            return Ok(SymbolId(id));
        }
        if self.symbols.len() >= self.capacity {
            return Err(LensError::new(
                ErrorKind::SymbolCapacityReached,
                format!("no slot available (capacity {})", self.capacity),
            ));
        }
        Ok(self.append(key))
    }

    /// 按索引解析键字符串；越界时返回 `UnknownSymbol`。
    pub fn resolve(&self, id: SymbolId) -> Result<&str, LensError> {
        self.symbols
            .get(id.index())
            .map(|symbol| symbol.as_ref())
            .ok_or_else(|| {
                LensError::new(
                    ErrorKind::UnknownSymbol,
                    format!("symbol {id} not in table of {} entries", self.symbols.len()),
                )
            })
    }

    pub fn index_of(&self, key: &str) -> Option<SymbolId> {
        self.index.get(key).copied().map(SymbolId)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.symbols.len() >= self.capacity
    }

    /// 按索引顺序遍历。
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &str> {
        self.symbols.iter().map(|symbol| symbol.as_ref())
    }

    pub fn as_strings(&self) -> Vec<String> {
        self.iter().map(str::to_owned).collect()
    }

    pub(crate) fn checkpoint(&self) -> usize {
        self.symbols.len()
    }

    /// 撤销 `checkpoint` 之后追加的符号。
    pub(crate) fn rollback(&mut self, checkpoint: usize) {
        for symbol in self.symbols.drain(checkpoint.min(self.symbols.len())..) {
            self.index.remove(&symbol);
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for SymbolTable {
    fn eq(&self, other: &Self) -> bool {
        self.symbols == other.symbols
    }
}

impl Eq for SymbolTable {}

impl Serialize for SymbolTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.symbols.len()))?;
        for symbol in &self.symbols {
            seq.serialize_element(symbol.as_ref())?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for SymbolTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SymbolsVisitor;

        impl<'de> Visitor<'de> for SymbolsVisitor {
            type Value = SymbolTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a sequence of unique symbol strings")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<SymbolTable, A::Error> {
                let mut table = SymbolTable::new();
                while let Some(symbol) = seq.next_element::<String>()? {
                    table
                        .push_unique(&symbol)
                        .map_err(<A::Error as serde::de::Error>::custom)?;
                }
                Ok(table)
            }
        }

        deserializer.deserialize_seq(SymbolsVisitor)
    }
}
