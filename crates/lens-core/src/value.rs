//! 内存值模型：编码器的输入与解码器的输出。
//!
//! # 教案式说明
//! - **意图 (Why)**：线格式只认识一组封闭的值类型；应用自定义类型经由唯一的
//!   [`Value::Custom`] 槽位进入，再由扩展适配器翻译为 `EXT`，无需运行时反射；
//! - **生命周期 (What)**：`Value<'a>` 中只有字节载荷（`Bytes`/`Ext`）可能借用源缓冲，
//!   字符串与键始终拥有所有权；[`Value::into_owned`] 可随时与源缓冲解绑；
//! - **相等性 (Trade-offs)**：浮点按位比较，使 NaN 载荷与正负零都能精确往返；
//!   `Custom` 通过 [`CustomValue::eq_custom`] 比较，类型不同即不等；
//! - **栈占用 (Constraints)**：`Drop`、`Clone`、`PartialEq`、`Debug` 与 `into_owned`
//!   都用堆上工作栈遍历容器，嵌套层数只受内存限制，不受线程栈限制。

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 应用自定义值需要满足的最小能力集合。
///
/// 任何 `Any + Debug + PartialEq + Send + Sync` 类型都通过覆盖实现自动满足，
/// 调用方只需把值放进 [`Value::custom`]。
pub trait CustomValue: fmt::Debug + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;

    /// 与另一个自定义值比较；类型不一致时返回 `false`。
    fn eq_custom(&self, other: &dyn CustomValue) -> bool;

    fn type_name(&self) -> &'static str;
}

impl<T> CustomValue for T
where
    T: Any + fmt::Debug + PartialEq + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_custom(&self, other: &dyn CustomValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Unix 纪元以来的有符号毫秒数（UTC）。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const UNIX_EPOCH: Timestamp = Timestamp(0);

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(self) -> i64 {
        self.0
    }

    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// 从系统时间换算，亚毫秒部分截断，超出 `i64` 范围时饱和。
    pub fn from_system_time(time: SystemTime) -> Self {
        let millis = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
            Err(before) => i64::try_from(before.duration().as_millis())
                .map(|m| -m)
                .unwrap_or(i64::MIN),
        };
        Self(millis)
    }

    /// 换算为系统时间；平台无法表示时返回 `None`。
    pub fn to_system_time(self) -> Option<SystemTime> {
        let magnitude = Duration::from_millis(self.0.unsigned_abs());
        if self.0 >= 0 {
            UNIX_EPOCH.checked_add(magnitude)
        } else {
            UNIX_EPOCH.checked_sub(magnitude)
        }
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        Self::from_system_time(time)
    }
}

/// 未解析的扩展值：扩展 ID 与原样保留的载荷。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExtValue<'a> {
    pub id: u32,
    pub payload: Cow<'a, [u8]>,
}

impl<'a> ExtValue<'a> {
    pub fn new(id: u32, payload: impl Into<Cow<'a, [u8]>>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    pub fn into_owned(self) -> ExtValue<'static> {
        ExtValue {
            id: self.id,
            payload: Cow::Owned(self.payload.into_owned()),
        }
    }
}

/// 保序、键唯一的映射。
///
/// 线格式按插入顺序写出条目，解码结果保持相同顺序；因此相等性是有序比较。
#[derive(Clone, Default, PartialEq)]
pub struct Map<'a> {
    entries: Vec<(String, Value<'a>)>,
}

impl<'a> Map<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// 插入条目；键已存在时原位替换并返回旧值，顺序不变。
    ///
    /// 单次插入线性查找已有键。批量构建宽映射请用 `collect` 或 [`Extend`]，
    /// 二者借助临时索引保持整体线性。
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value<'a>>,
    ) -> Option<Value<'a>> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value<'a>> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (String, Value<'a>)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn into_owned(self) -> Map<'static> {
        Map {
            entries: self
                .entries
                .into_iter()
                .map(|(key, value)| (key, value.into_owned()))
                .collect(),
        }
    }

    /// 解码器已经保证键唯一，直接接管条目。
    pub(crate) fn from_unique_entries(entries: Vec<(String, Value<'a>)>) -> Self {
        Self { entries }
    }
}

impl fmt::Debug for Map<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(key, value)| (key, value)))
            .finish()
    }
}

/// 与 [`Map::insert`] 语义一致：重复键原位替换。
impl<'a, K, V> Extend<(K, V)> for Map<'a>
where
    K: Into<String>,
    V: Into<Value<'a>>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        let mut index: HashMap<String, usize> = self
            .entries
            .iter()
            .enumerate()
            .map(|(slot, (key, _))| (key.clone(), slot))
            .collect();
        for (key, value) in iter {
            let key = key.into();
            let value = value.into();
            match index.get(&key) {
                Some(&slot) => self.entries[slot].1 = value,
                None => {
                    index.insert(key.clone(), self.entries.len());
                    self.entries.push((key, value));
                }
            }
        }
    }
}

impl<'a, K, V> FromIterator<(K, V)> for Map<'a>
where
    K: Into<String>,
    V: Into<Value<'a>>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Map::new();
        map.extend(iter);
        map
    }
}

impl<'a> IntoIterator for Map<'a> {
    type Item = (String, Value<'a>);
    type IntoIter = std::vec::IntoIter<(String, Value<'a>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'m, 'a> IntoIterator for &'m Map<'a> {
    type Item = &'m (String, Value<'a>);
    type IntoIter = std::slice::Iter<'m, (String, Value<'a>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Lens 值。
///
/// # 契约说明（What）
/// - `Bytes`/`Ext` 的载荷在零拷贝解码时为 `Cow::Borrowed`，别名调用方的源缓冲；
/// - `Custom` 只能经由扩展适配器编码，未配置或适配器拒绝时编码失败为 `UnsupportedType`。
pub enum Value<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Cow<'a, [u8]>),
    Timestamp(Timestamp),
    List(Vec<Value<'a>>),
    Map(Map<'a>),
    Ext(ExtValue<'a>),
    Custom(Arc<dyn CustomValue>),
}

impl<'a> Value<'a> {
    /// 把应用自定义值包装进 `Custom` 槽位。
    pub fn custom<T: CustomValue>(value: T) -> Self {
        Value::Custom(Arc::new(value))
    }

    /// 类型名，用于错误消息与诊断。
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Ext(_) => "ext",
            Value::Custom(_) => "custom",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value<'a>]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map<'a>> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ext(&self) -> Option<&ExtValue<'a>> {
        match self {
            Value::Ext(v) => Some(v),
            _ => None,
        }
    }

    /// 若为指定类型的自定义值则返回其引用。
    pub fn downcast_custom<T: 'static>(&self) -> Option<&T> {
        match self {
            Value::Custom(v) => v.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// 与源缓冲解绑：借用的字节载荷被复制为自有存储。
    ///
    /// 与 `Clone` 相同的工作栈遍历：下行时拆出容器的剩余子元素，
    /// 上行时把完成的子值交给栈顶帧，帧耗尽即收拢为容器。
    pub fn into_owned(self) -> Value<'static> {
        let mut stack: Vec<Detach<'a>> = Vec::new();
        let mut next = self;
        'descend: loop {
            let mut built = match &mut next {
                Value::List(items) => {
                    let mut rest = mem::take(items).into_iter();
                    match rest.next() {
                        Some(first) => {
                            stack.push(Detach::List(Vec::with_capacity(rest.len() + 1), rest));
                            next = first;
                            continue 'descend;
                        }
                        None => Value::List(Vec::new()),
                    }
                }
                Value::Map(map) => {
                    let mut rest = mem::take(&mut map.entries).into_iter();
                    match rest.next() {
                        Some((key, first)) => {
                            stack.push(Detach::Map(
                                Vec::with_capacity(rest.len() + 1),
                                rest,
                                key,
                            ));
                            next = first;
                            continue 'descend;
                        }
                        None => Value::Map(Map::new()),
                    }
                }
                Value::Null => Value::Null,
                Value::Bool(v) => Value::Bool(*v),
                Value::Int(v) => Value::Int(*v),
                Value::Float(v) => Value::Float(*v),
                Value::Str(v) => Value::Str(mem::take(v)),
                Value::Bytes(v) => Value::Bytes(Cow::Owned(mem::take(v).into_owned())),
                Value::Timestamp(v) => Value::Timestamp(*v),
                Value::Ext(ext) => Value::Ext(ExtValue {
                    id: ext.id,
                    payload: Cow::Owned(mem::take(&mut ext.payload).into_owned()),
                }),
                Value::Custom(v) => Value::Custom(Arc::clone(v)),
            };
            while let Some(mut frame) = stack.pop() {
                frame.accept(built);
                match frame.next_child() {
                    Some(child) => {
                        stack.push(frame);
                        next = child;
                        continue 'descend;
                    }
                    None => built = frame.finish(),
                }
            }
            return built;
        }
    }
}

/// `into_owned` 的工作栈帧：已完成的子值与尚未处理的子元素。
enum Detach<'a> {
    List(Vec<Value<'static>>, std::vec::IntoIter<Value<'a>>),
    Map(
        Vec<(String, Value<'static>)>,
        std::vec::IntoIter<(String, Value<'a>)>,
        String,
    ),
}

impl<'a> Detach<'a> {
    fn accept(&mut self, value: Value<'static>) {
        match self {
            Detach::List(done, _) => done.push(value),
            Detach::Map(done, _, key) => done.push((mem::take(key), value)),
        }
    }

    fn next_child(&mut self) -> Option<Value<'a>> {
        match self {
            Detach::List(_, rest) => rest.next(),
            Detach::Map(_, rest, key) => rest.next().map(|(next_key, value)| {
                *key = next_key;
                value
            }),
        }
    }

    fn finish(self) -> Value<'static> {
        match self {
            Detach::List(done, _) => Value::List(done),
            Detach::Map(done, _, _) => Value::Map(Map::from_unique_entries(done)),
        }
    }
}

/// `Clone` 的工作栈帧，借用原值逐个复制子元素。
enum Rebuild<'v, 'a> {
    List(Vec<Value<'a>>, std::slice::Iter<'v, Value<'a>>),
    Map(
        Vec<(String, Value<'a>)>,
        std::slice::Iter<'v, (String, Value<'a>)>,
        String,
    ),
}

impl<'v, 'a> Rebuild<'v, 'a> {
    fn accept(&mut self, value: Value<'a>) {
        match self {
            Rebuild::List(done, _) => done.push(value),
            Rebuild::Map(done, _, key) => done.push((mem::take(key), value)),
        }
    }

    fn next_child(&mut self) -> Option<&'v Value<'a>> {
        match self {
            Rebuild::List(_, rest) => rest.next(),
            Rebuild::Map(_, rest, key) => rest.next().map(|(next_key, value)| {
                key.clone_from(next_key);
                value
            }),
        }
    }

    fn finish(self) -> Value<'a> {
        match self {
            Rebuild::List(done, _) => Value::List(done),
            Rebuild::Map(done, _, _) => Value::Map(Map::from_unique_entries(done)),
        }
    }
}

impl<'a> Clone for Value<'a> {
    fn clone(&self) -> Self {
        let mut stack: Vec<Rebuild<'_, 'a>> = Vec::new();
        let mut next = self;
        'descend: loop {
            let mut built = match next {
                Value::List(items) => match items.split_first() {
                    Some((first, rest)) => {
                        stack.push(Rebuild::List(Vec::with_capacity(items.len()), rest.iter()));
                        next = first;
                        continue 'descend;
                    }
                    None => Value::List(Vec::new()),
                },
                Value::Map(map) => match map.entries.split_first() {
                    Some(((key, first), rest)) => {
                        stack.push(Rebuild::Map(
                            Vec::with_capacity(map.len()),
                            rest.iter(),
                            key.clone(),
                        ));
                        next = first;
                        continue 'descend;
                    }
                    None => Value::Map(Map::new()),
                },
                Value::Null => Value::Null,
                Value::Bool(v) => Value::Bool(*v),
                Value::Int(v) => Value::Int(*v),
                Value::Float(v) => Value::Float(*v),
                Value::Str(v) => Value::Str(v.clone()),
                Value::Bytes(v) => Value::Bytes(v.clone()),
                Value::Timestamp(v) => Value::Timestamp(*v),
                Value::Ext(v) => Value::Ext(v.clone()),
                Value::Custom(v) => Value::Custom(Arc::clone(v)),
            };
            while let Some(mut frame) = stack.pop() {
                frame.accept(built);
                match frame.next_child() {
                    Some(child) => {
                        stack.push(frame);
                        next = child;
                        continue 'descend;
                    }
                    None => built = frame.finish(),
                }
            }
            return built;
        }
    }
}

/// 容器的子元素先移入工作栈再逐个释放，每个值被释放时都已没有嵌套子容器。
impl Drop for Value<'_> {
    fn drop(&mut self) {
        let mut pending = match self {
            Value::List(items) if !items.is_empty() => mem::take(items),
            Value::Map(map) if !map.is_empty() => mem::take(&mut map.entries)
                .into_iter()
                .map(|(_, value)| value)
                .collect(),
            _ => return,
        };
        while let Some(mut value) = pending.pop() {
            match &mut value {
                Value::List(items) => pending.append(items),
                Value::Map(map) => pending.extend(map.entries.drain(..).map(|(_, value)| value)),
                _ => {}
            }
        }
    }
}

impl PartialEq for Value<'_> {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some(pair) = pending.pop() {
            let same = match pair {
                (Value::List(a), Value::List(b)) => {
                    pending.extend(a.iter().zip(b));
                    a.len() == b.len()
                }
                (Value::Map(a), Value::Map(b)) => {
                    let mut keys_match = a.len() == b.len();
                    for ((key_a, value_a), (key_b, value_b)) in a.iter().zip(b) {
                        keys_match &= key_a == key_b;
                        pending.push((value_a, value_b));
                    }
                    keys_match
                }
                (Value::Null, Value::Null) => true,
                (Value::Bool(a), Value::Bool(b)) => a == b,
                (Value::Int(a), Value::Int(b)) => a == b,
                (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
                (Value::Str(a), Value::Str(b)) => a == b,
                (Value::Bytes(a), Value::Bytes(b)) => a == b,
                (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
                (Value::Ext(a), Value::Ext(b)) => a == b,
                (Value::Custom(a), Value::Custom(b)) => a.eq_custom(b.as_ref()),
                _ => false,
            };
            if !same {
                return false;
            }
        }
        true
    }
}

/// 形如派生实现（`List([Int(1)])`、`Map({"k": Null})`），但不递归；忽略 `{:#?}` 的换行排版。
impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        enum Walk<'v, 'a> {
            List(std::slice::Iter<'v, Value<'a>>),
            Map(std::slice::Iter<'v, (String, Value<'a>)>),
        }

        let mut stack: Vec<(Walk<'_, '_>, bool)> = Vec::new();
        let mut next = Some(self);
        loop {
            if let Some(value) = next.take() {
                match value {
                    Value::List(items) => {
                        f.write_str("List([")?;
                        stack.push((Walk::List(items.iter()), true));
                    }
                    Value::Map(map) => {
                        f.write_str("Map({")?;
                        stack.push((Walk::Map(map.entries.iter()), true));
                    }
                    Value::Null => f.write_str("Null")?,
                    Value::Bool(v) => write!(f, "Bool({v:?})")?,
                    Value::Int(v) => write!(f, "Int({v:?})")?,
                    Value::Float(v) => write!(f, "Float({v:?})")?,
                    Value::Str(v) => write!(f, "Str({v:?})")?,
                    Value::Bytes(v) => write!(f, "Bytes({v:?})")?,
                    Value::Timestamp(v) => write!(f, "Timestamp({v:?})")?,
                    Value::Ext(v) => write!(f, "Ext({v:?})")?,
                    Value::Custom(v) => write!(f, "Custom({v:?})")?,
                }
            }

            let Some((walk, first)) = stack.last_mut() else {
                return Ok(());
            };
            let separator = if mem::replace(first, false) { "" } else { ", " };
            let (step, close) = match walk {
                Walk::List(items) => (items.next().map(|item| (None, item)), "])"),
                Walk::Map(entries) => (
                    entries.next().map(|(key, item)| (Some(key), item)),
                    "})",
                ),
            };
            match step {
                Some((key, item)) => {
                    f.write_str(separator)?;
                    if let Some(key) = key {
                        write!(f, "{key:?}: ")?;
                    }
                    next = Some(item);
                }
                None => {
                    f.write_str(close)?;
                    stack.pop();
                }
            }
        }
    }
}

impl From<()> for Value<'_> {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value<'_> {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value<'_> {
            fn from(v: $ty) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value<'_> {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value<'_> {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value<'_> {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value<'_> {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value<'_> {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(Cow::Owned(v))
    }
}

impl<'a> From<&'a [u8]> for Value<'a> {
    fn from(v: &'a [u8]) -> Self {
        Value::Bytes(Cow::Borrowed(v))
    }
}

impl From<Timestamp> for Value<'_> {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v)
    }
}

impl<'a> From<Vec<Value<'a>>> for Value<'a> {
    fn from(v: Vec<Value<'a>>) -> Self {
        Value::List(v)
    }
}

impl<'a> From<Map<'a>> for Value<'a> {
    fn from(v: Map<'a>) -> Self {
        Value::Map(v)
    }
}

impl<'a> From<ExtValue<'a>> for Value<'a> {
    fn from(v: ExtValue<'a>) -> Self {
        Value::Ext(v)
    }
}

impl<'a, T: Into<Value<'a>>> From<Option<T>> for Value<'a> {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
