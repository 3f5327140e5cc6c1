//! `lens-core` 实现 Lens 紧凑二进制层级数据格式的编解码引擎。
//!
//! # 模块定位（Why）
//! - 面向“同一批键名、海量小消息”的反复编解码：映射键经由调用方持有的 [`SymbolTable`]
//!   驻留为整数索引，编码暂存区来自 `lens-buffer` 缓冲池；
//! - 解码器直接面对不可信输入：深度上限、长度校验与尾随字节检查保证任何输入都只会得到
//!   确定的 [`LensError`]，不会越界读取或无界分配。
//!
//! # 设计概要（How）
//! - [`wire`]：标签字节与 varint 原语，即线格式版本契约（[`WIRE_VERSION`]）；
//! - [`Value`]：封闭的值模型，外加唯一的 [`Value::Custom`] 槽位承载应用自定义类型；
//! - [`Encoder`]/[`Decoder`]：可复用的编解码器，以显式堆栈遍历容器，配置见 [`EngineConfig`]；
//! - [`encode`]/[`decode`]/[`dumps`]/[`loads`]：一次性调用入口。
//!
//! # 契约说明（What）
//! - 对任意可表示的值 `v`，在两侧符号表内容一致时 `decode(encode(v)) == v`；
//! - 所有失败都会中止整次调用，不返回部分结果；编码失败时符号表保持调用前状态。
//!
//! ```
//! use lens_core::{Map, SymbolTable, Value, dumps, loads};
//!
//! let mut symbols = SymbolTable::new();
//! let mut reading = Map::new();
//! reading.insert("sensor", "t-01");
//! reading.insert("celsius", 21.5);
//!
//! let bytes = dumps(&Value::Map(reading.clone()), &mut symbols).expect("编码失败");
//! assert_eq!(symbols.as_strings(), ["sensor", "celsius"]);
//! assert_eq!(loads(&bytes, &symbols).expect("解码失败"), Value::Map(reading));
//! ```

mod config;
mod decoder;
mod diagnostics;
mod encoder;
mod error;
mod facade;
mod hooks;
mod symbol;
mod value;
pub mod wire;

pub use config::{DEFAULT_MAX_DEPTH, EngineConfig, SymbolOverflowPolicy};
pub use decoder::Decoder;
pub use diagnostics::{Diagnostics, EXCERPT_RADIUS, debug_enabled, set_debug_enabled};
pub use encoder::Encoder;
pub use error::{ErrorKind, LensError, Phase, codes};
pub use facade::{decode, dumps, encode, loads};
pub use hooks::{ExtId, ExtensionAdapter, ExtensionHook, TimestampHook};
pub use symbol::{SymbolId, SymbolTable};
pub use value::{CustomValue, ExtValue, Map, Timestamp, Value};
pub use wire::{Tag, WIRE_VERSION};

pub use lens_buffer::{BufferPool, BufferSource, PoolConfig, PoolStats, SharedBufferPool};

/// crate 版本号，与 `Cargo.toml` 保持一致。
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
