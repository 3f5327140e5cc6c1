//! 引擎配置：编码器与解码器在构建时采纳、运行期间不再改变的参数集合。
//!
//! # 教案式说明
//! - **意图 (Why)**：深度上限、符号容量、零拷贝与调试开关都是会话级决策，
//!   显式随编解码器构建传入，避免隐藏的全局状态让并发会话互相影响；
//! - **来源 (How)**：既可在代码中以结构体更新语法构造，也可经 `serde` 从任意格式反序列化；
//!   启用 `toml_config` 特性时提供 [`EngineConfig::from_toml_str`] 快捷入口；
//! - **默认值 (What)**：`max_depth = 128`、`symbol_capacity = 4096`、`symbol_overflow = inline`、
//!   `zero_copy = false`、`debug` 取构建时的进程级开关。

use lens_buffer::PoolConfig;
use serde::{Deserialize, Serialize};

use crate::diagnostics::debug_enabled;
use crate::symbol::SymbolTable;

/// 默认最大嵌套深度（List 与 Map 合并计数）。
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// 符号表已满时编码器如何处理新键。
///
/// - `Inline`：本次出现的键改写为内联 `STR`，调用继续（默认，优雅降级）；
/// - `Reject`：整个编码调用以 `SymbolCapacityReached` 失败。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolOverflowPolicy {
    #[default]
    Inline,
    Reject,
}

/// 编解码器共享的配置。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// 最大嵌套深度；为 0 时任何容器都会触发 `DepthExceeded`。
    pub max_depth: usize,
    /// 通过 [`EngineConfig::new_symbol_table`] 创建的符号表容量。
    pub symbol_capacity: usize,
    pub symbol_overflow: SymbolOverflowPolicy,
    /// 解码 `BYTES`/`EXT` 载荷时借用源缓冲而非复制。
    pub zero_copy: bool,
    /// 失败时附加诊断上下文，并输出 `tracing` 调试事件。
    pub debug: bool,
    pub pool: PoolConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            symbol_capacity: SymbolTable::DEFAULT_CAPACITY,
            symbol_overflow: SymbolOverflowPolicy::Inline,
            zero_copy: false,
            debug: debug_enabled(),
            pool: PoolConfig::default(),
        }
    }
}

impl EngineConfig {
    /// 按配置容量创建空符号表。
    pub fn new_symbol_table(&self) -> SymbolTable {
        SymbolTable::with_capacity(self.symbol_capacity)
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_zero_copy(mut self, zero_copy: bool) -> Self {
        self.zero_copy = zero_copy;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_symbol_overflow(mut self, policy: SymbolOverflowPolicy) -> Self {
        self.symbol_overflow = policy;
        self
    }

    /// 从 TOML 文本解析配置，缺省字段取默认值。
    ///
    /// 文本非法或含未知字段时返回 `Session` 阶段的 `Malformed` 错误。
    #[cfg(feature = "toml_config")]
    pub fn from_toml_str(source: &str) -> Result<Self, crate::LensError> {
        toml::from_str(source).map_err(|err| {
            crate::LensError::new(
                crate::ErrorKind::Malformed,
                format!("invalid engine config: {}", err.message()),
            )
        })
    }
}
