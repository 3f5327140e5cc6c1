//! 扩展适配器与解码钩子的函数签名。
//!
//! 每个角色只有一个回调槽位：编码侧用 [`ExtensionAdapter`] 把 [`crate::Value::Custom`]
//! 翻译成 `(扩展 ID, 载荷)`；解码侧用 [`ExtensionHook`] 与 [`TimestampHook`] 把线上的
//! `EXT`/`TIMESTAMP` 还原成应用值。
//!
//! 钩子返回 `Err` 时整个解码调用失败，错误类别与消息原样保留，阶段改记为解码。

use crate::error::LensError;
use crate::value::{CustomValue, Value};

/// 扩展 ID，线上以 varint 表示，取值限定在 `u32` 范围。
pub type ExtId = u32;

/// 编码侧适配器；返回 `None` 表示拒绝处理，编码以 `UnsupportedType` 失败。
pub type ExtensionAdapter = dyn Fn(&dyn CustomValue) -> Option<(ExtId, Vec<u8>)> + Send + Sync;

/// 解码侧扩展钩子；载荷在钩子返回后不再被引用，需要保留的数据请自行复制。
pub type ExtensionHook = dyn Fn(ExtId, &[u8]) -> Result<Value<'static>, LensError> + Send + Sync;

/// 解码侧时间戳钩子，输入为 Unix 纪元毫秒数。
pub type TimestampHook = dyn Fn(i64) -> Result<Value<'static>, LensError> + Send + Sync;
