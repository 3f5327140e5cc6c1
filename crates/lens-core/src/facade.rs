//! 调用边界上的一次性入口：无需显式构建 [`Encoder`]/[`Decoder`]。
//!
//! 每次调用都会新建编解码器，适合低频场景；热路径请复用 [`Encoder`] 以命中缓冲池。

use std::sync::Arc;

use bytes::Bytes;

use crate::config::{DEFAULT_MAX_DEPTH, EngineConfig};
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::LensError;
use crate::hooks::{ExtensionAdapter, ExtensionHook, TimestampHook};
use crate::symbol::SymbolTable;
use crate::value::Value;

/// 以指定深度上限与可选适配器编码；新驻留的键追加到调用方的 `symbols`。
pub fn encode(
    value: &Value<'_>,
    symbols: &mut SymbolTable,
    extension_adapter: Option<Arc<ExtensionAdapter>>,
    max_depth: usize,
) -> Result<Bytes, LensError> {
    let mut encoder = Encoder::with_config(EngineConfig::default().with_max_depth(max_depth));
    encoder.set_extension_adapter(extension_adapter);
    encoder.encode(value, symbols)
}

/// 以指定的零拷贝开关、钩子与深度上限解码。
pub fn decode<'a>(
    bytes: &'a [u8],
    symbols: &SymbolTable,
    zero_copy: bool,
    extension_hook: Option<Arc<ExtensionHook>>,
    timestamp_hook: Option<Arc<TimestampHook>>,
    max_depth: usize,
) -> Result<Value<'a>, LensError> {
    let config = EngineConfig::default()
        .with_max_depth(max_depth)
        .with_zero_copy(zero_copy);
    let mut decoder = Decoder::with_config(config);
    decoder.set_extension_hook(extension_hook);
    decoder.set_timestamp_hook(timestamp_hook);
    decoder.decode(bytes, symbols)
}

/// 零配置编码：默认深度、无扩展适配器。
pub fn dumps(value: &Value<'_>, symbols: &mut SymbolTable) -> Result<Bytes, LensError> {
    encode(value, symbols, None, DEFAULT_MAX_DEPTH)
}

/// 零配置解码：默认深度、无钩子、复制载荷，结果与输入缓冲无关。
pub fn loads(bytes: &[u8], symbols: &SymbolTable) -> Result<Value<'static>, LensError> {
    decode(bytes, symbols, false, None, None, DEFAULT_MAX_DEPTH).map(Value::into_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Map;

    #[test]
    fn dumps_then_loads_outlives_input() {
        let mut symbols = SymbolTable::new();
        let mut map = Map::new();
        map.insert("blob", vec![1u8, 2, 3]);
        let original = Value::Map(map);

        let restored = {
            let bytes = dumps(&original, &mut symbols).expect("编码成功");
            loads(&bytes, &symbols).expect("解码成功")
        };
        assert_eq!(restored, original);
    }

    #[test]
    fn explicit_depth_is_honoured_on_both_sides() {
        let mut symbols = SymbolTable::new();
        let nested = Value::List(vec![Value::List(vec![])]);
        let err = encode(&nested, &mut symbols, None, 1).expect_err("两层嵌套超过上限 1");
        assert_eq!(err.kind(), crate::ErrorKind::DepthExceeded);

        let bytes = encode(&nested, &mut symbols, None, 2).expect("上限 2 足够");
        let err = decode(&bytes, &symbols, false, None, None, 1).expect_err("解码侧同样受限");
        assert_eq!(err.kind(), crate::ErrorKind::DepthExceeded);
    }
}
