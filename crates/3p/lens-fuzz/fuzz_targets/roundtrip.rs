#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use lens_core::{Decoder, Encoder, EngineConfig, ExtValue, Map, Timestamp, Value};

/// 结构化输入：由 fuzzer 生成的值树与会话参数。
///
/// - **Why**：差分比较“编码前的值”与“解码得到的值”，覆盖符号驻留与内联降级的组合；
/// - **What**：`symbol_capacity` 很小，迫使部分键走内联路径。
#[derive(Debug, Arbitrary)]
struct RoundtripCase {
    value: FuzzValue,
    symbol_capacity: u8,
    zero_copy: bool,
}

#[derive(Debug, Arbitrary)]
enum FuzzValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
    Bytes(Vec<u8>),
    Timestamp(i64),
    Ext(u32, Vec<u8>),
    List(Vec<FuzzValue>),
    Map(Vec<(String, FuzzValue)>),
}

/// 超过 `MAX_NESTING` 的容器折叠为 `Null`，把深度守卫留给专门的测试。
const MAX_NESTING: usize = 32;

fn lower(value: &FuzzValue, depth: usize) -> Value<'static> {
    match value {
        FuzzValue::Null => Value::Null,
        FuzzValue::Bool(v) => Value::Bool(*v),
        FuzzValue::Int(v) => Value::Int(*v),
        FuzzValue::Float(bits) => Value::Float(f64::from_bits(*bits)),
        FuzzValue::Str(v) => Value::Str(v.clone()),
        FuzzValue::Bytes(v) => Value::from(v.clone()),
        FuzzValue::Timestamp(millis) => Value::Timestamp(Timestamp::from_millis(*millis)),
        FuzzValue::Ext(id, payload) => Value::Ext(ExtValue::new(*id, payload.clone())),
        FuzzValue::List(_) | FuzzValue::Map(_) if depth >= MAX_NESTING => Value::Null,
        FuzzValue::List(items) => {
            Value::List(items.iter().map(|item| lower(item, depth + 1)).collect())
        }
        FuzzValue::Map(entries) => Value::Map(
            entries
                .iter()
                .map(|(key, item)| (key.clone(), lower(item, depth + 1)))
                .collect::<Map>(),
        ),
    }
}

fuzz_target!(|case: RoundtripCase| {
    let value = lower(&case.value, 0);
    let config = EngineConfig {
        symbol_capacity: usize::from(case.symbol_capacity % 8),
        zero_copy: case.zero_copy,
        ..EngineConfig::default()
    };
    let mut symbols = config.new_symbol_table();
    let bytes = match Encoder::with_config(config.clone()).encode(&value, &mut symbols) {
        Ok(bytes) => bytes,
        Err(err) => panic!("合法值编码失败: {err}"),
    };
    let decoded = Decoder::with_config(config)
        .decode(&bytes, &symbols)
        .unwrap_or_else(|err| panic!("自身输出解码失败: {err}"));
    assert_eq!(decoded, value);
});
