//! `roundtrip` 集成测试：从公开 API 视角验证编码、解码与符号表的会话语义。
//!
//! # 测试目标（Why）
//! - 固化两个端到端场景：传感器读数（符号驻留顺序与原始字节往返）与扩展值往返；
//! - 验证符号表只追加、失败调用不留痕迹、容量耗尽时两种溢出策略的行为。

mod common;

use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use lens_core::{
    CustomValue, Decoder, Encoder, EngineConfig, ErrorKind, ExtValue, ExtensionAdapter, Map,
    SharedBufferPool, SymbolOverflowPolicy, SymbolTable, Timestamp, Value, decode, encode,
};

use common::{Sentinel, sensor_reading};

#[test]
fn sensor_reading_interns_keys_in_first_use_order() {
    let mut symbols = SymbolTable::new();
    let original = sensor_reading();
    let bytes = encode(&original, &mut symbols, None, 128).expect("编码传感器读数");

    assert_eq!(
        symbols.as_strings(),
        ["id", "status", "meta", "source", "tags", "payload"]
    );
    let decoded = decode(&bytes, &symbols, false, None, None, 128).expect("解码传感器读数");
    assert_eq!(decoded, original);

    let payload = decoded
        .as_map()
        .and_then(|map| map.get("payload"))
        .and_then(Value::as_bytes)
        .expect("payload 字段应为字节");
    assert_eq!(payload, [0x00, 0xFF, 0x00, 0xFF]);
}

#[test]
fn extension_adapter_and_hook_round_trip_a_sentinel() {
    let adapter: Arc<ExtensionAdapter> = Arc::new(|custom: &dyn CustomValue| {
        custom
            .as_any()
            .downcast_ref::<Sentinel>()
            .map(|_| (7u32, b"X".to_vec()))
    });
    let mut symbols = SymbolTable::new();
    let original = Value::custom(Sentinel);
    let bytes = encode(&original, &mut symbols, Some(adapter), 128).expect("适配器处理哨兵值");
    assert_eq!(&bytes[..], &[0x0E, 0x07, 0x01, b'X']);

    let decoder = Decoder::new().with_extension_hook(|id, payload| match (id, payload) {
        (7, b"X") => Ok(Value::custom(Sentinel)),
        _ => Ok(Value::Ext(ExtValue::new(id, payload.to_vec()))),
    });
    let decoded = decoder.decode(&bytes, &symbols).expect("钩子还原哨兵值");
    assert_eq!(decoded, original);
    assert!(decoded.downcast_custom::<Sentinel>().is_some());
}

#[test]
fn adapter_declining_a_value_is_unsupported() {
    let mut encoder = Encoder::new().with_extension_adapter(|_| None);
    let err = encoder
        .encode(&Value::custom(Sentinel), &mut SymbolTable::new())
        .expect_err("适配器拒绝");
    assert_eq!(err.kind(), ErrorKind::UnsupportedType);
}

#[test]
fn ext_without_hook_is_returned_unresolved() {
    let mut symbols = SymbolTable::new();
    let original = Value::Ext(ExtValue::new(42, vec![1, 2, 3]));
    let bytes = encode(&original, &mut symbols, None, 128).expect("编码扩展值");
    let decoded = decode(&bytes, &symbols, false, None, None, 128).expect("解码扩展值");
    assert_eq!(decoded, original);
}

#[test]
fn symbols_stay_stable_across_messages() {
    let mut encoder = Encoder::new();
    let mut symbols = SymbolTable::new();

    let first: Map = [("user", Value::from("ada")), ("role", Value::from("admin"))]
        .into_iter()
        .collect();
    let second: Map = [("role", Value::from("guest")), ("team", Value::from("ops"))]
        .into_iter()
        .collect();

    let first_bytes = encoder
        .encode(&Value::Map(first.clone()), &mut symbols)
        .expect("第一条消息");
    let role = symbols.index_of("role").expect("role 已驻留");
    let second_bytes = encoder
        .encode(&Value::Map(second.clone()), &mut symbols)
        .expect("第二条消息");

    assert_eq!(symbols.index_of("role"), Some(role), "已分配索引不得改变");
    assert_eq!(symbols.as_strings(), ["user", "role", "team"]);

    let decoder = Decoder::new();
    assert_eq!(
        decoder.decode(&first_bytes, &symbols).expect("用后续的表解码旧消息"),
        Value::Map(first)
    );
    assert_eq!(
        decoder.decode(&second_bytes, &symbols).expect("解码第二条消息"),
        Value::Map(second)
    );
}

#[test]
fn failed_encode_leaves_symbol_table_untouched() {
    let mut symbols = SymbolTable::from_symbols(["existing"]).expect("构建符号表");
    let before = symbols.clone();

    let mut map = Map::new();
    map.insert("existing", 1);
    map.insert("fresh_a", 2);
    map.insert("fresh_b", Value::custom(Sentinel));
    let err = Encoder::new()
        .encode(&Value::Map(map), &mut symbols)
        .expect_err("无适配器时自定义值无法编码");

    assert_eq!(err.kind(), ErrorKind::UnsupportedType);
    assert_eq!(symbols, before);
    assert_eq!(symbols.index_of("fresh_a"), None);
}

#[test]
fn full_table_degrades_to_inline_keys_by_default() {
    let config = EngineConfig {
        symbol_capacity: 2,
        ..EngineConfig::default()
    };
    let mut symbols = config.new_symbol_table();
    let mut encoder = Encoder::with_config(config);

    let value: Map = [("a", 1), ("b", 2), ("c", 3)].into_iter().collect();
    let bytes = encoder
        .encode(&Value::Map(value.clone()), &mut symbols)
        .expect("内联降级不应失败");

    assert_eq!(symbols.as_strings(), ["a", "b"]);
    assert_eq!(&bytes[bytes.len() - 5..], &[0x08, 0x01, b'c', 0x03, 0x03]);
    let decoded = Decoder::new().decode(&bytes, &symbols).expect("解码混合键");
    assert_eq!(decoded, Value::Map(value));
}

#[test]
fn reject_policy_aborts_and_rolls_back() {
    let config = EngineConfig::default().with_symbol_overflow(SymbolOverflowPolicy::Reject);
    let mut symbols = SymbolTable::with_capacity(1);
    let mut encoder = Encoder::with_config(config);

    let value: Map = [("a", 1), ("b", 2)].into_iter().collect();
    let err = encoder
        .encode(&Value::Map(value), &mut symbols)
        .expect_err("拒绝策略下符号表满即失败");

    assert_eq!(err.kind(), ErrorKind::SymbolCapacityReached);
    assert!(err.is_encode());
    assert!(symbols.is_empty(), "失败调用驻留的 a 也应被回滚");
}

#[test]
fn timestamps_round_trip_natively_or_through_hook() {
    let when = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
    let original = Value::Timestamp(Timestamp::from(when));
    let mut symbols = SymbolTable::new();
    let bytes = encode(&original, &mut symbols, None, 128).expect("编码时间戳");

    let native = decode(&bytes, &symbols, false, None, None, 128).expect("原生还原");
    assert_eq!(native, original);
    match native {
        Value::Timestamp(ts) => assert_eq!(ts.to_system_time(), Some(when)),
        other => panic!("意外的值: {other:?}"),
    }

    let hooked = Decoder::new()
        .with_timestamp_hook(|millis| Ok(Value::Int(millis / 1000)))
        .decode(&bytes, &symbols)
        .expect("钩子还原");
    assert_eq!(hooked, Value::Int(1_700_000_000));
}

#[test]
fn scalar_edge_values_round_trip_exactly() {
    let values = [
        Value::Int(i64::MIN),
        Value::Int(i64::MAX),
        Value::Float(f64::NAN),
        Value::Float(-0.0),
        Value::Float(f64::INFINITY),
        Value::Str(String::new()),
        Value::Str("多字节 ✓".to_owned()),
        Value::from(Vec::<u8>::new()),
        Value::Null,
    ];
    let mut symbols = SymbolTable::new();
    for original in values {
        let bytes = encode(&original, &mut symbols, None, 128).expect("编码标量");
        let decoded = decode(&bytes, &symbols, false, None, None, 128).expect("解码标量");
        assert_eq!(decoded, original);
    }
}

#[test]
fn encoder_over_shared_pool_matches_private_pool() {
    let shared = SharedBufferPool::new();
    let mut pooled = Encoder::with_pool(shared.clone(), EngineConfig::default());
    let mut private = Encoder::new();

    let mut left = SymbolTable::new();
    let mut right = SymbolTable::new();
    for _ in 0..3 {
        let a = pooled.encode(&sensor_reading(), &mut left).expect("共享池编码");
        let b = private.encode(&sensor_reading(), &mut right).expect("独占池编码");
        assert_eq!(a, b);
    }
    assert_eq!(shared.stats().idle_buffers, 1);
}
