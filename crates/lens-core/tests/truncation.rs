//! 截断安全：合法编码的任意前缀都只能得到 `Truncated` 或 `Malformed`。
//!
//! 顶层值均为容器，因此任何真前缀都不可能恰好是一个完整的值。

mod common;

use lens_core::{
    Decoder, Encoder, EngineConfig, ErrorKind, ExtValue, Map, SymbolTable, Timestamp, Value,
};

use common::sensor_reading;

fn samples() -> Vec<Value<'static>> {
    let mut mixed = Map::new();
    mixed.insert("text", "多字节字符串 ✓");
    mixed.insert("float", -2.75);
    mixed.insert("ts", Timestamp::from_millis(-86_400_000));
    mixed.insert("ext", ExtValue::new(u32::MAX, vec![9u8; 200]));
    mixed.insert("big", i64::MIN);
    mixed.insert("nested", Value::List(vec![Value::List(vec![Value::Null])]));
    vec![sensor_reading(), Value::Map(mixed)]
}

fn assert_every_prefix_fails(decoder: &Decoder) {
    for sample in samples() {
        let mut symbols = SymbolTable::new();
        let bytes = Encoder::new().encode(&sample, &mut symbols).expect("样例可编码");
        for cut in 0..bytes.len() {
            let prefix = &bytes[..cut];
            let err = decoder
                .decode(prefix, &symbols)
                .expect_err("真前缀不可能是完整的值");
            assert!(
                matches!(err.kind(), ErrorKind::Truncated | ErrorKind::Malformed),
                "cut={cut} 得到意外错误: {err}"
            );
            let offset = err.offset().expect("解码错误总是带偏移");
            assert!(offset <= cut, "cut={cut} 偏移越界: {offset}");
        }
    }
}

#[test]
fn every_prefix_fails_with_copying_decode() {
    assert_every_prefix_fails(&Decoder::new());
}

#[test]
fn every_prefix_fails_with_zero_copy_decode() {
    assert_every_prefix_fails(&Decoder::with_config(
        EngineConfig::default().with_zero_copy(true),
    ));
}

#[test]
fn oversized_length_prefix_is_truncated() {
    // BYTES 声明 2^40 字节，实际只有 3 字节。
    let bytes = [0x09, 0x80, 0x80, 0x80, 0x80, 0x80, 0x20, 0x01, 0x02, 0x03];
    let err = Decoder::new()
        .decode(&bytes, &SymbolTable::new())
        .expect_err("长度前缀超出剩余字节");
    assert_eq!(err.kind(), ErrorKind::Truncated);
}
